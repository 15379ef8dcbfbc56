//! # gRPC Core
//!
//! Building blocks shared by gRPC servers and the clients that dial them:
//! transport security, bearer-token authentication, trace-context
//! propagation and channel tuning.
//!
//! ## Features
//!
//! - **TLS / mutual TLS**: [`ServerSecurity`] and [`ClientSecurity`] built
//!   from PEM files, validated at startup
//! - **Authentication**: [`JwtAuthInterceptor`] verifying bearer tokens
//!   against a [`KeyResolver`], e.g. a remote JWKS via [`JwksResolver`]
//! - **Tracing**: W3C trace context and baggage injected by
//!   [`TraceContextInterceptor`] and continued by [`server::make_rpc_span`]
//!   and [`server::make_http_span`]
//! - **Channels**: lazily connected channels with HTTP/2 tuning
//!
//! ## Quick Start
//!
//! ```ignore
//! use grpc_core::auth::{AuthConfig, JwksResolver, RegisteredClaims};
//! use grpc_core::interceptors::JwtAuthInterceptor;
//! use std::sync::Arc;
//!
//! let keys = JwksResolver::fetch(&jwk_urls, None).await?;
//! let auth = JwtAuthInterceptor::<RegisteredClaims>::new(Arc::new(keys), AuthConfig::default());
//!
//! Server::builder()
//!     .layer(tonic::service::InterceptorLayer::new(auth))
//!     .add_service(my_service)
//!     .serve(addr)
//!     .await?;
//! ```

pub mod auth;
pub mod channel;
pub mod error;
pub mod interceptors;
pub mod propagation;
pub mod server;
pub mod tls;

pub use auth::{
    AuthConfig, Claims, JwksResolver, KeyResolver, MissingTokenPolicy, RegisteredClaims,
    StaticKeys, VerificationKey,
};
pub use channel::{ChannelConfig, create_channel_lazy, create_channel_lazy_with_config};
pub use error::{GrpcError, GrpcResult};
pub use interceptors::{
    AuthError, JwtAuthInterceptor, SharedInterceptor, TraceContextInterceptor, claims_from_request,
};
pub use tls::{ClientSecurity, ServerSecurity, TlsConfig, TlsError};
