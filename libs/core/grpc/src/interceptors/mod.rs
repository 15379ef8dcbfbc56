/// Re-export tonic's Interceptor trait for convenience
pub use tonic::service::Interceptor;

pub mod auth;
pub mod client;
pub mod shared;

pub use auth::{AuthError, JwtAuthInterceptor, claims_from_request};
pub use client::TraceContextInterceptor;
pub use shared::SharedInterceptor;
