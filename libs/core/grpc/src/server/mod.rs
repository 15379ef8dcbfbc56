//! gRPC server helpers: health reporting and the per-request tracing spans
//! used by the RPC listener and the HTTP gateway.
//!
//! ```ignore
//! use grpc_core::server::{health_service, make_rpc_span, mark_serving};
//! use tower_http::trace::TraceLayer;
//!
//! let (reporter, health) = health_service();
//! mark_serving(&reporter, &["orders.v1.Orders"]).await;
//!
//! Server::builder()
//!     .layer(TraceLayer::new_for_grpc().make_span_with(make_rpc_span))
//!     .add_service(health)
//!     .serve(addr)
//!     .await?;
//! ```

mod health;
mod span;

pub use health::{health_service, mark_serving};
pub use span::{make_http_span, make_rpc_span};
