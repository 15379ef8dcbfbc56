//! Client-side interceptors for outgoing gRPC calls.

mod tracing;

pub use self::tracing::TraceContextInterceptor;
