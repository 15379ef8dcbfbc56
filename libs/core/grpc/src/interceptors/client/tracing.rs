//! Client-side W3C Trace Context and Baggage propagation
//!
//! Injects the current span's context into outgoing gRPC requests so the
//! callee's spans join the caller's trace.

use crate::propagation::inject_context;
use tonic::{Request, Status};
use tracing_opentelemetry::OpenTelemetrySpanExt;

/// Interceptor propagating trace context to the callee.
///
/// Headers injected:
/// - `traceparent` / `tracestate`: W3C Trace Context of the active span
///   (omitted when the span is not sampled into an OpenTelemetry trace)
/// - `baggage`: W3C Baggage of the active context, when non-empty
/// - `x-request-id`: UUID for log correlation, unless already present
/// - `x-source-service`: caller name, when configured
///
/// # Example
/// ```ignore
/// use grpc_core::interceptors::TraceContextInterceptor;
/// use tonic_health::pb::health_client::HealthClient;
///
/// let channel = create_channel_lazy("http://127.0.0.1:50001")?;
/// let client = HealthClient::with_interceptor(channel, TraceContextInterceptor::new());
/// ```
#[derive(Clone, Debug, Default)]
pub struct TraceContextInterceptor {
    service_name: Option<String>,
}

impl TraceContextInterceptor {
    pub fn new() -> Self {
        Self { service_name: None }
    }

    pub fn with_service_name(service_name: impl Into<String>) -> Self {
        Self {
            service_name: Some(service_name.into()),
        }
    }

    fn inject_trace_context(request: &mut Request<()>) -> Result<(), Status> {
        let cx = tracing::Span::current().context();
        inject_context(&cx, request.metadata_mut());

        if !request.metadata().contains_key("x-request-id") {
            let request_id = uuid::Uuid::new_v4().to_string();
            request.metadata_mut().insert(
                "x-request-id",
                request_id
                    .parse()
                    .map_err(|_| Status::internal("Failed to create request ID"))?,
            );
        }

        tracing::debug!(
            target: "grpc_core",
            traceparent = ?request.metadata().get("traceparent"),
            "Injected trace context"
        );

        Ok(())
    }
}

impl tonic::service::Interceptor for TraceContextInterceptor {
    fn call(&mut self, mut request: Request<()>) -> Result<Request<()>, Status> {
        if let Some(ref name) = self.service_name {
            if let Ok(value) = name.parse() {
                request.metadata_mut().insert("x-source-service", value);
            }
        }

        Self::inject_trace_context(&mut request)?;
        Ok(request)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tonic::service::Interceptor;

    #[test]
    fn test_request_id_injected() {
        let mut interceptor = TraceContextInterceptor::new();
        let req = interceptor.call(Request::new(())).unwrap();

        let id = req.metadata().get("x-request-id").unwrap().to_str().unwrap();
        assert!(uuid::Uuid::parse_str(id).is_ok());
    }

    #[test]
    fn test_existing_request_id_kept() {
        let mut interceptor = TraceContextInterceptor::new();
        let mut request = Request::new(());
        request
            .metadata_mut()
            .insert("x-request-id", "upstream-id".parse().unwrap());

        let req = interceptor.call(request).unwrap();
        assert_eq!(req.metadata().get("x-request-id").unwrap(), "upstream-id");
    }

    #[test]
    fn test_with_service_name() {
        let mut interceptor = TraceContextInterceptor::with_service_name("gateway");
        let req = interceptor.call(Request::new(())).unwrap();
        assert_eq!(req.metadata().get("x-source-service").unwrap(), "gateway");
    }
}
