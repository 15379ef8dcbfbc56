use crate::propagation::extract_context;
use tracing::Span;
use tracing_opentelemetry::OpenTelemetrySpanExt;

const REQUEST_ID: &str = "x-request-id";

/// Span for one inbound RPC.
///
/// Continues the caller's trace when the request carries W3C trace context,
/// records the caller's `x-request-id`, and declares an empty `user.id`
/// field that authentication fills in.
pub fn make_rpc_span<B>(request: &http::Request<B>) -> Span {
    let path = request.uri().path();
    let (service, method) = path
        .trim_start_matches('/')
        .split_once('/')
        .unwrap_or((path, ""));

    let span = tracing::info_span!(
        "rpc",
        otel.kind = "server",
        rpc.system = "grpc",
        rpc.service = %service,
        rpc.method = %method,
        request.id = tracing::field::Empty,
        user.id = tracing::field::Empty,
    );
    continue_remote(&span, request.headers());
    span
}

/// Span for one gateway HTTP request, parented on the caller's trace.
pub fn make_http_span<B>(request: &http::Request<B>) -> Span {
    let span = tracing::info_span!(
        "http",
        otel.kind = "server",
        http.request.method = %request.method(),
        url.path = %request.uri().path(),
        request.id = tracing::field::Empty,
    );
    continue_remote(&span, request.headers());
    span
}

fn continue_remote(span: &Span, headers: &http::HeaderMap) {
    if let Some(id) = request_id(headers) {
        span.record("request.id", id);
    }
    let _ = span.set_parent(extract_context(headers));
}

fn request_id(headers: &http::HeaderMap) -> Option<&str> {
    headers
        .get(REQUEST_ID)
        .and_then(|v| v.to_str().ok())
        .filter(|id| !id.is_empty())
}
