//! Carrying caller identity from gateway HTTP requests onto RPC calls.

use axum::extract::FromRequestParts;
use axum::http::HeaderMap;
use axum::http::request::Parts;
use std::convert::Infallible;
use tonic::metadata::MetadataMap;

/// Inbound headers copied onto the RPC call.
const FORWARDED_HEADERS: [&str; 2] = ["authorization", "x-request-id"];

/// Extractor holding the HTTP headers a gateway handler passes on to the RPC
/// listener: the caller's `authorization` and `x-request-id`.
///
/// # Example
/// ```ignore
/// async fn get_order(
///     State(channel): State<GatewayChannel>,
///     forwarded: ForwardedMetadata,
///     Path(id): Path<String>,
/// ) -> Result<Json<Order>, StatusCode> {
///     let reply = OrdersClient::new(channel)
///         .get_order(forwarded.request(GetOrderRequest { id }))
///         .await?;
///     Ok(Json(reply.into_inner().into()))
/// }
/// ```
#[derive(Debug, Clone, Default)]
pub struct ForwardedMetadata {
    metadata: MetadataMap,
}

impl ForwardedMetadata {
    pub fn from_headers(headers: &HeaderMap) -> Self {
        let mut forwarded = HeaderMap::new();
        for name in FORWARDED_HEADERS {
            if let Some(value) = headers.get(name) {
                forwarded.insert(name, value.clone());
            }
        }
        Self {
            metadata: MetadataMap::from_headers(forwarded),
        }
    }

    pub fn metadata(&self) -> &MetadataMap {
        &self.metadata
    }

    pub fn is_empty(&self) -> bool {
        self.metadata.is_empty()
    }

    /// Wrap `message` in a request carrying the forwarded metadata.
    pub fn request<T>(&self, message: T) -> tonic::Request<T> {
        let mut request = tonic::Request::new(message);
        *request.metadata_mut() = self.metadata.clone();
        request
    }
}

impl<S> FromRequestParts<S> for ForwardedMetadata
where
    S: Send + Sync,
{
    type Rejection = Infallible;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        Ok(Self::from_headers(&parts.headers))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn headers(pairs: &[(&'static str, &str)]) -> HeaderMap {
        let mut headers = HeaderMap::new();
        for (name, value) in pairs {
            headers.insert(*name, value.parse().unwrap());
        }
        headers
    }

    #[test]
    fn test_only_identity_headers_are_forwarded() {
        let forwarded = ForwardedMetadata::from_headers(&headers(&[
            ("authorization", "Bearer abc"),
            ("x-request-id", "req-1"),
            ("cookie", "session=secret"),
            ("host", "gateway.local"),
        ]));

        let request = forwarded.request(());
        assert_eq!(request.metadata().get("authorization").unwrap(), "Bearer abc");
        assert_eq!(request.metadata().get("x-request-id").unwrap(), "req-1");
        assert!(request.metadata().get("cookie").is_none());
        assert!(request.metadata().get("host").is_none());
        assert_eq!(request.metadata().len(), 2);
    }

    #[test]
    fn test_no_identity_headers_forwards_nothing() {
        let forwarded = ForwardedMetadata::from_headers(&headers(&[("accept", "application/json")]));
        assert!(forwarded.is_empty());
        assert!(forwarded.request(()).metadata().is_empty());
    }

    #[tokio::test]
    async fn test_extracts_from_request_parts() {
        let (mut parts, ()) = axum::http::Request::builder()
            .header("authorization", "Bearer xyz")
            .body(())
            .unwrap()
            .into_parts();

        let forwarded = ForwardedMetadata::from_request_parts(&mut parts, &()).await.unwrap();
        assert_eq!(forwarded.metadata().get("authorization").unwrap(), "Bearer xyz");
    }
}
