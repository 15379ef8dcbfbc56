//! `GET /healthz` and `GET /healthz/{service}`, answered by the RPC health
//! service over the gateway channel. The caller's bearer token travels with
//! the call, so an authenticated RPC listener sees the same identity.

use axum::Router;
use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Json};
use axum::routing::get;
use serde_json::json;
use service_runtime::{ForwardedMetadata, GatewayChannel};
use tonic::Code;
use tonic_health::pb::HealthCheckRequest;
use tonic_health::pb::health_check_response::ServingStatus as WireStatus;
use tonic_health::pb::health_client::HealthClient;

pub fn router(channel: GatewayChannel) -> Router {
    Router::new()
        .route("/healthz", get(overall))
        .route("/healthz/{service}", get(service))
        .with_state(channel)
}

async fn overall(
    State(channel): State<GatewayChannel>,
    forwarded: ForwardedMetadata,
) -> impl IntoResponse {
    check(channel, forwarded, String::new()).await
}

async fn service(
    State(channel): State<GatewayChannel>,
    forwarded: ForwardedMetadata,
    Path(service): Path<String>,
) -> impl IntoResponse {
    check(channel, forwarded, service).await
}

async fn check(
    channel: GatewayChannel,
    forwarded: ForwardedMetadata,
    service: String,
) -> (StatusCode, Json<serde_json::Value>) {
    let result = HealthClient::new(channel)
        .check(forwarded.request(HealthCheckRequest {
            service: service.clone(),
        }))
        .await;

    match result {
        Ok(response) => {
            let status = response.into_inner().status();
            let code = if status == WireStatus::Serving {
                StatusCode::OK
            } else {
                StatusCode::SERVICE_UNAVAILABLE
            };
            (code, Json(json!({ "service": service, "status": status.as_str_name() })))
        }
        Err(status) => {
            let code = match status.code() {
                Code::NotFound => StatusCode::NOT_FOUND,
                Code::Unauthenticated => StatusCode::UNAUTHORIZED,
                Code::InvalidArgument => StatusCode::BAD_REQUEST,
                _ => StatusCode::BAD_GATEWAY,
            };
            (code, Json(json!({ "service": service, "error": status.message() })))
        }
    }
}
