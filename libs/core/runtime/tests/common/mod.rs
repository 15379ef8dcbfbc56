#![allow(dead_code)]

use axum::Router;
use axum::extract::State;
use axum::http::StatusCode;
use axum::routing::get;
use observability::BoxError;
use service_runtime::{
    EndpointConfig, ForwardedMetadata, GatewayChannel, GatewayConfig, RunError, Server, ServiceConfig,
};
use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;
use tonic_health::pb::HealthCheckRequest;
use tonic_health::pb::health_client::HealthClient;

pub fn fixture(name: &str) -> PathBuf {
    PathBuf::from(env!("CARGO_MANIFEST_DIR"))
        .join("tests")
        .join("fixtures")
        .join(name)
}

/// A loopback address nothing is listening on right now.
pub fn free_addr() -> SocketAddr {
    let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
    listener.local_addr().unwrap()
}

/// RPC on an ephemeral loopback port, gateway and telemetry off.
pub fn rpc_only_config() -> ServiceConfig {
    ServiceConfig::new("runtime-test")
        .with_rpc(EndpointConfig::new("127.0.0.1:0"))
        .with_gateway(GatewayConfig::default().with_endpoint(EndpointConfig::default().with_disabled(true)))
}

pub fn counting_hook(
    counter: &Arc<AtomicUsize>,
) -> impl Fn() -> Result<(), BoxError> + Send + Sync + 'static {
    let counter = counter.clone();
    move || {
        counter.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

/// Run `server` on a task until the returned sender fires or is dropped.
pub fn spawn_until_stopped(
    server: Arc<Server>,
) -> (
    tokio::sync::oneshot::Sender<()>,
    tokio::task::JoinHandle<Result<(), RunError>>,
) {
    let (stop, stopped) = tokio::sync::oneshot::channel::<()>();
    let run = tokio::spawn(async move {
        server
            .run(async {
                let _ = stopped.await;
            })
            .await
    });
    (stop, run)
}

/// Wait until something accepts TCP connections on `addr`.
pub async fn wait_for_listener(addr: SocketAddr) {
    for _ in 0..100 {
        if tokio::net::TcpStream::connect(addr).await.is_ok() {
            return;
        }
        tokio::time::sleep(Duration::from_millis(20)).await;
    }
    panic!("nothing listening on {addr}");
}

/// GET `url` until it answers, returning status and body.
pub async fn get_when_ready(url: &str) -> (StatusCode, String) {
    for _ in 0..100 {
        if let Ok(response) = reqwest::get(url).await {
            let status = StatusCode::from_u16(response.status().as_u16()).unwrap();
            return (status, response.text().await.unwrap());
        }
        tokio::time::sleep(Duration::from_millis(20)).await;
    }
    panic!("no response from {url}");
}

/// GET `url` with an optional `Authorization` header, returning status and
/// body.
pub async fn get_with_authorization(url: &str, authorization: Option<&str>) -> (StatusCode, String) {
    let mut request = reqwest::Client::new().get(url);
    if let Some(value) = authorization {
        request = request.header("authorization", value);
    }
    let response = request.send().await.unwrap();
    let status = StatusCode::from_u16(response.status().as_u16()).unwrap();
    (status, response.text().await.unwrap())
}

/// Gateway routes: `/healthz` forwards to the gRPC health service, passing
/// the caller's `authorization` along.
pub fn health_routes(router: Router, channel: GatewayChannel) -> Result<Router, BoxError> {
    Ok(router.merge(Router::new().route("/healthz", get(health)).with_state(channel)))
}

async fn health(
    State(channel): State<GatewayChannel>,
    forwarded: ForwardedMetadata,
) -> Result<String, (StatusCode, String)> {
    HealthClient::new(channel)
        .check(forwarded.request(HealthCheckRequest {
            service: String::new(),
        }))
        .await
        .map(|response| response.into_inner().status().as_str_name().to_string())
        .map_err(|status| {
            (
                StatusCode::BAD_GATEWAY,
                format!("{:?}: {}", status.code(), status.message()),
            )
        })
}
