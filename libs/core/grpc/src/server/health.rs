//! `grpc.health.v1.Health` for the RPC listener.

use tonic_health::ServingStatus;
use tonic_health::pb::health_server::{Health, HealthServer};
use tonic_health::server::HealthReporter;
use tracing::debug;

/// A fresh health service together with the reporter that drives it.
pub fn health_service() -> (HealthReporter, HealthServer<impl Health>) {
    tonic_health::server::health_reporter()
}

/// Mark each of `service_names`, plus the overall status under the empty
/// name checked by orchestrators, as serving.
pub async fn mark_serving(reporter: &HealthReporter, service_names: &[&str]) {
    for name in service_names.iter().copied().chain(std::iter::once("")) {
        reporter.set_service_status(name, ServingStatus::Serving).await;
    }
    debug!(services = ?service_names, "Health status set to serving");
}
