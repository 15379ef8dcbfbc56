use core_config::FromEnv;
use eyre::{Result, WrapErr};
use service_runtime::{Server, ServiceConfig};
use tracing::info;

mod routes;

#[tokio::main]
async fn main() -> Result<()> {
    core_config::tracing::install_color_eyre();

    let config = ServiceConfig::from_env().wrap_err("Failed to load service configuration")?;

    let server = Server::new(config)
        .register_gateway(|router, channel| Ok(router.merge(routes::router(channel))));

    match server.run_until_signal().await {
        Err(e) if e.is_cancelled() && e.shutdown_error().is_none() => {
            info!("Shut down cleanly");
            Ok(())
        }
        result => result.wrap_err("Service terminated"),
    }
}
