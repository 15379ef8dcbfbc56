//! Runtime for services exposed over gRPC and an HTTP gateway.
//!
//! A [`Server`] owns both listeners for one service. It stands up telemetry,
//! provisions TLS, authenticates RPC calls, runs the two listeners
//! concurrently and tears everything down in order when either stops or the
//! caller cancels.
//!
//! `run` installs the process-wide `tracing` subscriber (with the
//! OpenTelemetry bridge when traces or logs are exported) unless one is
//! already in place.
//!
//! ```ignore
//! use core_config::FromEnv;
//! use service_runtime::{Server, ServiceConfig};
//!
//! #[tokio::main]
//! async fn main() -> eyre::Result<()> {
//!     core_config::tracing::install_color_eyre();
//!
//!     Server::new(ServiceConfig::from_env()?)
//!         .register_rpc(|routes| {
//!             routes.add_service(OrdersServer::new(OrdersService::default()));
//!             Ok(())
//!         })
//!         .run_until_signal()
//!         .await?;
//!     Ok(())
//! }
//! ```

pub mod config;
pub mod error;
mod forward;
mod gateway;
pub mod register;
pub mod server;
mod signal;

pub use config::{CorsConfig, EndpointConfig, GatewayConfig, ServiceConfig};
pub use error::RunError;
pub use forward::ForwardedMetadata;
pub use register::{GatewayChannel, GatewayRegisterFn, RpcRegisterFn};
pub use server::Server;
pub use signal::shutdown_signal;

pub use grpc_core;
pub use observability;
