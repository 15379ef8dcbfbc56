//! OpenTelemetry bootstrap and ordered teardown for services.
//!
//! This crate provides:
//! - Layered exporter configuration with per-signal overrides falling back to
//!   shared defaults
//! - Trace, metric and log pipelines exporting over OTLP gRPC, OTLP HTTP or
//!   stdout
//! - A shutdown chain that drains registered teardown steps in order
//!
//! # Example
//!
//! ```rust,ignore
//! use observability::{ShutdownChain, Telemetry, TelemetryConfig};
//! use core_config::FromEnv;
//!
//! let config = TelemetryConfig::from_env()?;
//! let mut chain = ShutdownChain::new();
//! let telemetry = Telemetry::init(&config, "orders", &mut chain)?;
//!
//! let meter = telemetry.meter("orders");
//! // ...
//! chain.shutdown()?;
//! ```

pub mod config;
pub mod error;
pub mod shutdown;
pub mod telemetry;

pub use config::{
    DEFAULT_ADDRESS, DEFAULT_INTERVAL, ExporterConfig, Protocol, ResolvedExporter, Signal,
    TelemetryConfig,
};
pub use error::TelemetryError;
pub use shutdown::{BoxError, ShutdownChain, ShutdownError, ShutdownFailure};
pub use telemetry::Telemetry;

// Re-export so callers can instrument without pinning their own versions.
pub use opentelemetry;
