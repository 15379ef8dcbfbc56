use crate::config::{Protocol, Signal};
use crate::shutdown::{BoxError, ShutdownError};
use thiserror::Error;

/// Errors raised while standing up telemetry pipelines.
#[derive(Error, Debug)]
pub enum TelemetryError {
    /// An exporter or provider for one signal could not be built. Anything
    /// initialized before it has already been shut down; `unwound` carries
    /// failures from that teardown.
    #[error(
        "failed to initialize {signal} exporter ({protocol} at {address}): {source}{}",
        .unwound.as_ref().map(|e| format!(" (while unwinding: {e})")).unwrap_or_default()
    )]
    Exporter {
        signal: Signal,
        protocol: Protocol,
        address: String,
        #[source]
        source: BoxError,
        unwound: Option<ShutdownError>,
    },
}

impl TelemetryError {
    pub fn signal(&self) -> Signal {
        match self {
            TelemetryError::Exporter { signal, .. } => *signal,
        }
    }
}
