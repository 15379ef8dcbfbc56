use grpc_core::auth::KeySetError;
use grpc_core::{GrpcError, TlsError};
use observability::{BoxError, ShutdownError, TelemetryError};
use thiserror::Error;

/// Terminal outcome of [`Server::run`](crate::Server::run).
#[derive(Error, Debug)]
pub enum RunError {
    #[error("invalid configuration: {0}")]
    Config(String),

    #[error(transparent)]
    Tls(#[from] TlsError),

    #[error(transparent)]
    KeySet(#[from] KeySetError),

    #[error(transparent)]
    Channel(#[from] GrpcError),

    #[error("failed to bind {addr}: {source}")]
    Bind {
        addr: String,
        #[source]
        source: std::io::Error,
    },

    #[error(transparent)]
    Telemetry(#[from] TelemetryError),

    #[error("{component} registration failed: {source}")]
    Registration {
        component: &'static str,
        #[source]
        source: BoxError,
    },

    #[error("{component} server failed: {source}")]
    Serve {
        component: &'static str,
        #[source]
        source: BoxError,
    },

    #[error("{component} task failed: {source}")]
    Task {
        component: &'static str,
        #[source]
        source: tokio::task::JoinError,
    },

    #[error("run cancelled")]
    Cancelled,

    #[error(transparent)]
    Shutdown(#[from] ShutdownError),

    /// The run ended with `cause` and draining the shutdown chain failed too.
    #[error("{cause}; {shutdown}")]
    WithShutdown {
        #[source]
        cause: Box<RunError>,
        shutdown: ShutdownError,
    },
}

impl RunError {
    /// The error that ended the run, looking through shutdown failures.
    pub fn cause(&self) -> &RunError {
        match self {
            RunError::WithShutdown { cause, .. } => cause,
            other => other,
        }
    }

    pub fn shutdown_error(&self) -> Option<&ShutdownError> {
        match self {
            RunError::Shutdown(e) | RunError::WithShutdown { shutdown: e, .. } => Some(e),
            _ => None,
        }
    }

    pub fn is_cancelled(&self) -> bool {
        matches!(self.cause(), RunError::Cancelled)
    }

    /// Combine the run outcome with the outcome of draining shutdown.
    pub(crate) fn combine(
        outcome: Result<(), RunError>,
        shutdown: Result<(), ShutdownError>,
    ) -> Result<(), RunError> {
        match (outcome, shutdown) {
            (outcome, Ok(())) => outcome,
            (Ok(()), Err(shutdown)) => Err(RunError::Shutdown(shutdown)),
            (Err(cause), Err(shutdown)) => Err(RunError::WithShutdown {
                cause: Box::new(cause),
                shutdown,
            }),
        }
    }
}
