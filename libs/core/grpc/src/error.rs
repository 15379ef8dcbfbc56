use thiserror::Error;

pub type GrpcResult<T> = Result<T, GrpcError>;

/// Errors that can occur while building channels and servers
#[derive(Error, Debug)]
pub enum GrpcError {
  /// Invalid URI provided for connection
  #[error("Invalid URI: {0}")]
  InvalidUri(#[source] tonic::transport::Error),

  /// TLS settings rejected by the transport
  #[error("Invalid TLS configuration: {0}")]
  Tls(#[source] tonic::transport::Error),

  /// TLS material could not be loaded
  #[error(transparent)]
  TlsMaterial(#[from] crate::tls::TlsError),
}

impl From<GrpcError> for tonic::Status {
  fn from(err: GrpcError) -> Self {
    tonic::Status::unavailable(err.to_string())
  }
}
