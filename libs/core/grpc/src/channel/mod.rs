pub mod config;

pub use config::ChannelConfig;

use crate::error::{GrpcError, GrpcResult};
use crate::tls::ClientSecurity;
use tonic::transport::{Channel, Endpoint};

/// Creates a lazy gRPC channel that connects on first request
///
/// The channel is returned immediately without establishing a connection;
/// the connection is made when the first RPC is invoked. `security`
/// selects plaintext HTTP/2 or TLS (optionally presenting a client
/// certificate) for that connection.
///
/// ## Example
/// ```ignore
/// use grpc_core::{ClientSecurity, create_channel_lazy};
/// use tonic_health::pb::health_client::HealthClient;
///
/// // Returns immediately, no connection attempt yet
/// let channel = create_channel_lazy("http://127.0.0.1:50001", &ClientSecurity::Insecure)?;
/// let mut client = HealthClient::new(channel);
///
/// // Connection is established here on first RPC call
/// let response = client.check(request).await?;
/// ```
pub fn create_channel_lazy(addr: impl Into<String>, security: &ClientSecurity) -> GrpcResult<Channel> {
  create_channel_lazy_with_config(addr, ChannelConfig::default(), security)
}

/// Creates a lazy gRPC channel with custom configuration
pub fn create_channel_lazy_with_config(
  addr: impl Into<String>,
  config: ChannelConfig,
  security: &ClientSecurity,
) -> GrpcResult<Channel> {
  let addr_string = addr.into();
  let endpoint = endpoint(&addr_string, config, security)?;

  tracing::debug!(
        target: "grpc_core",
        addr = %addr_string,
        tls = security.is_tls(),
        "Creating lazy gRPC channel (connects on first request)"
    );

  // connect_lazy() returns a Channel without establishing connection
  Ok(endpoint.connect_lazy())
}

/// Builds a configured endpoint without connecting.
pub fn endpoint(
  addr: &str,
  config: ChannelConfig,
  security: &ClientSecurity,
) -> GrpcResult<Endpoint> {
  let endpoint = Endpoint::from_shared(addr.to_string()).map_err(|e| {
    tracing::error!(target: "grpc_core", addr = %addr, error = ?e, "Invalid URI");
    GrpcError::InvalidUri(e)
  })?;

  let endpoint = config.apply_to_endpoint(endpoint);

  match security {
    ClientSecurity::Insecure => Ok(endpoint),
    ClientSecurity::Tls(tls) => endpoint.tls_config(tls.as_ref().clone()).map_err(|e| {
      tracing::error!(target: "grpc_core", addr = %addr, error = ?e, "Invalid TLS configuration");
      GrpcError::Tls(e)
    }),
  }
}
