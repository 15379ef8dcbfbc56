//! HTTP gateway translating requests into calls on the service's own RPC
//! listener.

use crate::config::GatewayConfig;
use crate::error::RunError;
use crate::register::{GatewayChannel, GatewayRegisterFn};
use axum::Router;
use grpc_core::server::make_http_span;
use grpc_core::{ClientSecurity, TlsConfig, TraceContextInterceptor, create_channel_lazy_with_config};
use std::net::{IpAddr, Ipv4Addr, Ipv6Addr, SocketAddr};
use tonic::service::interceptor::InterceptedService;
use tower_http::trace::TraceLayer;
use tracing::info;

/// Everything the gateway task needs, detached from the `Server`.
pub(crate) struct Gateway {
    pub service_name: String,
    pub config: GatewayConfig,
    /// TLS policy of the RPC listener being dialed.
    pub rpc_tls: TlsConfig,
    /// Configured RPC address, used to derive the expected server name.
    pub rpc_address: String,
    /// Address the RPC listener actually bound.
    pub rpc_local_addr: SocketAddr,
    pub register: Option<GatewayRegisterFn>,
}

impl Gateway {
    pub async fn serve(self) -> Result<(), RunError> {
        let address = self.config.endpoint.address.trim();
        if address.is_empty() {
            return Err(RunError::Config("gateway address is empty".to_string()));
        }

        let channel = self.dial()?;

        let mut router = Router::new();
        if let Some(register) = &self.register {
            router = register(router, channel).map_err(|source| RunError::Registration {
                component: "gateway",
                source,
            })?;
        }

        let trace = TraceLayer::new_for_http().make_span_with(make_http_span::<axum::body::Body>);
        let mut router = router.layer(trace);
        if let Some(cors) = &self.config.cors {
            router = router.layer(cors.layer().map_err(RunError::Config)?);
        }

        let listener = tokio::net::TcpListener::bind(address)
            .await
            .map_err(|source| RunError::Bind {
                addr: address.to_string(),
                source,
            })?;

        info!(
            addr = %listener.local_addr().map_or_else(|_| address.to_string(), |a| a.to_string()),
            upstream = %self.rpc_local_addr,
            cors = self.config.cors.is_some(),
            "HTTP gateway starting"
        );

        axum::serve(listener, router)
            .await
            .map_err(|e| RunError::Serve {
                component: "gateway",
                source: Box::new(e),
            })
    }

    /// Lazily connected channel to the RPC listener.
    ///
    /// Whether TLS is used, and whether a client certificate is presented,
    /// follows the RPC listener's policy; the material comes from the
    /// gateway's own TLS settings.
    fn dial(&self) -> Result<GatewayChannel, RunError> {
        let material = &self.config.endpoint.tls;
        let tls = TlsConfig {
            enabled: self.rpc_tls.enabled,
            mutual: self.rpc_tls.mutual,
            ..material.clone()
        };

        let security = ClientSecurity::from_config(&tls, &default_server_name(&self.rpc_address))?;
        let target = format!("{}://{}", security.scheme(), dial_addr(self.rpc_local_addr));
        let channel = create_channel_lazy_with_config(target, self.config.upstream.clone(), &security)?;

        Ok(InterceptedService::new(
            channel,
            TraceContextInterceptor::with_service_name(self.service_name.clone()),
        ))
    }
}

/// Address to dial for a bound listener; wildcard binds are reached over
/// loopback.
pub(crate) fn dial_addr(bound: SocketAddr) -> SocketAddr {
    match bound.ip() {
        IpAddr::V4(ip) if ip.is_unspecified() => SocketAddr::new(Ipv4Addr::LOCALHOST.into(), bound.port()),
        IpAddr::V6(ip) if ip.is_unspecified() => SocketAddr::new(Ipv6Addr::LOCALHOST.into(), bound.port()),
        _ => bound,
    }
}

/// Name expected in the RPC listener's certificate when none is configured:
/// the host part of its address, or `localhost` for wildcard and loopback
/// addresses.
pub(crate) fn default_server_name(address: &str) -> String {
    let host = match address.rsplit_once(':') {
        Some((host, port)) if port.chars().all(|c| c.is_ascii_digit()) => host,
        _ => address,
    };
    let host = host.trim_start_matches('[').trim_end_matches(']');

    match host.parse::<IpAddr>() {
        Ok(ip) if ip.is_unspecified() || ip.is_loopback() => "localhost".to_string(),
        Ok(ip) => ip.to_string(),
        Err(_) if host.is_empty() => "localhost".to_string(),
        Err(_) => host.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_dial_addr_maps_wildcards_to_loopback() {
        assert_eq!(
            dial_addr("0.0.0.0:50001".parse().unwrap()),
            "127.0.0.1:50001".parse().unwrap()
        );
        assert_eq!(dial_addr("[::]:50001".parse().unwrap()), "[::1]:50001".parse().unwrap());
        assert_eq!(
            dial_addr("10.0.0.5:50001".parse().unwrap()),
            "10.0.0.5:50001".parse().unwrap()
        );
    }

    #[test]
    fn test_default_server_name() {
        assert_eq!(default_server_name("0.0.0.0:50001"), "localhost");
        assert_eq!(default_server_name("127.0.0.1:50001"), "localhost");
        assert_eq!(default_server_name("[::]:50001"), "localhost");
        assert_eq!(default_server_name(":50001"), "localhost");
        assert_eq!(default_server_name("orders.internal:50001"), "orders.internal");
        assert_eq!(default_server_name("10.0.0.5:50001"), "10.0.0.5");
    }
}
