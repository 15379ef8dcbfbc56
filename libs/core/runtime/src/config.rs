//! Service-level configuration.
//!
//! Everything a [`Server`](crate::Server) needs is carried by one immutable
//! [`ServiceConfig`]. Values are built from `Default`, the environment or
//! serde, and adjusted with consuming `with_*` methods.

use axum::http::{HeaderValue, Method};
use core_config::{ConfigError, FromEnv, env_flag, env_list, env_or_default};
use grpc_core::{AuthConfig, ChannelConfig, TlsConfig};
use observability::{ExporterConfig, Signal, TelemetryConfig};
use serde::Deserialize;
use tower_http::cors::{AllowOrigin, Any, CorsLayer};

pub const DEFAULT_SERVICE_NAME: &str = "service";
pub const DEFAULT_RPC_ADDR: &str = "0.0.0.0:50001";
pub const DEFAULT_GATEWAY_ADDR: &str = "0.0.0.0:50002";

const DEFAULT_CORS_METHODS: [Method; 6] = [
    Method::GET,
    Method::PUT,
    Method::POST,
    Method::DELETE,
    Method::HEAD,
    Method::OPTIONS,
];

/// One listener: whether it runs, where, and its TLS material.
#[derive(Debug, Clone, Default, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct EndpointConfig {
    pub disabled: bool,
    /// `host:port`. Must be non-empty unless disabled; checked at bind time.
    pub address: String,
    pub tls: TlsConfig,
}

impl EndpointConfig {
    pub fn new(address: impl Into<String>) -> Self {
        Self {
            address: address.into(),
            ..Self::default()
        }
    }

    pub fn with_address(mut self, address: impl Into<String>) -> Self {
        self.address = address.into();
        self
    }

    pub fn with_disabled(mut self, disabled: bool) -> Self {
        self.disabled = disabled;
        self
    }

    pub fn with_tls(mut self, tls: TlsConfig) -> Self {
        self.tls = tls;
        self
    }

    /// Load from `{prefix}_ADDR`, `{prefix}_DISABLED` and `{prefix}_TLS_*`.
    pub fn from_env_prefixed(prefix: &str, default_address: &str) -> Result<Self, ConfigError> {
        Ok(Self {
            disabled: env_flag(&format!("{prefix}_DISABLED"))?.unwrap_or(false),
            address: env_or_default(&format!("{prefix}_ADDR"), default_address),
            tls: TlsConfig::from_env_prefixed(prefix)?,
        })
    }
}

/// Cross-origin policy for the HTTP gateway.
#[derive(Debug, Clone, Default, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct CorsConfig {
    /// Allowed origins. Empty, or containing `*`, allows any origin.
    pub origins: Vec<String>,
    /// Allowed methods. Empty uses GET, PUT, POST, DELETE, HEAD and OPTIONS.
    pub methods: Vec<String>,
}

impl CorsConfig {
    pub fn layer(&self) -> Result<CorsLayer, String> {
        let origin = if self.origins.is_empty() || self.origins.iter().any(|o| o == "*") {
            AllowOrigin::any()
        } else {
            let origins = self
                .origins
                .iter()
                .map(|o| {
                    o.parse::<HeaderValue>()
                        .map_err(|e| format!("invalid CORS origin '{o}': {e}"))
                })
                .collect::<Result<Vec<_>, _>>()?;
            AllowOrigin::list(origins)
        };

        let methods = if self.methods.is_empty() {
            DEFAULT_CORS_METHODS.to_vec()
        } else {
            self.methods
                .iter()
                .map(|m| {
                    Method::from_bytes(m.trim().to_ascii_uppercase().as_bytes())
                        .map_err(|e| format!("invalid CORS method '{m}': {e}"))
                })
                .collect::<Result<Vec<_>, _>>()?
        };

        Ok(CorsLayer::new()
            .allow_origin(origin)
            .allow_methods(methods)
            .allow_headers(Any))
    }
}

/// The HTTP gateway listener.
///
/// `endpoint.tls` holds the material the gateway presents and trusts when
/// dialing the RPC listener; whether that leg uses TLS at all follows the
/// RPC endpoint's policy.
#[derive(Debug, Clone, Default, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct GatewayConfig {
    #[serde(flatten)]
    pub endpoint: EndpointConfig,
    pub cors: Option<CorsConfig>,
    /// Dial settings for the channel to the RPC listener.
    pub upstream: ChannelConfig,
}

impl GatewayConfig {
    pub fn new(address: impl Into<String>) -> Self {
        Self {
            endpoint: EndpointConfig::new(address),
            cors: None,
            upstream: ChannelConfig::default(),
        }
    }

    pub fn with_endpoint(mut self, endpoint: EndpointConfig) -> Self {
        self.endpoint = endpoint;
        self
    }

    pub fn with_cors(mut self, cors: CorsConfig) -> Self {
        self.cors = Some(cors);
        self
    }

    pub fn with_upstream(mut self, upstream: ChannelConfig) -> Self {
        self.upstream = upstream;
        self
    }
}

/// Complete configuration of one service process.
#[derive(Debug, Clone, Deserialize, PartialEq)]
#[serde(default)]
pub struct ServiceConfig {
    /// Identity reported in telemetry.
    pub service_name: String,
    pub rpc: EndpointConfig,
    pub gateway: GatewayConfig,
    pub telemetry: TelemetryConfig,
    /// Remote key sets used to verify bearer tokens. Empty disables auth
    /// unless an explicit authenticator is supplied.
    pub jwk_urls: Vec<String>,
    pub auth: AuthConfig,
}

impl Default for ServiceConfig {
    fn default() -> Self {
        Self {
            service_name: DEFAULT_SERVICE_NAME.to_string(),
            rpc: EndpointConfig::new(DEFAULT_RPC_ADDR),
            gateway: GatewayConfig::new(DEFAULT_GATEWAY_ADDR),
            telemetry: TelemetryConfig::default(),
            jwk_urls: Vec::new(),
            auth: AuthConfig::default(),
        }
    }
}

impl ServiceConfig {
    pub fn new(service_name: impl Into<String>) -> Self {
        Self {
            service_name: service_name.into(),
            ..Self::default()
        }
    }

    pub fn with_rpc(mut self, rpc: EndpointConfig) -> Self {
        self.rpc = rpc;
        self
    }

    pub fn with_gateway(mut self, gateway: GatewayConfig) -> Self {
        self.gateway = gateway;
        self
    }

    pub fn with_telemetry(mut self, telemetry: TelemetryConfig) -> Self {
        self.telemetry = telemetry;
        self
    }

    /// Enable telemetry with `base` as the shared exporter settings.
    pub fn with_telemetry_base(mut self, base: ExporterConfig) -> Self {
        self.telemetry = self.telemetry.with_base(base);
        self
    }

    pub fn with_telemetry_signal(mut self, signal: Signal, config: ExporterConfig) -> Self {
        self.telemetry = self.telemetry.with_signal(signal, config);
        self
    }

    pub fn with_jwk_urls<I, S>(mut self, urls: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.jwk_urls = urls.into_iter().map(Into::into).collect();
        self
    }

    pub fn with_auth(mut self, auth: AuthConfig) -> Self {
        self.auth = auth;
        self
    }
}

impl FromEnv for ServiceConfig {
    fn from_env() -> Result<Self, ConfigError> {
        let origins = env_list("CORS_ALLOWED_ORIGIN");
        let methods = env_list("CORS_ALLOWED_METHODS");
        let cors = (!origins.is_empty() || !methods.is_empty())
            .then_some(CorsConfig { origins, methods });

        Ok(Self {
            service_name: env_or_default("SERVICE_NAME", DEFAULT_SERVICE_NAME),
            rpc: EndpointConfig::from_env_prefixed("GRPC", DEFAULT_RPC_ADDR)?,
            gateway: GatewayConfig {
                endpoint: EndpointConfig::from_env_prefixed("GATEWAY", DEFAULT_GATEWAY_ADDR)?,
                cors,
                upstream: ChannelConfig::from_env_prefixed("GATEWAY_UPSTREAM")?,
            },
            telemetry: TelemetryConfig::from_env()?,
            jwk_urls: env_list("JWK_URLS"),
            auth: AuthConfig::from_env()?,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use grpc_core::MissingTokenPolicy;

    #[test]
    fn test_defaults() {
        let config = ServiceConfig::default();
        assert_eq!(config.rpc.address, DEFAULT_RPC_ADDR);
        assert_eq!(config.gateway.endpoint.address, DEFAULT_GATEWAY_ADDR);
        assert!(!config.rpc.disabled);
        assert!(!config.telemetry.base.enabled);
        assert!(config.jwk_urls.is_empty());
    }

    #[test]
    fn test_with_methods_do_not_touch_other_fields() {
        let base = ServiceConfig::new("orders");
        let changed = base.clone().with_rpc(EndpointConfig::new("127.0.0.1:0"));

        assert_eq!(changed.rpc.address, "127.0.0.1:0");
        assert_eq!(changed.gateway, base.gateway);
        assert_eq!(changed.service_name, "orders");
    }

    #[test]
    fn test_from_env() {
        temp_env::with_vars(
            [
                ("SERVICE_NAME", Some("orders")),
                ("GRPC_ADDR", Some("127.0.0.1:6000")),
                ("GRPC_TLS_ENABLED", Some("true")),
                ("GATEWAY_DISABLED", Some("true")),
                ("GATEWAY_ADDR", None),
                ("CORS_ALLOWED_ORIGIN", Some("https://app.example.com")),
                ("CORS_ALLOWED_METHODS", None),
                ("JWK_URLS", Some("https://a.example/jwks.json,https://b.example/jwks.json")),
                ("JWT_MISSING_TOKEN", Some("reject")),
                ("OTEL_ENABLED", Some("true")),
                ("OTEL_METRICS_ENABLED", Some("true")),
                ("GATEWAY_UPSTREAM_CONNECT_TIMEOUT_MS", Some("1500")),
            ],
            || {
                let config = ServiceConfig::from_env().unwrap();
                assert_eq!(config.service_name, "orders");
                assert_eq!(config.rpc.address, "127.0.0.1:6000");
                assert!(config.rpc.tls.enabled);
                assert!(config.gateway.endpoint.disabled);
                assert_eq!(config.gateway.endpoint.address, DEFAULT_GATEWAY_ADDR);
                assert_eq!(
                    config.gateway.cors.unwrap().origins,
                    vec!["https://app.example.com"]
                );
                assert_eq!(config.jwk_urls.len(), 2);
                assert_eq!(config.auth.missing_token, MissingTokenPolicy::Reject);
                assert!(config.telemetry.is_enabled(Signal::Metrics));
                assert!(!config.telemetry.is_enabled(Signal::Tracing));
                assert_eq!(config.gateway.upstream.connect_timeout_ms, 1500);
            },
        );
    }

    #[test]
    fn test_deserialize_gateway_flattened() {
        let config: ServiceConfig = serde_json::from_value(serde_json::json!({
            "service_name": "orders",
            "gateway": { "address": "127.0.0.1:8080", "cors": { "origins": ["*"] } },
        }))
        .unwrap();

        assert_eq!(config.gateway.endpoint.address, "127.0.0.1:8080");
        assert_eq!(config.rpc.address, DEFAULT_RPC_ADDR);
        assert!(config.gateway.cors.is_some());
    }

    #[test]
    fn test_cors_layer() {
        assert!(CorsConfig::default().layer().is_ok());

        let explicit = CorsConfig {
            origins: vec!["https://app.example.com".to_string()],
            methods: vec!["get".to_string(), "PATCH".to_string()],
        };
        assert!(explicit.layer().is_ok());

        let bad = CorsConfig {
            origins: vec!["bad\norigin".to_string()],
            methods: Vec::new(),
        };
        assert!(bad.layer().is_err());
    }
}
