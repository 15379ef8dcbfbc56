//! Telemetry exporter configuration and per-signal resolution.
//!
//! Every attribute of a signal is resolved independently through three
//! levels: the signal-specific override, then the service-wide base, then a
//! built-in default. A signal may therefore inherit its address from the base
//! while overriding only the protocol.

use core_config::{ConfigError, FromEnv, env_flag, env_optional, env_parse};
use serde::{Deserialize, Deserializer, Serialize};
use std::fmt;
use std::str::FromStr;
use std::time::Duration;

/// Collector address used when neither the signal nor the base sets one.
pub const DEFAULT_ADDRESS: &str = "127.0.0.1:4317";

/// Export interval used when neither the signal nor the base sets one.
pub const DEFAULT_INTERVAL: Duration = Duration::from_secs(5);

/// Telemetry signal kinds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Signal {
    Tracing,
    Metrics,
    Logging,
}

impl Signal {
    pub const ALL: [Signal; 3] = [Signal::Tracing, Signal::Metrics, Signal::Logging];

    pub fn as_str(&self) -> &'static str {
        match self {
            Signal::Tracing => "tracing",
            Signal::Metrics => "metrics",
            Signal::Logging => "logging",
        }
    }

    /// OTLP/HTTP path for this signal.
    pub fn http_path(&self) -> &'static str {
        match self {
            Signal::Tracing => "/v1/traces",
            Signal::Metrics => "/v1/metrics",
            Signal::Logging => "/v1/logs",
        }
    }

    fn env_prefix(&self) -> &'static str {
        match self {
            Signal::Tracing => "OTEL_TRACING",
            Signal::Metrics => "OTEL_METRICS",
            Signal::Logging => "OTEL_LOGGING",
        }
    }
}

impl fmt::Display for Signal {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Export protocol.
///
/// Parsing never fails: unknown values (including the empty string) select
/// the console exporter.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Protocol {
    Grpc,
    Http,
    Https,
    #[default]
    Stdout,
}

impl Protocol {
    pub fn as_str(&self) -> &'static str {
        match self {
            Protocol::Grpc => "grpc",
            Protocol::Http => "http",
            Protocol::Https => "https",
            Protocol::Stdout => "stdout",
        }
    }

    /// Whether this protocol ships data over the network.
    pub fn is_network(&self) -> bool {
        !matches!(self, Protocol::Stdout)
    }
}

impl FromStr for Protocol {
    type Err = std::convert::Infallible;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(match s.trim().to_ascii_lowercase().as_str() {
            "grpc" => Protocol::Grpc,
            "http" => Protocol::Http,
            "https" => Protocol::Https,
            _ => Protocol::Stdout,
        })
    }
}

impl<'de> Deserialize<'de> for Protocol {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = String::deserialize(deserializer)?;
        Ok(raw.parse().unwrap_or_default())
    }
}

/// A blank protocol is "not set here" so the next level applies; any other
/// value parses like [`Protocol::from_str`].
fn blank_protocol_as_unset<'de, D: Deserializer<'de>>(
    deserializer: D,
) -> Result<Option<Protocol>, D::Error> {
    let raw = Option::<String>::deserialize(deserializer)?;
    Ok(raw
        .filter(|p| !p.trim().is_empty())
        .map(|p| p.parse().unwrap_or_default()))
}

impl fmt::Display for Protocol {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Exporter settings for the base level or a single signal.
///
/// `None` (and empty strings / zero intervals) mean "not set here".
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ExporterConfig {
    pub enabled: bool,
    pub address: Option<String>,
    #[serde(deserialize_with = "blank_protocol_as_unset")]
    pub protocol: Option<Protocol>,
    pub insecure: Option<bool>,
    pub interval_secs: Option<u64>,
}

impl ExporterConfig {
    pub fn enabled() -> Self {
        Self {
            enabled: true,
            ..Self::default()
        }
    }

    pub fn with_address(mut self, address: impl Into<String>) -> Self {
        self.address = Some(address.into());
        self
    }

    pub fn with_protocol(mut self, protocol: Protocol) -> Self {
        self.protocol = Some(protocol);
        self
    }

    pub fn with_insecure(mut self, insecure: bool) -> Self {
        self.insecure = Some(insecure);
        self
    }

    pub fn with_interval_secs(mut self, secs: u64) -> Self {
        self.interval_secs = Some(secs);
        self
    }

    fn address(&self) -> Option<&str> {
        self.address.as_deref().filter(|a| !a.trim().is_empty())
    }

    fn interval(&self) -> Option<Duration> {
        self.interval_secs.filter(|s| *s > 0).map(Duration::from_secs)
    }

    fn from_env_prefixed(prefix: &str) -> Result<Self, ConfigError> {
        Ok(Self {
            enabled: env_flag(&format!("{prefix}_ENABLED"))?.unwrap_or(false),
            address: env_optional(&format!("{prefix}_ADDR")),
            protocol: env_optional(&format!("{prefix}_PROTOCOL")).map(|p| p.parse().unwrap_or_default()),
            insecure: env_flag(&format!("{prefix}_INSECURE"))?,
            interval_secs: env_parse(&format!("{prefix}_INTERVAL_SECONDS"))?,
        })
    }
}

/// Fully resolved exporter settings for one signal.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedExporter {
    pub signal: Signal,
    pub protocol: Protocol,
    pub address: String,
    pub insecure: bool,
    pub interval: Duration,
}

impl ResolvedExporter {
    /// Collector endpoint URL for network protocols.
    ///
    /// gRPC targets the bare authority, HTTP appends the signal path.
    pub fn endpoint(&self) -> String {
        let scheme = if self.insecure { "http" } else { "https" };
        match self.protocol {
            Protocol::Http | Protocol::Https => {
                format!("{scheme}://{}{}", self.address, self.signal.http_path())
            }
            Protocol::Grpc | Protocol::Stdout => format!("{scheme}://{}", self.address),
        }
    }
}

/// Telemetry configuration: a base exporter plus optional per-signal overrides.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct TelemetryConfig {
    #[serde(flatten)]
    pub base: ExporterConfig,
    pub tracing: Option<ExporterConfig>,
    pub metrics: Option<ExporterConfig>,
    pub logging: Option<ExporterConfig>,
    /// Instrumentation scope for the orchestrator's tracer (default: service name)
    pub tracer_name: Option<String>,
    /// Instrumentation scope for the logger handle (default: service name)
    pub logger_name: Option<String>,
}

impl TelemetryConfig {
    pub fn with_base(mut self, base: ExporterConfig) -> Self {
        self.base = base;
        self
    }

    pub fn with_signal(mut self, signal: Signal, config: ExporterConfig) -> Self {
        match signal {
            Signal::Tracing => self.tracing = Some(config),
            Signal::Metrics => self.metrics = Some(config),
            Signal::Logging => self.logging = Some(config),
        }
        self
    }

    pub fn with_tracer_name(mut self, name: impl Into<String>) -> Self {
        self.tracer_name = Some(name.into());
        self
    }

    pub fn with_logger_name(mut self, name: impl Into<String>) -> Self {
        self.logger_name = Some(name.into());
        self
    }

    pub fn signal(&self, signal: Signal) -> Option<&ExporterConfig> {
        match signal {
            Signal::Tracing => self.tracing.as_ref(),
            Signal::Metrics => self.metrics.as_ref(),
            Signal::Logging => self.logging.as_ref(),
        }
    }

    /// A signal exports only when telemetry as a whole and the signal itself
    /// are switched on.
    pub fn is_enabled(&self, signal: Signal) -> bool {
        self.base.enabled && self.signal(signal).is_some_and(|s| s.enabled)
    }

    pub fn address(&self, signal: Signal) -> String {
        self.signal(signal)
            .and_then(ExporterConfig::address)
            .or_else(|| self.base.address())
            .unwrap_or(DEFAULT_ADDRESS)
            .to_string()
    }

    pub fn protocol(&self, signal: Signal) -> Protocol {
        self.signal(signal)
            .and_then(|s| s.protocol)
            .or(self.base.protocol)
            .unwrap_or_default()
    }

    pub fn interval(&self, signal: Signal) -> Duration {
        self.signal(signal)
            .and_then(ExporterConfig::interval)
            .or_else(|| self.base.interval())
            .unwrap_or(DEFAULT_INTERVAL)
    }

    pub fn insecure(&self, signal: Signal) -> bool {
        self.signal(signal)
            .and_then(|s| s.insecure)
            .or(self.base.insecure)
            .unwrap_or(false)
    }

    pub fn resolve(&self, signal: Signal) -> ResolvedExporter {
        ResolvedExporter {
            signal,
            protocol: self.protocol(signal),
            address: self.address(signal),
            insecure: self.insecure(signal),
            interval: self.interval(signal),
        }
    }

    pub fn tracer_name<'a>(&'a self, service_name: &'a str) -> &'a str {
        self.tracer_name.as_deref().unwrap_or(service_name)
    }

    pub fn logger_name<'a>(&'a self, service_name: &'a str) -> &'a str {
        self.logger_name.as_deref().unwrap_or(service_name)
    }
}

impl FromEnv for TelemetryConfig {
    /// Reads `OTEL_{ENABLED,ADDR,PROTOCOL,INSECURE,INTERVAL_SECONDS}` for the
    /// base level and the same keys under `OTEL_TRACING_`, `OTEL_METRICS_` and
    /// `OTEL_LOGGING_` for the signals. A signal override exists only when at
    /// least one of its keys is set.
    fn from_env() -> Result<Self, ConfigError> {
        let base = ExporterConfig::from_env_prefixed("OTEL")?;

        let mut config = TelemetryConfig {
            base,
            tracer_name: env_optional("OTEL_TRACER_NAME"),
            logger_name: env_optional("OTEL_LOGGER_NAME"),
            ..Default::default()
        };

        for signal in Signal::ALL {
            let exporter = ExporterConfig::from_env_prefixed(signal.env_prefix())?;
            if exporter != ExporterConfig::default() {
                config = config.with_signal(signal, exporter);
            }
        }

        Ok(config)
    }
}
