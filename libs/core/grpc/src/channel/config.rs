use core_config::{ConfigError, env_flag, env_parse};
use serde::Deserialize;
use std::time::Duration;
use tonic::transport::Endpoint;

const DEFAULT_WINDOW_SIZE: u32 = 1024 * 1024;

/// HTTP/2 and TCP settings for dialing an RPC listener.
///
/// Durations are plain integers so the same struct loads from the
/// environment and from serde sources. A zero keep-alive interval or
/// request timeout turns that feature off.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct ChannelConfig {
  pub connect_timeout_ms: u64,
  /// Deadline for a single call, `0` for none.
  pub request_timeout_ms: u64,
  /// HTTP/2 PING interval, `0` disables pings.
  pub keep_alive_secs: u64,
  pub keep_alive_timeout_secs: u64,
  /// Initial connection and stream flow-control window.
  pub window_size: Option<u32>,
  pub tcp_nodelay: bool,
}

impl Default for ChannelConfig {
  fn default() -> Self {
    Self {
      connect_timeout_ms: 5_000,
      request_timeout_ms: 30_000,
      keep_alive_secs: 30,
      keep_alive_timeout_secs: 10,
      window_size: Some(DEFAULT_WINDOW_SIZE),
      tcp_nodelay: true,
    }
  }
}

impl ChannelConfig {
  pub fn new() -> Self {
    Self::default()
  }

  pub fn with_connect_timeout(mut self, timeout: Duration) -> Self {
    self.connect_timeout_ms = timeout.as_millis() as u64;
    self
  }

  pub fn with_request_timeout(mut self, timeout: Duration) -> Self {
    self.request_timeout_ms = timeout.as_millis() as u64;
    self
  }

  pub fn without_keep_alive(mut self) -> Self {
    self.keep_alive_secs = 0;
    self
  }

  pub fn with_window_size(mut self, size: u32) -> Self {
    self.window_size = Some(size);
    self
  }

  /// Load overrides from `{prefix}_CONNECT_TIMEOUT_MS`,
  /// `_REQUEST_TIMEOUT_MS`, `_KEEP_ALIVE_SECONDS`, `_WINDOW_SIZE` and
  /// `_TCP_NODELAY`, falling back to the defaults.
  pub fn from_env_prefixed(prefix: &str) -> Result<Self, ConfigError> {
    let key = |suffix: &str| format!("{prefix}_{suffix}");
    let defaults = Self::default();

    Ok(Self {
      connect_timeout_ms: env_parse(&key("CONNECT_TIMEOUT_MS"))?.unwrap_or(defaults.connect_timeout_ms),
      request_timeout_ms: env_parse(&key("REQUEST_TIMEOUT_MS"))?.unwrap_or(defaults.request_timeout_ms),
      keep_alive_secs: env_parse(&key("KEEP_ALIVE_SECONDS"))?.unwrap_or(defaults.keep_alive_secs),
      keep_alive_timeout_secs: defaults.keep_alive_timeout_secs,
      window_size: env_parse(&key("WINDOW_SIZE"))?.or(defaults.window_size),
      tcp_nodelay: env_flag(&key("TCP_NODELAY"))?.unwrap_or(defaults.tcp_nodelay),
    })
  }

  pub fn connect_timeout(&self) -> Duration {
    Duration::from_millis(self.connect_timeout_ms)
  }

  pub fn request_timeout(&self) -> Option<Duration> {
    (self.request_timeout_ms > 0).then(|| Duration::from_millis(self.request_timeout_ms))
  }

  pub fn keep_alive_interval(&self) -> Option<Duration> {
    (self.keep_alive_secs > 0).then(|| Duration::from_secs(self.keep_alive_secs))
  }

  pub fn apply_to_endpoint(&self, mut endpoint: Endpoint) -> Endpoint {
    if let Some(interval) = self.keep_alive_interval() {
      endpoint = endpoint
        .http2_keep_alive_interval(interval)
        .keep_alive_timeout(Duration::from_secs(self.keep_alive_timeout_secs))
        .keep_alive_while_idle(true);
    }

    endpoint = endpoint.connect_timeout(self.connect_timeout());
    if let Some(timeout) = self.request_timeout() {
      endpoint = endpoint.timeout(timeout);
    }

    match self.window_size {
      Some(size) => {
        endpoint = endpoint
          .initial_connection_window_size(size)
          .initial_stream_window_size(size);
      }
      None => endpoint = endpoint.http2_adaptive_window(true),
    }

    endpoint.tcp_nodelay(self.tcp_nodelay)
  }
}
