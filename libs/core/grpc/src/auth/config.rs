use core_config::{ConfigError, FromEnv, env_list, env_parse};
use serde::Deserialize;
use std::str::FromStr;
use std::time::Duration;

/// Leeway applied to time-based claims when none is configured.
pub const DEFAULT_LEEWAY_SECS: u64 = 60;

/// What to do with a call that carries metadata but no `authorization` header.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MissingTokenPolicy {
    /// Let the call through unauthenticated; handlers see no claims.
    #[default]
    Allow,
    /// Fail the call with `InvalidArgument`.
    Reject,
}

impl FromStr for MissingTokenPolicy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "allow" => Ok(Self::Allow),
            "reject" => Ok(Self::Reject),
            other => Err(format!("expected `allow` or `reject`, got `{other}`")),
        }
    }
}

/// Token validation policy.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct AuthConfig {
    /// Accepted `aud` values. Empty disables audience validation.
    pub audience: Vec<String>,
    /// Accepted `iss` values. Empty disables issuer validation.
    pub issuer: Vec<String>,
    pub leeway_secs: u64,
    pub missing_token: MissingTokenPolicy,
    /// How often remote key sets are refetched. `None` fetches once.
    pub refresh_interval_secs: Option<u64>,
}

impl Default for AuthConfig {
    fn default() -> Self {
        Self {
            audience: Vec::new(),
            issuer: Vec::new(),
            leeway_secs: DEFAULT_LEEWAY_SECS,
            missing_token: MissingTokenPolicy::Allow,
            refresh_interval_secs: None,
        }
    }
}

impl AuthConfig {
    pub fn with_audience(mut self, audience: impl Into<String>) -> Self {
        self.audience.push(audience.into());
        self
    }

    pub fn with_issuer(mut self, issuer: impl Into<String>) -> Self {
        self.issuer.push(issuer.into());
        self
    }

    pub fn with_leeway_secs(mut self, secs: u64) -> Self {
        self.leeway_secs = secs;
        self
    }

    pub fn with_missing_token(mut self, policy: MissingTokenPolicy) -> Self {
        self.missing_token = policy;
        self
    }

    pub fn with_refresh_interval_secs(mut self, secs: u64) -> Self {
        self.refresh_interval_secs = Some(secs);
        self
    }

    pub fn refresh_interval(&self) -> Option<Duration> {
        self.refresh_interval_secs
            .filter(|secs| *secs > 0)
            .map(Duration::from_secs)
    }
}

impl FromEnv for AuthConfig {
    /// Reads `JWT_AUDIENCE`, `JWT_ISSUER` (comma separated), `JWT_LEEWAY_SECONDS`,
    /// `JWT_MISSING_TOKEN` (`allow` | `reject`) and `JWK_REFRESH_SECONDS`.
    fn from_env() -> Result<Self, ConfigError> {
        Ok(Self {
            audience: env_list("JWT_AUDIENCE"),
            issuer: env_list("JWT_ISSUER"),
            leeway_secs: env_parse("JWT_LEEWAY_SECONDS")?.unwrap_or(DEFAULT_LEEWAY_SECS),
            missing_token: env_parse("JWT_MISSING_TOKEN")?.unwrap_or_default(),
            refresh_interval_secs: env_parse("JWK_REFRESH_SECONDS")?,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = AuthConfig::default();
        assert!(config.audience.is_empty());
        assert_eq!(config.leeway_secs, 60);
        assert_eq!(config.missing_token, MissingTokenPolicy::Allow);
        assert_eq!(config.refresh_interval(), None);
    }

    #[test]
    fn test_zero_refresh_means_fetch_once() {
        assert_eq!(AuthConfig::default().with_refresh_interval_secs(0).refresh_interval(), None);
    }

    #[test]
    fn test_from_env() {
        temp_env::with_vars(
            [
                ("JWT_AUDIENCE", Some("orders, billing")),
                ("JWT_ISSUER", Some("https://issuer.example")),
                ("JWT_MISSING_TOKEN", Some("Reject")),
                ("JWT_LEEWAY_SECONDS", None),
                ("JWK_REFRESH_SECONDS", Some("300")),
            ],
            || {
                let config = AuthConfig::from_env().unwrap();
                assert_eq!(config.audience, vec!["orders", "billing"]);
                assert_eq!(config.issuer, vec!["https://issuer.example"]);
                assert_eq!(config.missing_token, MissingTokenPolicy::Reject);
                assert_eq!(config.leeway_secs, DEFAULT_LEEWAY_SECS);
                assert_eq!(config.refresh_interval(), Some(Duration::from_secs(300)));
            },
        );
    }

    #[test]
    fn test_invalid_missing_token_policy() {
        temp_env::with_var("JWT_MISSING_TOKEN", Some("sometimes"), || {
            let err = AuthConfig::from_env().unwrap_err();
            assert!(matches!(err, ConfigError::ParseError { ref key, .. } if key == "JWT_MISSING_TOKEN"));
        });
    }
}
