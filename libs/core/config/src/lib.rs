pub mod tracing;

use std::env;
use std::str::FromStr;
use thiserror::Error;

/// Configuration error type
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Environment variable '{0}' is required but not set")]
    MissingEnvVar(String),

    #[error("Failed to parse environment variable '{key}': {details}")]
    ParseError { key: String, details: String },
}

/// Application environment (dev = local/kind, prod = full k8s)
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Environment {
    Development, // Local dev or kind cluster
    Production,  // Full k8s cluster
}

impl Environment {
    pub fn from_env() -> Self {
        let app_env = env::var("APP_ENV").unwrap_or_else(|_| "development".to_string());

        if app_env.eq_ignore_ascii_case("production") {
            Environment::Production
        } else {
            Environment::Development
        }
    }

    pub fn is_production(&self) -> bool {
        matches!(self, Environment::Production)
    }

    pub fn is_development(&self) -> bool {
        matches!(self, Environment::Development)
    }
}

/// Trait for configuration that can be loaded from environment variables
pub trait FromEnv: Sized {
    fn from_env() -> Result<Self, ConfigError>;
}

/// Helper to load and parse environment variable with a default value
pub fn env_or_default(key: &str, default: &str) -> String {
    env::var(key).unwrap_or_else(|_| default.to_string())
}

/// Helper to load and parse environment variable or return error
pub fn env_required(key: &str) -> Result<String, ConfigError> {
    env::var(key).map_err(|_| ConfigError::MissingEnvVar(key.to_string()))
}

/// Helper to load an optional environment variable.
///
/// Unset and empty values both yield `None`.
pub fn env_optional(key: &str) -> Option<String> {
    env::var(key).ok().filter(|v| !v.trim().is_empty())
}

/// Parse an optional environment variable into `T`.
///
/// Unset or empty variables yield `Ok(None)`; values that fail to parse are
/// reported with the offending key.
pub fn env_parse<T>(key: &str) -> Result<Option<T>, ConfigError>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    env_optional(key)
        .map(|raw| {
            raw.trim().parse::<T>().map_err(|e| ConfigError::ParseError {
                key: key.to_string(),
                details: e.to_string(),
            })
        })
        .transpose()
}

/// Read a boolean flag.
///
/// Accepts `true/false`, `1/0`, `yes/no` and `on/off` (case-insensitive).
pub fn env_flag(key: &str) -> Result<Option<bool>, ConfigError> {
    let Some(raw) = env_optional(key) else {
        return Ok(None);
    };

    match raw.trim().to_ascii_lowercase().as_str() {
        "true" | "1" | "yes" | "on" => Ok(Some(true)),
        "false" | "0" | "no" | "off" => Ok(Some(false)),
        other => Err(ConfigError::ParseError {
            key: key.to_string(),
            details: format!("'{other}' is not a boolean"),
        }),
    }
}

/// Read a comma-separated list, dropping blank entries.
pub fn env_list(key: &str) -> Vec<String> {
    env_optional(key)
        .map(|raw| {
            raw.split(',')
                .map(str::trim)
                .filter(|s| !s.is_empty())
                .map(String::from)
                .collect()
        })
        .unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_environment_defaults_to_development() {
        temp_env::with_var_unset("APP_ENV", || {
            let env = Environment::from_env();
            assert_eq!(env, Environment::Development);
            assert!(env.is_development());
            assert!(!env.is_production());
        });
    }

    #[test]
    fn test_environment_production_case_insensitive() {
        temp_env::with_var("APP_ENV", Some("PRODUCTION"), || {
            assert_eq!(Environment::from_env(), Environment::Production);
        });

        temp_env::with_var("APP_ENV", Some("Production"), || {
            assert_eq!(Environment::from_env(), Environment::Production);
        });
    }

    #[test]
    fn test_env_or_default_without_value() {
        temp_env::with_var_unset("MISSING_VAR", || {
            let result = env_or_default("MISSING_VAR", "default_value");
            assert_eq!(result, "default_value");
        });
    }

    #[test]
    fn test_env_required_missing() {
        temp_env::with_var_unset("MISSING_REQUIRED", || {
            let err = env_required("MISSING_REQUIRED").unwrap_err();
            assert!(err.to_string().contains("MISSING_REQUIRED"));
            assert!(err.to_string().contains("required"));
        });
    }

    #[test]
    fn test_env_optional_treats_blank_as_unset() {
        temp_env::with_var("BLANK_VAR", Some("   "), || {
            assert_eq!(env_optional("BLANK_VAR"), None);
        });
    }

    #[test]
    fn test_env_parse_number() {
        temp_env::with_var("INTERVAL", Some("15"), || {
            assert_eq!(env_parse::<u64>("INTERVAL").unwrap(), Some(15));
        });
        temp_env::with_var_unset("INTERVAL", || {
            assert_eq!(env_parse::<u64>("INTERVAL").unwrap(), None);
        });
    }

    #[test]
    fn test_env_parse_invalid_names_key() {
        temp_env::with_var("INTERVAL", Some("soon"), || {
            let err = env_parse::<u64>("INTERVAL").unwrap_err();
            assert!(err.to_string().contains("INTERVAL"));
        });
    }

    #[test]
    fn test_env_flag_variants() {
        for (raw, expected) in [("true", true), ("1", true), ("ON", true), ("no", false), ("0", false)] {
            temp_env::with_var("FLAG", Some(raw), || {
                assert_eq!(env_flag("FLAG").unwrap(), Some(expected), "input {raw}");
            });
        }
    }

    #[test]
    fn test_env_flag_rejects_garbage() {
        temp_env::with_var("FLAG", Some("maybe"), || {
            assert!(env_flag("FLAG").is_err());
        });
    }

    #[test]
    fn test_env_list_splits_and_trims() {
        temp_env::with_var("URLS", Some("https://a/jwks.json, ,https://b/jwks.json "), || {
            assert_eq!(
                env_list("URLS"),
                vec!["https://a/jwks.json".to_string(), "https://b/jwks.json".to_string()]
            );
        });
    }
}
