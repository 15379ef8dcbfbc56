use crate::Environment;
use tracing::{debug, info};
use tracing_subscriber::{prelude::*, EnvFilter, Layer, Registry};

/// A type-erased layer mounted directly on the registry, e.g. the
/// OpenTelemetry bridge produced by the `observability` crate.
pub type BoxedLayer = Box<dyn Layer<Registry> + Send + Sync + 'static>;

/// Install color-eyre with a project-standard configuration.
///
/// Call this early in main() before any fallible operations. Safe to call
/// multiple times.
pub fn install_color_eyre() {
    let _ = color_eyre::config::HookBuilder::default()
        .display_location_section(true)
        .display_env_section(false)
        .install();
}

/// Initialize tracing with environment-aware formatting and error span capture.
///
/// - **Production** (`APP_ENV=production`): JSON lines, no module targets
/// - **Development** (default): pretty-printed
///
/// `RUST_LOG` overrides the default filter. Returns `false` when a global
/// subscriber was already installed (common in tests).
pub fn init_tracing(environment: &Environment) -> bool {
    init_tracing_with_layer(environment, None)
}

/// Same as [`init_tracing`], additionally mounting `extra` below the
/// formatting layer.
pub fn init_tracing_with_layer(environment: &Environment, extra: Option<BoxedLayer>) -> bool {
    let is_production = environment.is_production();

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        if is_production {
            EnvFilter::new("info,h2=warn,hyper=warn,tower=warn")
        } else {
            EnvFilter::new("debug,h2=info,hyper=info,tower=info")
        }
    });

    let result = if is_production {
        tracing_subscriber::registry()
            .with(extra)
            .with(
                tracing_subscriber::fmt::layer()
                    .json()
                    .with_target(false)
                    .flatten_event(true)
                    .with_filter(filter),
            )
            .with(tracing_error::ErrorLayer::default())
            .try_init()
    } else {
        tracing_subscriber::registry()
            .with(extra)
            .with(
                tracing_subscriber::fmt::layer()
                    .with_target(true)
                    .with_file(false)
                    .with_line_number(false)
                    .pretty()
                    .with_filter(filter),
            )
            .with(tracing_error::ErrorLayer::default())
            .try_init()
    };

    match result {
        Ok(_) => {
            info!(environment = ?environment, "Tracing initialized with ErrorLayer");
            true
        }
        Err(_) => {
            debug!("Tracing already initialized, skipping re-initialization");
            false
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_init_tracing_multiple_calls() {
        let env = Environment::Development;
        init_tracing(&env);
        // A second installation attempt is reported, not a panic.
        assert!(!init_tracing(&env));
    }

    #[test]
    fn test_init_tracing_production_with_custom_log_level() {
        temp_env::with_var("RUST_LOG", Some("warn"), || {
            init_tracing(&Environment::Production);
        });
    }
}
