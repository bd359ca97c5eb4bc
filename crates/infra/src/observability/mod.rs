//! Tracing initialisation
//!
//! Installs the global `tracing` subscriber from [`LoggingConfig`]:
//! - `RUST_LOG` wins over the configured level when set
//! - `json = true` switches the fmt layer to one JSON object per line
//! - installing twice is not an error; the first subscriber stays

use calbridge_domain::{CalbridgeError, LoggingConfig, Result};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

/// Build the filter from `RUST_LOG`, falling back to `config.level`.
///
/// # Errors
/// Returns `CalbridgeError::Config` if the configured level is not a valid
/// filter directive.
pub fn env_filter(config: &LoggingConfig) -> Result<EnvFilter> {
    if let Ok(filter) = EnvFilter::try_from_default_env() {
        return Ok(filter);
    }
    EnvFilter::try_new(&config.level)
        .map_err(|e| CalbridgeError::Config(format!("Invalid log level {}: {e}", config.level)))
}

/// Install the global subscriber.
///
/// Returns `Ok(true)` when this call installed it and `Ok(false)` when a
/// subscriber was already in place.
///
/// # Errors
/// Returns `CalbridgeError::Config` for an invalid log level.
pub fn init_tracing(config: &LoggingConfig) -> Result<bool> {
    let filter = env_filter(config)?;
    let registry = tracing_subscriber::registry().with(filter);

    let installed = if config.json {
        registry.with(fmt::layer().json()).try_init().is_ok()
    } else {
        registry.with(fmt::layer()).try_init().is_ok()
    };

    if installed {
        tracing::debug!(level = %config.level, json = config.json, "Tracing initialised");
    }
    Ok(installed)
}

#[cfg(test)]
mod tests {
    use serial_test::serial;

    use super::*;

    #[test]
    #[serial]
    fn invalid_level_is_a_config_error() {
        std::env::remove_var("RUST_LOG");
        let config = LoggingConfig { level: "calbridge=loud".to_string(), json: false };
        assert!(matches!(env_filter(&config), Err(CalbridgeError::Config(_))));
    }

    #[test]
    #[serial]
    fn second_install_reports_false() {
        std::env::remove_var("RUST_LOG");
        let config = LoggingConfig::default();
        init_tracing(&config).unwrap();
        assert!(!init_tracing(&config).unwrap());
    }
}
