//! Configuration management

use serde::{Deserialize, Serialize};

use crate::constants::{DEFAULT_MAX_EXPANSION, DEFAULT_QUERY_LIMIT, DEFAULT_WAIT_TIMEOUT_MS};
use crate::impl_domain_status_conversions;
use crate::types::EditMode;

/// Application configuration
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub backend: BackendConfig,
    pub query: QueryConfig,
    pub logging: LoggingConfig,
}

/// What happens to registrations that arrive while the backend drains
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum ShutdownPolicy {
    /// Refuse the registration with `ShuttingDown`.
    #[default]
    Reject,
    /// Register the request and cancel it immediately.
    Cancel,
}

impl_domain_status_conversions!(ShutdownPolicy {
    Reject => "reject",
    Cancel => "cancel",
});

/// Request lifecycle configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct BackendConfig {
    /// Timeout for the blocking facade calls; 0 waits until the request
    /// leaves the active state.
    pub wait_timeout_ms: u64,
    pub shutdown_policy: ShutdownPolicy,
    /// Edit mode used when a save carries no hint.
    pub default_edit_mode: EditMode,
}

impl Default for BackendConfig {
    fn default() -> Self {
        Self {
            wait_timeout_ms: DEFAULT_WAIT_TIMEOUT_MS,
            shutdown_policy: ShutdownPolicy::default(),
            default_edit_mode: EditMode::default(),
        }
    }
}

/// Query engine configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct QueryConfig {
    pub default_limit: usize,
    /// Hard cap on occurrences generated from one unbounded rule.
    pub max_expansion: usize,
}

impl Default for QueryConfig {
    fn default() -> Self {
        Self { default_limit: DEFAULT_QUERY_LIMIT, max_expansion: DEFAULT_MAX_EXPANSION }
    }
}

/// Logging configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Default filter directive, overridden by `RUST_LOG`.
    pub level: String,
    pub json: bool,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self { level: "info".to_string(), json: false }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn partial_json_falls_back_to_defaults() {
        let config: Config =
            serde_json::from_str(r#"{"backend":{"shutdown_policy":"cancel"}}"#).unwrap();
        assert_eq!(config.backend.shutdown_policy, ShutdownPolicy::Cancel);
        assert_eq!(config.backend.wait_timeout_ms, DEFAULT_WAIT_TIMEOUT_MS);
        assert_eq!(config.query, QueryConfig::default());
        assert_eq!(config.logging.level, "info");
    }

    #[test]
    fn default_edit_mode_is_this_occurrence() {
        assert_eq!(Config::default().backend.default_edit_mode, EditMode::ThisOccurrence);
    }
}
