//! Configuration loader
//!
//! Loads backend configuration from environment variables or files.
//!
//! ## Loading Strategy
//! 1. Reads an optional `.env` file into the process environment
//! 2. Applies any `CALBRIDGE_*` variables on top of the defaults
//! 3. If none is set, falls back to loading from file
//! 4. Supports JSON and TOML formats
//!
//! ## Environment Variables
//! - `CALBRIDGE_WAIT_TIMEOUT_MS`: Blocking facade timeout (0 = wait forever)
//! - `CALBRIDGE_SHUTDOWN_POLICY`: `reject` or `cancel`
//! - `CALBRIDGE_DEFAULT_EDIT_MODE`: Edit mode for saves without a hint
//! - `CALBRIDGE_QUERY_LIMIT`: Default number of items per query
//! - `CALBRIDGE_MAX_EXPANSION`: Occurrence cap for unbounded rules
//! - `CALBRIDGE_LOG_LEVEL`: Default tracing filter directive
//! - `CALBRIDGE_LOG_JSON`: Emit JSON log lines (true/false)
//!
//! ## File Locations
//! The loader probes the following paths (in order):
//! 1. `./calbridge.toml`, `./calbridge.json`, `./config.toml`, `./config.json`
//! 2. The same names in the parent and grandparent directories
//! 3. The same names next to the executable

use std::path::{Path, PathBuf};
use std::str::FromStr;

use calbridge_domain::constants::{
    ENV_DEFAULT_EDIT_MODE, ENV_LOG_JSON, ENV_LOG_LEVEL, ENV_MAX_EXPANSION, ENV_QUERY_LIMIT,
    ENV_SHUTDOWN_POLICY, ENV_WAIT_TIMEOUT_MS,
};
use calbridge_domain::{CalbridgeError, Config, EditMode, Result, ShutdownPolicy};

const ENV_KEYS: [&str; 7] = [
    ENV_WAIT_TIMEOUT_MS,
    ENV_SHUTDOWN_POLICY,
    ENV_DEFAULT_EDIT_MODE,
    ENV_QUERY_LIMIT,
    ENV_MAX_EXPANSION,
    ENV_LOG_LEVEL,
    ENV_LOG_JSON,
];

const CONFIG_FILE_NAMES: [&str; 4] =
    ["calbridge.toml", "calbridge.json", "config.toml", "config.json"];

/// Load configuration with automatic fallback strategy
///
/// Environment variables win when at least one `CALBRIDGE_*` variable is
/// set. Otherwise a config file is probed; when none exists the defaults are
/// returned.
///
/// # Errors
/// Returns `CalbridgeError::Config` if a variable or a found file holds an
/// invalid value.
pub fn load() -> Result<Config> {
    match load_from_env() {
        Ok(config) => {
            tracing::info!("Configuration loaded from environment variables");
            Ok(config)
        }
        Err(e) => {
            tracing::debug!(error = ?e, "Failed to load from environment, trying file");
            match probe_config_paths() {
                Some(path) => load_from_file(Some(path)),
                None => {
                    tracing::info!("No config file found, using defaults");
                    Ok(Config::default())
                }
            }
        }
    }
}

/// Load configuration from environment variables
///
/// Unset variables keep their default value, but at least one of them must
/// be present. A `.env` file in the working directory is read first.
///
/// # Errors
/// Returns `CalbridgeError::Config` if no variable is set or one has an
/// invalid value.
pub fn load_from_env() -> Result<Config> {
    if let Ok(path) = dotenvy::dotenv() {
        tracing::debug!(path = %path.display(), "Loaded .env file");
    }

    if !ENV_KEYS.iter().any(|key| std::env::var(key).is_ok()) {
        return Err(CalbridgeError::Config("No CALBRIDGE_* environment variable set".to_string()));
    }

    let mut config = Config::default();

    if let Some(ms) = env_parse::<u64>(ENV_WAIT_TIMEOUT_MS)? {
        config.backend.wait_timeout_ms = ms;
    }
    if let Some(policy) = env_parse::<ShutdownPolicy>(ENV_SHUTDOWN_POLICY)? {
        config.backend.shutdown_policy = policy;
    }
    if let Some(mode) = env_parse::<EditMode>(ENV_DEFAULT_EDIT_MODE)? {
        config.backend.default_edit_mode = mode;
    }
    if let Some(limit) = env_parse::<usize>(ENV_QUERY_LIMIT)? {
        config.query.default_limit = limit;
    }
    if let Some(max) = env_parse::<usize>(ENV_MAX_EXPANSION)? {
        config.query.max_expansion = max;
    }
    if let Ok(level) = std::env::var(ENV_LOG_LEVEL) {
        config.logging.level = level;
    }
    config.logging.json = env_bool(ENV_LOG_JSON, config.logging.json);

    Ok(config)
}

/// Load configuration from a file
///
/// If `path` is `None`, probes multiple locations for config files.
/// Supports both JSON and TOML formats (detected by file extension).
///
/// # Errors
/// Returns `CalbridgeError::Config` if:
/// - File not found (when path is specified)
/// - No config file found (when path is `None`)
/// - File format is invalid
pub fn load_from_file(path: Option<PathBuf>) -> Result<Config> {
    let config_path = match path {
        Some(p) => {
            if !p.exists() {
                return Err(CalbridgeError::Config(format!(
                    "Config file not found: {}",
                    p.display()
                )));
            }
            p
        }
        None => probe_config_paths().ok_or_else(|| {
            CalbridgeError::Config(
                "No config file found in any of the standard locations".to_string(),
            )
        })?,
    };

    tracing::info!(path = %config_path.display(), "Loading configuration from file");

    let contents = std::fs::read_to_string(&config_path)
        .map_err(|e| CalbridgeError::Config(format!("Failed to read config file: {e}")))?;

    parse_config(&contents, &config_path)
}

/// Parse configuration from string content, by file extension.
fn parse_config(contents: &str, path: &Path) -> Result<Config> {
    let extension = path.extension().and_then(|e| e.to_str()).unwrap_or("toml");

    match extension {
        "toml" => toml::from_str(contents)
            .map_err(|e| CalbridgeError::Config(format!("Invalid TOML format: {e}"))),
        "json" => serde_json::from_str(contents)
            .map_err(|e| CalbridgeError::Config(format!("Invalid JSON format: {e}"))),
        _ => Err(CalbridgeError::Config(format!("Unsupported config format: {extension}"))),
    }
}

/// Probe multiple paths for configuration files
///
/// Searches the working directory, its parent and grandparent, then the
/// directory of the executable.
///
/// # Returns
/// The first config file found, or `None` if no file exists.
pub fn probe_config_paths() -> Option<PathBuf> {
    let mut roots = Vec::new();

    if let Ok(cwd) = std::env::current_dir() {
        roots.extend([cwd.clone(), cwd.join(".."), cwd.join("../..")]);
    }
    if let Some(exe_dir) = std::env::current_exe().ok().and_then(|p| p.parent().map(Path::to_path_buf)) {
        roots.push(exe_dir);
    }

    roots
        .iter()
        .flat_map(|root| CONFIG_FILE_NAMES.iter().map(move |name| root.join(name)))
        .find(|path| path.exists())
}

/// Parse an optional environment variable with `FromStr`.
///
/// # Errors
/// Returns `CalbridgeError::Config` if the variable is set but invalid.
fn env_parse<T>(key: &str) -> Result<Option<T>>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    match std::env::var(key) {
        Ok(raw) => raw
            .trim()
            .parse::<T>()
            .map(Some)
            .map_err(|e| CalbridgeError::Config(format!("Invalid {key}: {e}"))),
        Err(_) => Ok(None),
    }
}

/// Parse boolean from environment variable
///
/// Accepts: `1`/`0`, `true`/`false`, `yes`/`no`, `on`/`off` (case-insensitive)
fn env_bool(key: &str, default: bool) -> bool {
    std::env::var(key)
        .ok()
        .map(|s| matches!(s.to_ascii_lowercase().as_str(), "1" | "true" | "yes" | "on"))
        .unwrap_or(default)
}
