//! Domain constants
//!
//! Centralized location for the numeric and textual constants shared by the
//! store adapters and the request orchestration layer.

// Store update-mode flags (bit values of the numeric edit-mode hint)
pub const EDIT_MODE_FLAG_THIS: u32 = 1 << 0;
pub const EDIT_MODE_FLAG_THIS_AND_PRIOR: u32 = 1 << 1;
pub const EDIT_MODE_FLAG_THIS_AND_FUTURE: u32 = 1 << 2;
pub const EDIT_MODE_FLAG_ALL: u32 = 1 << 3;

// Identity encoding
pub const ITEM_ID_SEPARATOR: char = '/';
pub const RECURRENCE_ID_SEPARATOR: char = '#';
pub const RECURRENCE_ID_FORMAT: &str = "%Y%m%dT%H%M%SZ";

// Backend defaults
pub const DEFAULT_WAIT_TIMEOUT_MS: u64 = 0;
pub const DEFAULT_QUERY_LIMIT: usize = 100;
pub const DEFAULT_MAX_EXPANSION: usize = 5_000;

// Config environment variables
pub const ENV_WAIT_TIMEOUT_MS: &str = "CALBRIDGE_WAIT_TIMEOUT_MS";
pub const ENV_SHUTDOWN_POLICY: &str = "CALBRIDGE_SHUTDOWN_POLICY";
pub const ENV_DEFAULT_EDIT_MODE: &str = "CALBRIDGE_DEFAULT_EDIT_MODE";
pub const ENV_QUERY_LIMIT: &str = "CALBRIDGE_QUERY_LIMIT";
pub const ENV_MAX_EXPANSION: &str = "CALBRIDGE_MAX_EXPANSION";
pub const ENV_LOG_LEVEL: &str = "CALBRIDGE_LOG_LEVEL";
pub const ENV_LOG_JSON: &str = "CALBRIDGE_LOG_JSON";
