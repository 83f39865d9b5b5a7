use std::env;
use std::path::PathBuf;

pub const APP_DIR: &str = "ledger-tenancy";
pub const DOCUMENT_ENV: &str = "LEDGER_TENANCY_DOCUMENT";
pub const DB_ENV: &str = "LEDGER_TENANCY_DB";
pub const LOG_ENV: &str = "LEDGER_TENANCY_LOG";
pub const DEFAULT_LOG_FILTER: &str = "ledger_tenancy=info";

const DEFAULT_DOCUMENT_NAME: &str = "db.json";
const DEFAULT_DB_NAME: &str = "expense_tracker.db";

/// Where the ledger files live when nothing else is configured. Falls back
/// to the working directory on platforms without a data directory.
pub fn data_root() -> PathBuf {
    dirs::data_dir()
        .or_else(|| env::current_dir().ok())
        .unwrap_or_else(|| PathBuf::from("."))
        .join(APP_DIR)
}

fn env_path(name: &str) -> Option<PathBuf> {
    env::var_os(name)
        .filter(|value| !value.is_empty())
        .map(PathBuf::from)
}

fn resolve(explicit: Option<PathBuf>, from_env: Option<PathBuf>, default_name: &str) -> PathBuf {
    explicit
        .or(from_env)
        .unwrap_or_else(|| data_root().join(default_name))
}

/// Command-line value, then `LEDGER_TENANCY_DOCUMENT`, then the default.
pub fn document_path(explicit: Option<PathBuf>) -> PathBuf {
    resolve(explicit, env_path(DOCUMENT_ENV), DEFAULT_DOCUMENT_NAME)
}

/// Command-line value, then `LEDGER_TENANCY_DB`, then the default.
pub fn db_path(explicit: Option<PathBuf>) -> PathBuf {
    resolve(explicit, env_path(DB_ENV), DEFAULT_DB_NAME)
}

pub fn log_filter() -> String {
    env::var(LOG_ENV)
        .ok()
        .filter(|value| !value.trim().is_empty())
        .unwrap_or_else(|| DEFAULT_LOG_FILTER.to_string())
}
