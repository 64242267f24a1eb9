//! Daemon runtime configuration.

use std::path::PathBuf;

/// Runtime configuration collected from CLI arguments.
#[derive(Debug, Clone)]
pub struct DaemonConfig {
    /// Directory for the embedded SurrealKV store.
    pub db_dir: PathBuf,

    /// Ceiling on simultaneously running browser extractions.
    pub max_concurrent_tasks: usize,

    /// Default age threshold for the retention sweep.
    pub cleanup_hours: u64,
    /// How often the retention sweep runs.
    pub cleanup_interval_seconds: u64,

    /// Shared secret for the `x-api-key` header. Auth is disabled when unset.
    pub api_key: Option<String>,

    /// Wall-clock cap on a single browser extraction, in milliseconds.
    pub browser_timeout_ms: u64,
    /// Run the browser without a visible window.
    pub browser_headless: bool,
}

impl DaemonConfig {
    /// Whether the API-key check is active.
    pub fn auth_enabled(&self) -> bool {
        self.api_key.is_some()
    }
}
