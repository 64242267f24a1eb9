//! Background retention sweep for finished tasks.

use std::sync::Arc;
use std::time::Duration;

use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::manager::TaskManager;

/// Spawns a loop that periodically deletes terminal tasks older than
/// `retention_hours`. Errors are logged and the loop keeps running.
pub fn spawn_sweeper(
    manager: Arc<TaskManager>,
    interval_seconds: u64,
    retention_hours: u64,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(Duration::from_secs(interval_seconds));
        // First tick fires immediately; skip it so a fresh start doesn't
        // sweep before anything could have aged out.
        ticker.tick().await;
        loop {
            ticker.tick().await;
            match manager.cleanup(retention_hours).await {
                Ok(0) => debug!("sweep pass removed nothing"),
                Ok(removed) => info!(removed, retention_hours, "swept finished tasks"),
                Err(err) => warn!(error = %err, "sweep pass failed"),
            }
        }
    })
}
