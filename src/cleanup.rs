//! Scheduled cleanup of expired key-value entries.
//!
//! Redis expires keys on its own; the in-process store only drops expired
//! entries lazily on read, so revoked or expired refresh JTIs that are never
//! looked up again would otherwise accumulate.

use crate::cache::KeyValueStore;
use std::sync::Arc;
use std::time::Duration;
use tracing::{error, info};

/// Interval between cleanup runs.
const CLEANUP_INTERVAL: Duration = Duration::from_secs(10 * 60);

/// Run all cleanup tasks once.
pub async fn run_cleanup(store: &dyn KeyValueStore) {
    match store.purge_expired().await {
        Ok(count) if count > 0 => info!("Purged {} expired cache entries", count),
        Ok(_) => {}
        Err(e) => error!("Failed to purge expired cache entries: {}", e),
    }
}

/// Spawn a background task that runs cleanup periodically.
/// Returns a handle that can be used to abort the task.
pub fn spawn_cleanup_scheduler(store: Arc<dyn KeyValueStore>) -> tokio::task::JoinHandle<()> {
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(CLEANUP_INTERVAL);

        loop {
            interval.tick().await;
            run_cleanup(store.as_ref()).await;
        }
    })
}
