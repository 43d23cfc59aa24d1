//! TTL Cleanup Task
//!
//! Background task that periodically removes expired cache entries. Reads
//! already skip expired entries; the sweep only keeps memory from holding
//! entries nobody asks for again.

use std::sync::Arc;
use std::time::Duration;

use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::backend::CacheBackend;

/// Shortest interval the sweep will run at.
const MIN_INTERVAL: Duration = Duration::from_millis(10);

/// Spawns a background task that periodically purges expired entries.
///
/// The task runs until aborted, sleeping for `interval` between runs.
///
/// # Returns
/// A JoinHandle for the spawned task, which can be used to abort the task
/// during graceful shutdown.
///
/// # Example
/// ```ignore
/// let cache: Arc<dyn CacheBackend> = Arc::new(MemoryBackend::new(1000, Duration::from_secs(300)));
/// let cleanup_handle = spawn_cleanup_task(cache.clone(), Duration::from_secs(1));
/// // Later, during shutdown:
/// cleanup_handle.abort();
/// ```
pub fn spawn_cleanup_task(cache: Arc<dyn CacheBackend>, interval: Duration) -> JoinHandle<()> {
    let interval = interval.max(MIN_INTERVAL);

    tokio::spawn(async move {
        info!(
            "Starting TTL cleanup task for {} cache with interval of {:?}",
            cache.mode(),
            interval
        );

        loop {
            tokio::time::sleep(interval).await;

            match cache.purge_expired().await {
                Ok(0) => debug!("TTL cleanup: no expired entries found"),
                Ok(removed) => info!("TTL cleanup: removed {} expired entries", removed),
                Err(e) => warn!(error = %e, "TTL cleanup failed"),
            }
        }
    })
}
