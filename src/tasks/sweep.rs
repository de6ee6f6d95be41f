//! Expired Sweep Task
//!
//! Background task that periodically deletes expired transients, so entries
//! that are never read again do not linger in the options table.

use std::sync::Arc;
use std::time::Duration;

use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::cache::{Repository, Store};

/// Spawns a background task that periodically flushes expired cache entries.
///
/// The task runs in an infinite loop, sleeping for the specified interval
/// between sweeps. A sweep that reports `false` (external object cache, or a
/// failed delete) is logged and retried on the next tick.
///
/// # Arguments
/// * `cache` - Shared repository whose store is swept
/// * `sweep_interval_secs` - Interval in seconds between sweeps
///
/// # Returns
/// A JoinHandle for the spawned task, which can be used to abort the task
/// during graceful shutdown.
///
/// # Example
/// ```ignore
/// let handle = spawn_sweep_task(cache.clone(), 60);
/// // Later, during shutdown:
/// handle.abort();
/// ```
pub fn spawn_sweep_task<S>(cache: Arc<Repository<S>>, sweep_interval_secs: u64) -> JoinHandle<()>
where
    S: Store + 'static,
{
    let interval = Duration::from_secs(sweep_interval_secs.max(1));

    tokio::spawn(async move {
        info!(
            "Starting expired sweep task with interval of {} seconds",
            interval.as_secs()
        );

        let mut failures: u64 = 0;
        loop {
            tokio::time::sleep(interval).await;

            if cache.flush_expired() {
                failures = 0;
                debug!(prefix = cache.store().prefix(), "Expired sweep completed");
            } else {
                failures += 1;
                // Log the first miss loudly, then only occasionally.
                if failures == 1 || failures % 60 == 0 {
                    warn!(
                        prefix = cache.store().prefix(),
                        failures, "Expired sweep did nothing"
                    );
                }
            }
        }
    })
}
