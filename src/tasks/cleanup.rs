//! Expiry Sweep Task
//!
//! Background task that periodically removes expired cache entries.

use std::time::Duration;

use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::{debug, info, warn};

use crate::cache::AdaptiveCache;
use crate::error::CacheError;

/// Spawns a background task that periodically sweeps expired cache entries.
///
/// The task ticks every `interval` and runs until the cache is shut down.
/// A failed sweep is logged and the next tick runs as usual.
///
/// # Arguments
/// * `cache` - Handle to the cache to sweep
/// * `interval` - Time between sweeps
///
/// # Returns
/// A JoinHandle for the spawned task. The task also ends on its own once
/// `cache.shutdown()` is called.
///
/// # Example
/// ```ignore
/// let cache = AdaptiveCache::new(Config::default());
/// let cleanup_handle = spawn_cleanup_task(cache.clone(), Duration::from_secs(60));
/// // Later, during shutdown:
/// cache.shutdown();
/// ```
pub fn spawn_cleanup_task(cache: AdaptiveCache, interval: Duration) -> JoinHandle<()> {
    let shutdown = cache.shutdown_token();
    // tokio intervals reject a zero period
    let interval = interval.max(Duration::from_millis(1));

    tokio::spawn(async move {
        info!(
            "Starting expiry sweep task with interval of {:?}",
            interval
        );

        let mut ticker = tokio::time::interval_at(tokio::time::Instant::now() + interval, interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                _ = shutdown.cancelled() => break,
                _ = ticker.tick() => {}
            }

            match cache.remove_expired() {
                Ok(0) => debug!("Expiry sweep: no expired entries found"),
                Ok(removed) => info!("Expiry sweep: removed {} expired entries", removed),
                Err(CacheError::Disposed) => break,
                Err(err) => warn!(
                    error = %CacheError::BackgroundTask(err.to_string()),
                    "Expiry sweep failed"
                ),
            }
        }

        debug!("Expiry sweep task stopped");
    })
}
