//! Memory Pressure Task
//!
//! Background task that samples process memory on a fixed interval and evicts
//! the coldest entries on every tick where pressure is high.

use std::time::Duration;

use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::{debug, info, warn};

use crate::cache::AdaptiveCache;
use crate::error::CacheError;

/// Spawns the pressure monitor loop for `cache`.
///
/// Each tick calls [`AdaptiveCache::check_memory_pressure`]. Failures are
/// logged and never end the loop; only `cache.shutdown()` does.
pub fn spawn_pressure_monitor(cache: AdaptiveCache, interval: Duration) -> JoinHandle<()> {
    let shutdown = cache.shutdown_token();
    // tokio intervals reject a zero period
    let interval = interval.max(Duration::from_millis(1));

    tokio::spawn(async move {
        info!(
            "Starting memory pressure monitor with interval of {:?}",
            interval
        );

        let mut ticker = tokio::time::interval(interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                _ = shutdown.cancelled() => break,
                _ = ticker.tick() => {}
            }

            match cache.check_memory_pressure() {
                Ok(0) => {}
                Ok(evicted) => debug!("Pressure tick evicted {} entries", evicted),
                Err(CacheError::Disposed) => break,
                Err(err) => warn!(
                    error = %CacheError::BackgroundTask(err.to_string()),
                    "Memory pressure check failed"
                ),
            }
        }

        debug!("Memory pressure monitor stopped");
    })
}
