//! Adaptive Cache - soak demo
//!
//! Drives `get_or_set` traffic against a simulated slow remote API and
//! periodically logs cache statistics.

use std::time::Duration;

use adaptive_cache::{AdaptiveCache, CacheError, Config};
use anyhow::Context;
use tokio::signal;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

/// Keys cycled through by the demo workload.
const KEY_SPACE: u64 = 200;

/// Main entry point for the cache soak demo.
///
/// # Startup Sequence
/// 1. Initialize tracing subscriber for logging
/// 2. Load configuration from environment variables
/// 3. Create the cache and start its background tasks
/// 4. Generate lookups until SIGINT/SIGTERM
/// 5. Shut the cache down and log final statistics
#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize tracing subscriber with env filter
    // Defaults to "info" level, can be overridden with RUST_LOG env var
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "adaptive_cache=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    info!("Starting adaptive cache soak demo");

    let config = Config::from_env();
    info!(
        "Configuration loaded: default_ttl={:?}, max_entries={}, pressure_threshold={}B, pressure_management={}",
        config.default_expiration,
        config.max_entries,
        config.memory_pressure_threshold_bytes,
        config.enable_memory_pressure_management
    );

    let cache = AdaptiveCache::start(config);
    info!("Cache initialized and background tasks started");

    let requests = CancellationToken::new();
    let workload = tokio::spawn(run_workload(cache.clone(), requests.clone()));

    shutdown_signal().await;

    requests.cancel();
    workload.await.context("Workload task panicked")?;

    let stats = cache.stats()?;
    info!("Final statistics: {}", serde_json::to_string(&stats)?);

    cache.shutdown();
    info!("Cache shutdown complete");
    Ok(())
}

/// Issues lookups across a rotating key space, logging stats every few seconds.
async fn run_workload(cache: AdaptiveCache, cancel: CancellationToken) {
    let mut report = tokio::time::interval(Duration::from_secs(5));
    let mut n: u64 = 0;

    while !cancel.is_cancelled() {
        let key = match n % 4 {
            0 => format!("projects:{}", n % KEY_SPACE),
            1 => format!("user:{}", n % KEY_SPACE),
            2 => format!("builds:{}", n % KEY_SPACE),
            _ => format!("orgs:{}", n % KEY_SPACE),
        };

        let result: Result<String, CacheError> = cache
            .get_or_set(&key, |token| fetch_remote(key.clone(), token), None, &cancel)
            .await;
        match result {
            Ok(_) | Err(CacheError::Cancelled) => {}
            Err(err) => warn!("Lookup for {} failed: {}", key, err),
        }

        n += 1;
        tokio::select! {
            _ = report.tick() => match cache.stats() {
                Ok(stats) => info!(
                    "Stats: hit_rate={:.2} entries={} evictions={} pressure={}",
                    stats.hit_rate, stats.entry_count, stats.evictions, stats.memory_pressure
                ),
                Err(err) => warn!("Could not read stats: {}", err),
            },
            _ = tokio::time::sleep(Duration::from_millis(5)) => {}
        }
    }
}

/// Stands in for the remote API behind the cache.
async fn fetch_remote(key: String, cancel: CancellationToken) -> Result<String, CacheError> {
    tokio::select! {
        _ = cancel.cancelled() => Err(CacheError::Cancelled),
        _ = tokio::time::sleep(Duration::from_millis(20)) => Ok(format!("payload for {}", key)),
    }
}

/// Waits for shutdown signal (Ctrl+C or SIGTERM).
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(err) = signal::ctrl_c().await {
            warn!("Failed to listen for Ctrl+C: {}", err);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(err) => {
                warn!("Failed to install SIGTERM handler: {}", err);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            info!("Received Ctrl+C, initiating shutdown...");
        }
        _ = terminate => {
            info!("Received SIGTERM, initiating shutdown...");
        }
    }
}
