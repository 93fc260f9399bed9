//! Adaptive Cache Module
//!
//! Public cache facade. Wires key validation, expiration policy, the entry
//! store, the metadata ledger, statistics and the pressure monitor together.

use std::future::Future;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use serde::Serialize;
use tokio_util::sync::CancellationToken;
use tracing::{debug, debug_span, field, info, Instrument, Span};

use crate::cache::{
    estimate_size, eviction_batch, validate_key, CacheStatistics, EntryMetadata, EntryStore,
    ExpirationPolicy, MemorySampler, MetadataLedger, PressureLevel, PressureMonitor, Priority,
    ProcessMemorySampler, RemovalListener, RemovalReason, RemovedEntry, StatsCounters,
};
use crate::config::Config;
use crate::error::{CacheError, Result};

// == Adaptive Cache ==
/// Thread-safe response cache with prefix TTLs and memory-pressure eviction.
///
/// Cloning is cheap; every clone shares the same entries and counters.
#[derive(Debug, Clone)]
pub struct AdaptiveCache {
    inner: Arc<Inner>,
}

#[derive(Debug)]
struct Inner {
    store: EntryStore,
    ledger: Arc<MetadataLedger>,
    stats: Arc<StatsCounters>,
    policy: ExpirationPolicy,
    pressure: PressureMonitor,
    config: Config,
    disposed: AtomicBool,
    shutdown: CancellationToken,
}

impl AdaptiveCache {
    // == Constructors ==
    /// Creates a cache sampling this process's memory. No background tasks
    /// are started; see [`AdaptiveCache::start`].
    pub fn new(config: Config) -> Self {
        Self::with_sampler(config, Arc::new(ProcessMemorySampler::new()))
    }

    /// Creates a cache whose pressure monitor reads from `sampler`.
    pub fn with_sampler(config: Config, sampler: Arc<dyn MemorySampler>) -> Self {
        let ledger = Arc::new(MetadataLedger::new());
        let stats = Arc::new(StatsCounters::new());

        // The only path by which records leave the ledger
        let listener: RemovalListener = {
            let ledger = ledger.clone();
            let stats = stats.clone();
            Arc::new(move |removed: &RemovedEntry| {
                ledger.remove_generation(&removed.key, removed.generation);
                if removed.reason.is_eviction() {
                    stats.record_eviction(1);
                }
            })
        };

        let inner = Inner {
            store: EntryStore::new(config.store_size_limit_bytes, listener),
            ledger,
            stats,
            policy: ExpirationPolicy::new(
                config.expiration_rules.clone(),
                config.default_expiration,
            ),
            pressure: PressureMonitor::new(sampler, config.memory_pressure_threshold_bytes),
            config,
            disposed: AtomicBool::new(false),
            shutdown: CancellationToken::new(),
        };

        Self {
            inner: Arc::new(inner),
        }
    }

    /// Creates a cache and spawns its expiry sweep and, when enabled, its
    /// pressure monitor on the current tokio runtime.
    pub fn start(config: Config) -> Self {
        let cache = Self::new(config);
        cache.spawn_background_tasks();
        cache
    }

    /// Spawns the background loops for this cache. They stop on [`shutdown`].
    ///
    /// [`shutdown`]: AdaptiveCache::shutdown
    pub fn spawn_background_tasks(&self) {
        let config = &self.inner.config;
        crate::tasks::spawn_cleanup_task(self.clone(), config.cleanup_interval);
        if config.enable_memory_pressure_management {
            crate::tasks::spawn_pressure_monitor(self.clone(), config.pressure_check_interval);
        }
    }

    // == Get ==
    /// Looks up `key` and returns the value if it is present and of type `T`.
    ///
    /// Every call counts as a request; a miss is not an error.
    pub fn get<T>(&self, key: &str) -> Result<Option<T>>
    where
        T: Clone + Send + Sync + 'static,
    {
        self.ensure_active()?;
        validate_key(key)?;

        let inner = &self.inner;
        let span = debug_span!(
            "Cache.Get",
            key = %key,
            hit = field::Empty,
            pressure = inner.pressure.is_high()
        );
        let _enter = span.enter();

        inner.stats.record_request();
        match inner.store.try_get::<T>(key) {
            Some(value) => {
                inner.stats.record_hit();
                inner.ledger.touch(key);
                span.record("hit", true);
                Ok(Some(value))
            }
            None => {
                inner.stats.record_miss();
                span.record("hit", false);
                Ok(None)
            }
        }
    }

    // == Set ==
    /// Stores `value` under `key`.
    ///
    /// The TTL is `ttl` if given, else the first matching prefix rule, else
    /// the configured default, and is halved while memory pressure is high.
    /// Nothing is written if the value cannot be sized.
    pub fn set<T>(&self, key: &str, value: T, ttl: Option<Duration>) -> Result<()>
    where
        T: Serialize + Send + Sync + 'static,
    {
        self.ensure_active()?;
        validate_key(key)?;

        let inner = &self.inner;
        let pressure = inner.pressure.is_high();
        let span = debug_span!("Cache.Set", key = %key, pressure);
        let _enter = span.enter();

        let size = estimate_size(&value)?;
        let mut ttl = inner.policy.resolve(key, ttl);
        if pressure {
            ttl /= 2;
        }
        let priority = Priority::classify(key);

        let ledger = &inner.ledger;
        inner.store.set_with(
            key.to_string(),
            Arc::new(value),
            ttl,
            priority,
            size,
            |generation| ledger.upsert(EntryMetadata::new(key, ttl, size, priority, generation)),
        );

        let entries = ledger.len();
        if entries > inner.config.max_entries {
            debug!(
                entries,
                max_entries = inner.config.max_entries,
                "Cache holds more entries than its soft cap"
            );
        }
        Ok(())
    }

    // == Get Or Set ==
    /// Returns the cached value for `key`, or runs `factory` and caches its
    /// result.
    ///
    /// Concurrent misses on the same key each run their own factory; the last
    /// write wins. A factory error is returned unchanged and nothing is
    /// cached. Cancelling `cancel` aborts the wait with
    /// [`CacheError::Cancelled`].
    pub async fn get_or_set<T, E, F, Fut>(
        &self,
        key: &str,
        factory: F,
        ttl: Option<Duration>,
        cancel: &CancellationToken,
    ) -> std::result::Result<T, E>
    where
        T: Clone + Serialize + Send + Sync + 'static,
        E: From<CacheError>,
        F: FnOnce(CancellationToken) -> Fut,
        Fut: Future<Output = std::result::Result<T, E>>,
    {
        let span = debug_span!(
            "Cache.GetOrSet",
            key = %key,
            hit = field::Empty,
            pressure = self.inner.pressure.is_high()
        );

        async move {
            if cancel.is_cancelled() {
                return Err(CacheError::Cancelled.into());
            }
            if let Some(value) = self.get::<T>(key)? {
                Span::current().record("hit", true);
                return Ok(value);
            }
            Span::current().record("hit", false);

            let value = tokio::select! {
                biased;
                _ = cancel.cancelled() => return Err(CacheError::Cancelled.into()),
                result = factory(cancel.clone()) => result?,
            };

            self.set(key, value.clone(), ttl)?;
            Ok::<T, E>(value)
        }
        .instrument(span)
        .await
    }

    // == Remove ==
    /// Removes `key`. Returns whether an entry was present.
    pub fn remove(&self, key: &str) -> Result<bool> {
        self.ensure_active()?;
        validate_key(key)?;
        Ok(self.inner.store.remove(key, RemovalReason::Removed))
    }

    // == Remove By Pattern ==
    /// Removes every key matching `pattern` and returns how many were removed.
    ///
    /// With `*` the pattern's literal segments must appear in the key in
    /// order; without it the key must match exactly. Matching ignores case.
    pub fn remove_by_pattern(&self, pattern: &str) -> Result<usize> {
        self.ensure_active()?;
        if pattern.trim().is_empty() {
            return Err(CacheError::InvalidKey(
                "Pattern must not be empty or whitespace".to_string(),
            ));
        }

        let span = debug_span!(
            "Cache.RemoveByPattern",
            pattern = %pattern,
            removed = field::Empty,
            pressure = self.inner.pressure.is_high()
        );
        let _enter = span.enter();

        let mut removed = 0;
        for key in self.inner.ledger.matching_keys(pattern) {
            if self.remove(&key)? {
                removed += 1;
            }
        }

        span.record("removed", removed);
        debug!(pattern, removed, "Removed entries by pattern");
        Ok(removed)
    }

    // == Clear ==
    /// Drops every entry and zeroes the statistics.
    pub fn clear(&self) -> Result<()> {
        self.ensure_active()?;
        let removed = self.inner.store.clear();
        self.inner.stats.reset();
        info!(removed, "Cache cleared");
        Ok(())
    }

    // == Exists ==
    /// Whether `key` is tracked. Does not touch the store or the statistics.
    pub fn exists(&self, key: &str) -> Result<bool> {
        self.ensure_active()?;
        validate_key(key)?;
        Ok(self.inner.ledger.contains(key))
    }

    // == Time To Live ==
    /// Remaining lifetime of `key`, or None if it is not cached.
    pub fn ttl_remaining(&self, key: &str) -> Result<Option<Duration>> {
        self.ensure_active()?;
        validate_key(key)?;
        Ok(self.inner.ledger.get(key).map(|m| m.ttl_remaining()))
    }

    // == Stats ==
    /// Returns current cache statistics.
    pub fn stats(&self) -> Result<CacheStatistics> {
        self.ensure_active()?;
        let inner = &self.inner;
        Ok(inner.stats.snapshot(
            inner.ledger.len(),
            inner.ledger.total_size(),
            inner.pressure.is_high(),
        ))
    }

    // == Cleanup Expired ==
    /// Removes all expired entries and returns how many were removed.
    pub fn remove_expired(&self) -> Result<usize> {
        self.ensure_active()?;
        let inner = &self.inner;
        let removed = inner
            .ledger
            .expired(Utc::now())
            .into_iter()
            .filter(|(key, generation)| {
                inner
                    .store
                    .remove_generation(key, *generation, RemovalReason::Expired)
            })
            .count();
        Ok(removed)
    }

    // == Memory Pressure ==
    /// Samples memory once and, if pressure is high, evicts the coldest
    /// tenth of the entries (at least one). Returns the number evicted.
    pub fn check_memory_pressure(&self) -> Result<usize> {
        self.ensure_active()?;
        match self.inner.pressure.tick()? {
            PressureLevel::Normal => Ok(0),
            PressureLevel::High => Ok(self.evict_coldest()),
        }
    }

    pub fn memory_pressure(&self) -> PressureLevel {
        self.inner.pressure.state().level()
    }

    fn evict_coldest(&self) -> usize {
        let inner = &self.inner;
        let batch = eviction_batch(inner.ledger.len());
        let evicted = inner
            .ledger
            .coldest(batch)
            .into_iter()
            .filter(|m| {
                inner
                    .store
                    .remove_generation(&m.key, m.generation, RemovalReason::Pressure)
            })
            .count();

        if evicted > 0 {
            info!(
                evicted,
                usage_bytes = inner.pressure.state().last_usage_bytes(),
                "Evicted least recently used entries under memory pressure"
            );
        }
        evicted
    }

    // == Shutdown ==
    /// Stops the background tasks. Every later call fails with
    /// [`CacheError::Disposed`].
    pub fn shutdown(&self) {
        if !self.inner.disposed.swap(true, Ordering::SeqCst) {
            self.inner.shutdown.cancel();
            info!("Cache shut down");
        }
    }

    pub fn is_disposed(&self) -> bool {
        self.inner.disposed.load(Ordering::SeqCst)
    }

    /// Token cancelled by [`AdaptiveCache::shutdown`].
    pub fn shutdown_token(&self) -> CancellationToken {
        self.inner.shutdown.clone()
    }

    pub fn config(&self) -> &Config {
        &self.inner.config
    }

    /// Entry count and byte total as the store sees them.
    #[cfg(test)]
    pub(crate) fn store_footprint(&self) -> (usize, usize) {
        (self.inner.store.len(), self.inner.store.total_size())
    }

    fn ensure_active(&self) -> Result<()> {
        if self.is_disposed() {
            Err(CacheError::Disposed)
        } else {
            Ok(())
        }
    }
}
