//! Cache Statistics Module
//!
//! Tracks cache performance metrics including requests, hits, misses, and evictions.

use std::sync::atomic::{AtomicU64, Ordering};

use serde::Serialize;

// == Cache Statistics ==
/// Point-in-time view of the cache counters.
///
/// `entry_count` and `total_size_bytes` come from the ledger at read time and
/// are not transactional with the counters.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct CacheStatistics {
    /// Number of `get` calls
    pub requests: u64,
    /// Number of `get` calls that returned a value
    pub hits: u64,
    /// Number of `get` calls that returned nothing
    pub misses: u64,
    /// Entries dropped by expiry, store compaction or memory pressure
    pub evictions: u64,
    /// hits / requests, or 0.0 with no requests
    pub hit_rate: f64,
    /// Current number of entries in the cache
    pub entry_count: usize,
    /// Summed estimated size of the current entries
    pub total_size_bytes: usize,
    /// Whether the pressure monitor last reported high pressure
    pub memory_pressure: bool,
}

// == Stats Counters ==
/// Lock-free monotonic counters, reset only by `clear`.
#[derive(Debug, Default)]
pub struct StatsCounters {
    requests: AtomicU64,
    hits: AtomicU64,
    misses: AtomicU64,
    evictions: AtomicU64,
}

impl StatsCounters {
    // == Constructor ==
    /// Creates counters starting at zero.
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record_request(&self) {
        self.requests.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_hit(&self) {
        self.hits.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_miss(&self) {
        self.misses.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_eviction(&self, count: u64) {
        self.evictions.fetch_add(count, Ordering::Relaxed);
    }

    // == Reset ==
    /// Zeroes every counter.
    pub fn reset(&self) {
        self.requests.store(0, Ordering::Relaxed);
        self.hits.store(0, Ordering::Relaxed);
        self.misses.store(0, Ordering::Relaxed);
        self.evictions.store(0, Ordering::Relaxed);
    }

    // == Snapshot ==
    /// Reads the counters and combines them with ledger-derived figures.
    pub fn snapshot(
        &self,
        entry_count: usize,
        total_size_bytes: usize,
        memory_pressure: bool,
    ) -> CacheStatistics {
        let requests = self.requests.load(Ordering::Relaxed);
        let hits = self.hits.load(Ordering::Relaxed);
        CacheStatistics {
            requests,
            hits,
            misses: self.misses.load(Ordering::Relaxed),
            evictions: self.evictions.load(Ordering::Relaxed),
            hit_rate: hit_rate(hits, requests),
            entry_count,
            total_size_bytes,
            memory_pressure,
        }
    }
}

fn hit_rate(hits: u64, requests: u64) -> f64 {
    if requests == 0 {
        0.0
    } else {
        hits as f64 / requests as f64
    }
}
