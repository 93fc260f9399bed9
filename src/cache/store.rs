//! Entry Store Module
//!
//! Size-bounded concurrent storage for cached values. The store expires entries
//! on access, compacts itself by priority when it outgrows its byte limit, and
//! reports every removal to a single registered listener.

use std::any::Any;
use std::fmt;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use parking_lot::Mutex;
use tracing::{debug, trace};

use crate::cache::Priority;

/// Type-erased cached value, downcast on read.
pub type StoredValue = Arc<dyn Any + Send + Sync>;

/// Callback invoked once for every entry that leaves the store, except
/// same-key replacements.
pub type RemovalListener = Arc<dyn Fn(&RemovedEntry) + Send + Sync>;

// == Removal Reason ==
/// Why an entry left the store.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RemovalReason {
    /// Explicit remove or pattern removal
    Removed,
    /// TTL elapsed (found on access, by the sweep, or during compaction)
    Expired,
    /// Dropped by the store's own size compaction
    Capacity,
    /// Dropped by the memory pressure LRU sweep
    Pressure,
    /// Dropped by `clear`
    Cleared,
}

impl RemovalReason {
    /// Whether this removal counts as an eviction in the statistics.
    ///
    /// Every removal the listener sees counts, except `clear`, which resets
    /// the counters itself.
    pub fn is_eviction(self) -> bool {
        !matches!(self, RemovalReason::Cleared)
    }
}

// == Removed Entry ==
/// Notification payload handed to the [`RemovalListener`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RemovedEntry {
    pub key: String,
    pub generation: u64,
    pub size: usize,
    pub reason: RemovalReason,
}

struct StoreEntry {
    value: StoredValue,
    /// None when the TTL overflows `Instant`
    expires_at: Option<Instant>,
    priority: Priority,
    size: usize,
    generation: u64,
    /// Milliseconds since the store epoch
    last_access_ms: AtomicU64,
}

impl StoreEntry {
    fn is_expired(&self, now: Instant) -> bool {
        self.expires_at.is_some_and(|at| now >= at)
    }
}

// == Entry Store ==
/// Concurrent keyed store with per-entry expiration and priority.
pub struct EntryStore {
    entries: DashMap<String, StoreEntry>,
    total_size: AtomicUsize,
    size_limit: Option<usize>,
    next_generation: AtomicU64,
    epoch: Instant,
    /// Serializes compaction and `clear`
    compaction: Mutex<()>,
    listener: RemovalListener,
}

impl fmt::Debug for EntryStore {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EntryStore")
            .field("len", &self.entries.len())
            .field("total_size", &self.total_size())
            .field("size_limit", &self.size_limit)
            .finish_non_exhaustive()
    }
}

impl EntryStore {
    // == Constructor ==
    /// Creates an empty store.
    ///
    /// # Arguments
    /// * `size_limit` - Optional bound on the summed entry sizes
    /// * `listener` - Called for every removal that is not a same-key replacement
    pub fn new(size_limit: Option<usize>, listener: RemovalListener) -> Self {
        Self {
            entries: DashMap::new(),
            total_size: AtomicUsize::new(0),
            size_limit,
            next_generation: AtomicU64::new(0),
            epoch: Instant::now(),
            compaction: Mutex::new(()),
            listener,
        }
    }

    // == Set ==
    /// Stores a value and returns the generation stamped on it.
    ///
    /// `commit` receives the generation while the key's slot is still held, so
    /// anything it records is ordered with concurrent writes and removals of the
    /// same key. Replacing an existing key does not notify the listener.
    pub fn set_with<F>(
        &self,
        key: String,
        value: StoredValue,
        ttl: Duration,
        priority: Priority,
        size: usize,
        commit: F,
    ) -> u64
    where
        F: FnOnce(u64),
    {
        let generation = self.next_generation.fetch_add(1, Ordering::Relaxed) + 1;
        let now = Instant::now();
        let entry = StoreEntry {
            value,
            expires_at: now.checked_add(ttl),
            priority,
            size,
            generation,
            last_access_ms: AtomicU64::new(self.elapsed_ms(now)),
        };

        match self.entries.entry(key) {
            Entry::Occupied(mut occupied) => {
                let previous = occupied.insert(entry);
                commit(generation);
                self.total_size.fetch_add(size, Ordering::Relaxed);
                self.total_size.fetch_sub(previous.size, Ordering::Relaxed);
            }
            Entry::Vacant(vacant) => {
                let _slot = vacant.insert(entry);
                commit(generation);
                self.total_size.fetch_add(size, Ordering::Relaxed);
            }
        }

        self.compact_if_needed();
        generation
    }

    // == Try Get ==
    /// Returns a clone of the value if present, unexpired and of type `T`.
    ///
    /// An expired entry is removed on the spot with [`RemovalReason::Expired`].
    pub fn try_get<T>(&self, key: &str) -> Option<T>
    where
        T: Clone + 'static,
    {
        let now = Instant::now();
        let expired_generation = {
            let entry = self.entries.get(key)?;
            if !entry.is_expired(now) {
                entry
                    .last_access_ms
                    .store(self.elapsed_ms(now), Ordering::Relaxed);
                return (*entry.value).downcast_ref::<T>().cloned();
            }
            entry.generation
        };

        self.remove_generation(key, expired_generation, RemovalReason::Expired);
        None
    }

    // == Remove ==
    /// Removes whatever is stored under `key`. Returns whether anything was removed.
    pub fn remove(&self, key: &str, reason: RemovalReason) -> bool {
        match self.entries.remove(key) {
            Some((key, entry)) => {
                self.finish_removal(key, entry, reason);
                true
            }
            None => false,
        }
    }

    /// Removes `key` only if it still holds the write stamped `generation`.
    ///
    /// Racing removals of the same write resolve to exactly one winner.
    pub fn remove_generation(&self, key: &str, generation: u64, reason: RemovalReason) -> bool {
        match self
            .entries
            .remove_if(key, |_, entry| entry.generation == generation)
        {
            Some((key, entry)) => {
                self.finish_removal(key, entry, reason);
                true
            }
            None => false,
        }
    }

    // == Clear ==
    /// Removes every entry present when the call starts.
    ///
    /// Returns the number of entries removed.
    pub fn clear(&self) -> usize {
        let _guard = self.compaction.lock();
        let keys: Vec<String> = self.entries.iter().map(|e| e.key().clone()).collect();
        keys.iter()
            .filter(|key| self.remove(key, RemovalReason::Cleared))
            .count()
    }

    // == Accessors ==
    pub fn contains(&self, key: &str) -> bool {
        self.entries.contains_key(key)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Summed estimated size of all entries.
    pub fn total_size(&self) -> usize {
        self.total_size.load(Ordering::Relaxed)
    }

    // == Compaction ==
    /// Drops entries until the store is back under its byte limit.
    ///
    /// Order: expired first, then lowest priority, then least recently
    /// accessed. `NeverRemove` entries are only dropped once expired.
    ///
    /// Best effort: if `clear` or another writer holds the compaction lock
    /// this pass is skipped, and the store stays over its limit until the
    /// next write compacts it. Live `NeverRemove` entries alone may also
    /// keep it over the limit.
    fn compact_if_needed(&self) {
        let Some(limit) = self.size_limit else {
            return;
        };
        if self.total_size() <= limit {
            return;
        }
        // Another thread is already compacting
        let Some(_guard) = self.compaction.try_lock() else {
            return;
        };

        let now = Instant::now();
        let mut candidates: Vec<(bool, Priority, u64, String, u64)> = self
            .entries
            .iter()
            .filter(|e| e.is_expired(now) || e.priority != Priority::NeverRemove)
            .map(|e| {
                (
                    !e.is_expired(now),
                    e.priority,
                    e.last_access_ms.load(Ordering::Relaxed),
                    e.key().clone(),
                    e.generation,
                )
            })
            .collect();
        if candidates.is_empty() {
            trace!(total_size = self.total_size(), limit, "Only pinned entries, nothing to compact");
            return;
        }
        candidates.sort();

        let mut removed = 0usize;
        for (live, _, _, key, generation) in candidates {
            if self.total_size() <= limit {
                break;
            }
            let reason = if live {
                RemovalReason::Capacity
            } else {
                RemovalReason::Expired
            };
            if self.remove_generation(&key, generation, reason) {
                removed += 1;
            }
        }

        debug!(
            removed,
            total_size = self.total_size(),
            limit,
            "Entry store compacted"
        );
    }

    fn finish_removal(&self, key: String, entry: StoreEntry, reason: RemovalReason) {
        self.total_size.fetch_sub(entry.size, Ordering::Relaxed);
        trace!(key = %key, ?reason, "Entry left the store");
        (self.listener)(&RemovedEntry {
            key,
            generation: entry.generation,
            size: entry.size,
            reason,
        });
    }

    fn elapsed_ms(&self, now: Instant) -> u64 {
        now.saturating_duration_since(self.epoch).as_millis() as u64
    }
}
