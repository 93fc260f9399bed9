//! Metadata Ledger Module
//!
//! Concurrent index of entry metadata backing LRU selection, pattern scans and
//! the expiry sweep. Records leave the ledger only through the entry store's
//! removal listener.

use chrono::{DateTime, Utc};
use dashmap::DashMap;

use crate::cache::EntryMetadata;

// == Metadata Ledger ==
/// Key to metadata map kept in step with the entry store.
#[derive(Debug, Default)]
pub struct MetadataLedger {
    records: DashMap<String, EntryMetadata>,
}

impl MetadataLedger {
    // == Constructor ==
    pub fn new() -> Self {
        Self::default()
    }

    // == Upsert ==
    /// Inserts or replaces the record for `metadata.key`.
    pub fn upsert(&self, metadata: EntryMetadata) {
        self.records.insert(metadata.key.clone(), metadata);
    }

    // == Remove ==
    pub fn remove(&self, key: &str) -> Option<EntryMetadata> {
        self.records.remove(key).map(|(_, metadata)| metadata)
    }

    /// Removes the record only if it describes the write stamped `generation`.
    pub fn remove_generation(&self, key: &str, generation: u64) -> Option<EntryMetadata> {
        self.records
            .remove_if(key, |_, metadata| metadata.generation == generation)
            .map(|(_, metadata)| metadata)
    }

    // == Touch ==
    /// Marks a key as accessed now. Returns false if the key is unknown.
    pub fn touch(&self, key: &str) -> bool {
        match self.records.get_mut(key) {
            Some(mut metadata) => {
                metadata.last_accessed_at = Utc::now();
                true
            }
            None => false,
        }
    }

    // == Lookup ==
    pub fn get(&self, key: &str) -> Option<EntryMetadata> {
        self.records.get(key).map(|metadata| metadata.clone())
    }

    pub fn contains(&self, key: &str) -> bool {
        self.records.contains_key(key)
    }

    /// Point-in-time copy of every record.
    pub fn snapshot(&self) -> Vec<EntryMetadata> {
        self.records.iter().map(|r| r.value().clone()).collect()
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// Summed `size_bytes` over all records.
    pub fn total_size(&self) -> usize {
        self.records.iter().map(|r| r.size_bytes).sum()
    }

    // == Pattern Matching ==
    /// Keys matching `pattern`, see [`pattern_matches`].
    pub fn matching_keys(&self, pattern: &str) -> Vec<String> {
        self.records
            .iter()
            .filter(|r| pattern_matches(pattern, r.key()))
            .map(|r| r.key().clone())
            .collect()
    }

    // == Expired ==
    /// Keys and generations of records expired at `now`.
    pub fn expired(&self, now: DateTime<Utc>) -> Vec<(String, u64)> {
        self.records
            .iter()
            .filter(|r| r.is_expired_at(now))
            .map(|r| (r.key().clone(), r.generation))
            .collect()
    }

    // == Coldest ==
    /// The `count` least recently accessed records, coldest first.
    pub fn coldest(&self, count: usize) -> Vec<EntryMetadata> {
        let mut records = self.snapshot();
        records.sort_by_key(|metadata| metadata.last_accessed_at);
        records.truncate(count);
        records
    }
}

// == Pattern Matcher ==
/// Case-insensitive key matching used for bulk invalidation.
///
/// A pattern containing `*` is split into literal segments, and a key matches
/// when it contains every segment in order. Without `*` the whole key must
/// match.
pub fn pattern_matches(pattern: &str, key: &str) -> bool {
    let key = key.to_lowercase();
    let pattern = pattern.to_lowercase();

    if !pattern.contains('*') {
        return key == pattern;
    }

    let mut rest = key.as_str();
    for segment in pattern.split('*').filter(|s| !s.is_empty()) {
        match rest.find(segment) {
            Some(index) => rest = &rest[index + segment.len()..],
            None => return false,
        }
    }
    true
}
