//! Cache Module
//!
//! Provides the adaptive in-memory cache: key validation, prefix expiration,
//! a size-bounded entry store, the metadata ledger, statistics and memory
//! pressure tracking.

mod adaptive;
mod entry;
mod key;
mod ledger;
mod policy;
mod pressure;
mod stats;
mod store;


// Re-export public types
pub use adaptive::AdaptiveCache;
pub use entry::{estimate_size, EntryMetadata};
pub use key::validate_key;
pub use ledger::{pattern_matches, MetadataLedger};
pub use policy::{ExpirationPolicy, ExpirationRule, Priority};
pub use pressure::{
    eviction_batch, FixedMemorySampler, MemorySample, MemorySampler, PressureLevel,
    PressureMonitor, PressureState, ProcessMemorySampler,
};
pub use stats::{CacheStatistics, StatsCounters};
pub use store::{EntryStore, RemovalListener, RemovalReason, RemovedEntry, StoredValue};

// == Public Constants ==
/// Maximum allowed key length in characters
pub const MAX_KEY_LENGTH: usize = 250;

/// Characters that may not appear in a key
pub const FORBIDDEN_KEY_CHARS: [char; 7] = ['<', '>', '"', '|', '?', '*', '\0'];
