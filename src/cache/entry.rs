//! Cache Entry Module
//!
//! Defines the bookkeeping record kept for every cached entry and the
//! value size estimation used when entries are written.

use std::any::Any;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::cache::Priority;
use crate::error::{CacheError, Result};

// == Entry Metadata ==
/// Bookkeeping for a single cache entry.
///
/// `generation` identifies the store write this record describes, so a removal
/// of an older write never drops the record of a newer one.
#[derive(Debug, Clone, Serialize)]
pub struct EntryMetadata {
    pub key: String,
    pub created_at: DateTime<Utc>,
    pub last_accessed_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
    pub size_bytes: usize,
    pub priority: Priority,
    pub generation: u64,
}

impl EntryMetadata {
    // == Constructor ==
    /// Creates metadata for an entry written now that lives for `ttl`.
    pub fn new(
        key: impl Into<String>,
        ttl: Duration,
        size_bytes: usize,
        priority: Priority,
        generation: u64,
    ) -> Self {
        let now = Utc::now();
        let expires_at = chrono::Duration::from_std(ttl)
            .ok()
            .and_then(|ttl| now.checked_add_signed(ttl))
            .unwrap_or(DateTime::<Utc>::MAX_UTC);
        Self {
            key: key.into(),
            created_at: now,
            last_accessed_at: now,
            expires_at,
            size_bytes,
            priority,
            generation,
        }
    }

    // == Is Expired ==
    /// An entry is expired once `now` reaches `expires_at`.
    pub fn is_expired_at(&self, now: DateTime<Utc>) -> bool {
        now >= self.expires_at
    }

    // == Time To Live ==
    /// Returns the remaining lifetime, zero once expired.
    pub fn ttl_remaining(&self) -> Duration {
        (self.expires_at - Utc::now())
            .to_std()
            .unwrap_or(Duration::ZERO)
    }

    /// The lifetime the entry was written with.
    pub fn lifetime(&self) -> Duration {
        (self.expires_at - self.created_at)
            .to_std()
            .unwrap_or(Duration::ZERO)
    }
}

// == Size Estimation ==
/// Estimates how many bytes a value occupies.
///
/// Text counts two bytes per UTF-16 code unit, binary counts its raw length,
/// anything else counts its JSON encoding. Values that encode to `null` are
/// rejected.
pub fn estimate_size<T>(value: &T) -> Result<usize>
where
    T: Serialize + Any,
{
    let any = value as &dyn Any;
    if let Some(text) = any.downcast_ref::<String>() {
        return Ok(utf16_width(text));
    }
    if let Some(text) = any.downcast_ref::<&'static str>() {
        return Ok(utf16_width(text));
    }
    if let Some(bytes) = any.downcast_ref::<Vec<u8>>() {
        return Ok(bytes.len());
    }

    let encoded = serde_json::to_vec(value)?;
    if encoded == b"null" {
        return Err(CacheError::InvalidValue(
            "Null values cannot be cached".to_string(),
        ));
    }
    Ok(encoded.len())
}

fn utf16_width(text: &str) -> usize {
    text.encode_utf16().count() * 2
}
