//! Key Validation Module
//!
//! Rejects malformed keys before any shared state is touched.

use crate::cache::{FORBIDDEN_KEY_CHARS, MAX_KEY_LENGTH};
use crate::error::{CacheError, Result};

// == Validate Key ==
/// Checks that a key is usable as a cache key.
///
/// Rejects empty or whitespace-only keys, keys containing any of
/// [`FORBIDDEN_KEY_CHARS`], and keys longer than [`MAX_KEY_LENGTH`] characters.
pub fn validate_key(key: &str) -> Result<()> {
    if key.trim().is_empty() {
        return Err(CacheError::InvalidKey(
            "Key must not be empty or whitespace".to_string(),
        ));
    }

    if let Some(c) = key.chars().find(|c| FORBIDDEN_KEY_CHARS.contains(c)) {
        return Err(CacheError::InvalidKey(format!(
            "Key contains forbidden character {:?}",
            c
        )));
    }

    if key.chars().count() > MAX_KEY_LENGTH {
        return Err(CacheError::InvalidKey(format!(
            "Key exceeds maximum length of {} characters",
            MAX_KEY_LENGTH
        )));
    }

    Ok(())
}
