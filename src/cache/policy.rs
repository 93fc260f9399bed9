//! Expiration and Priority Policy Module
//!
//! Resolves per-key TTLs from ordered prefix rules and classifies keys into
//! eviction priorities.

use std::time::Duration;

use serde::Serialize;

// == Expiration Rule ==
/// A single prefix to TTL mapping. Prefixes are matched case-insensitively.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExpirationRule {
    prefix: String,
    ttl: Duration,
}

impl ExpirationRule {
    pub fn new(prefix: impl Into<String>, ttl: Duration) -> Self {
        Self {
            prefix: prefix.into().to_lowercase(),
            ttl,
        }
    }

    pub fn prefix(&self) -> &str {
        &self.prefix
    }

    pub fn ttl(&self) -> Duration {
        self.ttl
    }
}

// == Expiration Policy ==
/// Ordered prefix rules plus a global default.
///
/// When several prefixes could match a key the first declared rule wins,
/// not the longest one.
#[derive(Debug, Clone)]
pub struct ExpirationPolicy {
    rules: Vec<ExpirationRule>,
    default_ttl: Duration,
}

impl ExpirationPolicy {
    pub fn new(rules: Vec<ExpirationRule>, default_ttl: Duration) -> Self {
        Self { rules, default_ttl }
    }

    // == Resolve ==
    /// Returns the TTL for `key`.
    ///
    /// An explicit TTL always wins; otherwise the first matching prefix rule,
    /// otherwise the default.
    pub fn resolve(&self, key: &str, explicit_ttl: Option<Duration>) -> Duration {
        if let Some(ttl) = explicit_ttl {
            return ttl;
        }

        let lowered = key.to_lowercase();
        self.rules
            .iter()
            .find(|rule| lowered.starts_with(&rule.prefix))
            .map(|rule| rule.ttl)
            .unwrap_or(self.default_ttl)
    }
}

// == Priority ==
/// Eviction priority used by the entry store when it compacts itself.
///
/// Ordered from first-to-go to never-removed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
pub enum Priority {
    Low,
    Normal,
    High,
    NeverRemove,
}

impl Priority {
    // == Classify ==
    /// Derives the priority from the lower-cased key prefix.
    pub fn classify(key: &str) -> Self {
        let lowered = key.to_lowercase();
        if lowered.starts_with("projects") || lowered.starts_with("user") {
            Priority::High
        } else if lowered.starts_with("builds") {
            Priority::Low
        } else if lowered.starts_with("temp") {
            Priority::NeverRemove
        } else {
            Priority::Normal
        }
    }
}
