//! Configuration Module
//!
//! Handles loading and managing cache configuration from environment variables.

use std::env;
use std::str::FromStr;
use std::time::Duration;

use crate::cache::ExpirationRule;

/// Cache configuration parameters.
///
/// Scalar values can be configured via environment variables with sensible defaults.
/// Prefix expiration rules are configured in code.
#[derive(Debug, Clone)]
pub struct Config {
    /// TTL applied when no explicit TTL or prefix rule matches
    pub default_expiration: Duration,
    /// Ordered prefix rules; the first matching prefix wins
    pub expiration_rules: Vec<ExpirationRule>,
    /// Resident memory above which the cache reports high pressure
    pub memory_pressure_threshold_bytes: u64,
    /// Soft cap on entry count, only reported, never enforced
    pub max_entries: usize,
    /// Whether the pressure monitor loop runs at all
    pub enable_memory_pressure_management: bool,
    /// Upper bound on the estimated bytes held by the entry store
    pub store_size_limit_bytes: Option<usize>,
    /// Interval between expiry sweeps
    pub cleanup_interval: Duration,
    /// Interval between memory pressure samples
    pub pressure_check_interval: Duration,
}

impl Config {
    /// Creates a new Config by loading values from environment variables.
    ///
    /// # Environment Variables
    /// - `DEFAULT_TTL` - Default TTL in seconds (default: 300)
    /// - `MEMORY_PRESSURE_THRESHOLD_BYTES` - Pressure threshold (default: 512 MiB)
    /// - `MAX_ENTRIES` - Soft entry cap (default: 10000)
    /// - `ENABLE_MEMORY_PRESSURE_MANAGEMENT` - Run the pressure monitor (default: true)
    /// - `STORE_SIZE_LIMIT_BYTES` - Entry store byte limit (default: unbounded)
    /// - `CLEANUP_INTERVAL` - Expiry sweep frequency in seconds (default: 60)
    /// - `PRESSURE_CHECK_INTERVAL` - Pressure sampling frequency in seconds (default: 30)
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            default_expiration: Duration::from_secs(env_or(
                "DEFAULT_TTL",
                defaults.default_expiration.as_secs(),
            )),
            expiration_rules: defaults.expiration_rules,
            memory_pressure_threshold_bytes: env_or(
                "MEMORY_PRESSURE_THRESHOLD_BYTES",
                defaults.memory_pressure_threshold_bytes,
            ),
            max_entries: env_or("MAX_ENTRIES", defaults.max_entries),
            enable_memory_pressure_management: env_or(
                "ENABLE_MEMORY_PRESSURE_MANAGEMENT",
                defaults.enable_memory_pressure_management,
            ),
            store_size_limit_bytes: env::var("STORE_SIZE_LIMIT_BYTES")
                .ok()
                .and_then(|v| v.parse().ok()),
            cleanup_interval: Duration::from_secs(env_or(
                "CLEANUP_INTERVAL",
                defaults.cleanup_interval.as_secs(),
            )),
            pressure_check_interval: Duration::from_secs(env_or(
                "PRESSURE_CHECK_INTERVAL",
                defaults.pressure_check_interval.as_secs(),
            )),
        }
    }

    /// Appends a prefix rule after the existing ones.
    pub fn with_expiration_rule(mut self, prefix: impl Into<String>, ttl: Duration) -> Self {
        self.expiration_rules.push(ExpirationRule::new(prefix, ttl));
        self
    }

    /// Replaces all prefix rules.
    pub fn with_expiration_rules(mut self, rules: Vec<ExpirationRule>) -> Self {
        self.expiration_rules = rules;
        self
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            default_expiration: Duration::from_secs(300),
            expiration_rules: vec![
                ExpirationRule::new("projects", Duration::from_secs(600)),
                ExpirationRule::new("user", Duration::from_secs(900)),
                ExpirationRule::new("builds", Duration::from_secs(120)),
                ExpirationRule::new("temp", Duration::from_secs(60)),
            ],
            memory_pressure_threshold_bytes: 512 * 1024 * 1024,
            max_entries: 10_000,
            enable_memory_pressure_management: true,
            store_size_limit_bytes: None,
            cleanup_interval: Duration::from_secs(60),
            pressure_check_interval: Duration::from_secs(30),
        }
    }
}

fn env_or<T: FromStr>(name: &str, default: T) -> T {
    env::var(name)
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}
