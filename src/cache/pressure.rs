//! Memory Pressure Module
//!
//! Samples process memory and maintains the shared high/low pressure flag
//! read by `set` (to shorten TTLs) and by the pressure eviction sweep.

use std::fmt;
use std::fs;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;

use tracing::{debug, info, warn};

use crate::error::{CacheError, Result};

/// One in this many ledger entries is evicted per high-pressure tick.
pub const PRESSURE_EVICTION_DIVISOR: usize = 10;

/// Allocation churn, relative to usage, that counts as high pressure.
pub const CHURN_RATIO: f64 = 0.8;

// == Memory Sample ==
/// One reading of process memory.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct MemorySample {
    /// Bytes currently in use by the process
    pub usage_bytes: u64,
    /// Bytes allocated since the previous sample
    pub allocated_bytes: u64,
}

// == Memory Sampler ==
/// Source of memory readings for the pressure monitor.
pub trait MemorySampler: Send + Sync + fmt::Debug {
    fn sample(&self) -> Result<MemorySample>;
}

/// Reads resident set size from `/proc/self/status`.
///
/// `allocated_bytes` is the RSS growth since the previous sample; the first
/// sample reports zero.
#[derive(Debug, Default)]
pub struct ProcessMemorySampler {
    last_rss: AtomicU64,
}

impl ProcessMemorySampler {
    pub fn new() -> Self {
        Self::default()
    }
}

impl MemorySampler for ProcessMemorySampler {
    fn sample(&self) -> Result<MemorySample> {
        let status = fs::read_to_string("/proc/self/status")?;
        let usage_bytes = parse_vm_rss(&status).ok_or_else(|| {
            CacheError::BackgroundTask("VmRSS missing from /proc/self/status".to_string())
        })?;

        let previous = self.last_rss.swap(usage_bytes, Ordering::Relaxed);
        let allocated_bytes = if previous == 0 {
            0
        } else {
            usage_bytes.saturating_sub(previous)
        };

        Ok(MemorySample {
            usage_bytes,
            allocated_bytes,
        })
    }
}

/// Reports whatever reading was last stored in it.
///
/// Useful where process memory is not observable, and for driving the
/// monitor deterministically.
#[derive(Debug, Default)]
pub struct FixedMemorySampler {
    usage_bytes: AtomicU64,
    allocated_bytes: AtomicU64,
}

impl FixedMemorySampler {
    pub fn new(sample: MemorySample) -> Self {
        let sampler = Self::default();
        sampler.set(sample);
        sampler
    }

    pub fn set(&self, sample: MemorySample) {
        self.usage_bytes.store(sample.usage_bytes, Ordering::Relaxed);
        self.allocated_bytes
            .store(sample.allocated_bytes, Ordering::Relaxed);
    }
}

impl MemorySampler for FixedMemorySampler {
    fn sample(&self) -> Result<MemorySample> {
        Ok(MemorySample {
            usage_bytes: self.usage_bytes.load(Ordering::Relaxed),
            allocated_bytes: self.allocated_bytes.load(Ordering::Relaxed),
        })
    }
}

/// Extracts `VmRSS` in bytes from the contents of `/proc/<pid>/status`.
fn parse_vm_rss(status: &str) -> Option<u64> {
    status
        .lines()
        .find(|line| line.starts_with("VmRSS:"))
        .and_then(|line| line.split_whitespace().nth(1))
        .and_then(|kb| kb.parse::<u64>().ok())
        .map(|kb| kb * 1024)
}

// == Pressure Level ==
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PressureLevel {
    Normal,
    High,
}

impl PressureLevel {
    // == Evaluate ==
    /// High when usage exceeds the threshold or allocation churn exceeds
    /// [`CHURN_RATIO`] of usage.
    pub fn evaluate(sample: MemorySample, threshold_bytes: u64) -> Self {
        let churning = sample.allocated_bytes as f64 > CHURN_RATIO * sample.usage_bytes as f64;
        if sample.usage_bytes > threshold_bytes || churning {
            PressureLevel::High
        } else {
            PressureLevel::Normal
        }
    }
}

// == Pressure State ==
/// Shared advisory flag plus the last sampled usage.
#[derive(Debug, Default)]
pub struct PressureState {
    high: AtomicBool,
    last_usage_bytes: AtomicU64,
}

impl PressureState {
    pub fn is_high(&self) -> bool {
        self.high.load(Ordering::Relaxed)
    }

    pub fn level(&self) -> PressureLevel {
        if self.is_high() {
            PressureLevel::High
        } else {
            PressureLevel::Normal
        }
    }

    pub fn last_usage_bytes(&self) -> u64 {
        self.last_usage_bytes.load(Ordering::Relaxed)
    }

    /// Stores a new reading. Returns true if the level changed.
    fn update(&self, level: PressureLevel, usage_bytes: u64) -> bool {
        self.last_usage_bytes.store(usage_bytes, Ordering::Relaxed);
        let high = level == PressureLevel::High;
        self.high.swap(high, Ordering::Relaxed) != high
    }
}

// == Pressure Monitor ==
/// Owns the pressure state and the sampler that drives it.
#[derive(Debug)]
pub struct PressureMonitor {
    state: PressureState,
    sampler: Arc<dyn MemorySampler>,
    threshold_bytes: u64,
}

impl PressureMonitor {
    pub fn new(sampler: Arc<dyn MemorySampler>, threshold_bytes: u64) -> Self {
        Self {
            state: PressureState::default(),
            sampler,
            threshold_bytes,
        }
    }

    pub fn state(&self) -> &PressureState {
        &self.state
    }

    pub fn is_high(&self) -> bool {
        self.state.is_high()
    }

    // == Tick ==
    /// Takes one sample and updates the shared flag.
    ///
    /// A sampler failure leaves the previous level in place.
    pub fn tick(&self) -> Result<PressureLevel> {
        let sample = self.sampler.sample()?;
        let level = PressureLevel::evaluate(sample, self.threshold_bytes);

        if self.state.update(level, sample.usage_bytes) {
            match level {
                PressureLevel::High => warn!(
                    usage_bytes = sample.usage_bytes,
                    allocated_bytes = sample.allocated_bytes,
                    threshold_bytes = self.threshold_bytes,
                    "Memory pressure is high"
                ),
                PressureLevel::Normal => info!(
                    usage_bytes = sample.usage_bytes,
                    "Memory pressure back to normal"
                ),
            }
        } else {
            debug!(usage_bytes = sample.usage_bytes, ?level, "Memory pressure sampled");
        }

        Ok(level)
    }
}

/// Number of entries to evict from a ledger of `entry_count` under pressure.
pub fn eviction_batch(entry_count: usize) -> usize {
    if entry_count == 0 {
        return 0;
    }
    (entry_count / PRESSURE_EVICTION_DIVISOR).max(1)
}
