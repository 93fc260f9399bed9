//! Adaptive Cache - An in-process response cache for remote API calls
//!
//! Memoizes responses under string keys with per-prefix expirations, and sheds
//! entries automatically as process memory pressure rises.

pub mod cache;
pub mod config;
pub mod error;
pub mod tasks;

pub use cache::{AdaptiveCache, CacheStatistics};
pub use config::Config;
pub use error::{CacheError, Result};
pub use tasks::{spawn_cleanup_task, spawn_pressure_monitor};
