//! Background Tasks Module
//!
//! Contains background tasks that run periodically for the lifetime of a cache.
//!
//! # Tasks
//! - Expiry sweep: removes expired cache entries at configured intervals
//! - Pressure monitor: samples memory and evicts cold entries while pressure is high

mod cleanup;
mod pressure;

pub use cleanup::spawn_cleanup_task;
pub use pressure::spawn_pressure_monitor;
