//! Pulse - site uptime monitoring core
//!
//! Tracks registered web addresses, probes them on a per-target interval and
//! keeps per-day outcome counters from which uptime percentages are derived.

pub mod address;
pub mod clock;
pub mod config;
pub mod database;
pub mod error;
pub mod monitoring;
pub mod pool;
pub mod service;

#[cfg(test)]
mod testing;

pub use config::Config;
pub use database::{DayBucket, LastCheck, Target};
pub use error::{Error, Result};
pub use monitoring::{ForceScope, MonitorStatus, Settlement};
pub use service::{ServiceSettings, TargetUpdate, UptimeService};
