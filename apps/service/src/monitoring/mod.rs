/// Monitoring engine module - decides when targets are probed and what the
/// outcomes add up to
///
/// This module is responsible for:
/// - Executing bounded-time HTTP reachability probes
/// - Scheduling probes per target interval, with forced checks on demand
/// - Folding outcomes into per-day counters and answering uptime queries
pub mod aggregator;
pub mod probe;
pub mod scheduler;
pub mod timer;
pub mod types;

pub use aggregator::{Aggregator, DEFAULT_UPTIME_WINDOW_DAYS};
pub use probe::{DEFAULT_PROBE_TIMEOUT, HttpProbe, Probe};
pub use scheduler::{Dispatch, MonitoringScheduler};
pub use timer::{IntervalTimer, ManualTimer, Timer};
pub use types::{ForceScope, MonitorStatus, Settlement};
