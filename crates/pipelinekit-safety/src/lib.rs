//! Resource-exhaustion guard rails: an atomic reserve/confirm/cancel
//! protocol over per-kind admission policies, with leak detection and a
//! self-consistency audit.

pub mod error;
pub mod handle;
pub mod limits;
pub mod monitor;
pub mod probe;
pub mod registry;
pub mod watchdog;

pub use error::SafetyError;
pub use handle::{Reservation, ResourceHandle};
pub use limits::Limits;
pub use monitor::{ConsistencyReport, Mismatch, MonitorConfig, SafetyMonitor, ShutdownHandler};
pub use probe::{FixedProbe, HostProbe, SystemProbe};
pub use registry::{Eviction, LruRegistry, ResourceLeak};
pub use watchdog::Watchdog;
