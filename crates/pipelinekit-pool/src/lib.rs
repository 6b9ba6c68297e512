//! Generic, thread-safe object pool with a water-mark-driven shrink policy.

pub mod pool;
pub mod shrinker;
pub mod stats;

pub use pool::{Handle, Pool};
pub use shrinker::{IntelligentShrinker, UsageAnalysis, UsagePattern};
pub use stats::PoolStatistics;
