//! The pre-aggregated output of [`crate::aggregation::AggregationWrapper`].

use pipelinekit_metrics::{Snapshot, Tags};

/// One `(name, tag-set)` key's accumulated state at flush time. Backends that
/// understand [`Snapshot`]'s discriminated shape (JSON, console) serialize it
/// directly; backends with a flatter wire format (StatsD, Prometheus) project
/// it down to the fields they can represent.
#[derive(Debug, Clone)]
pub struct Aggregated {
    /// The metric name this aggregate was accumulated under.
    pub name: String,
    /// The tag-set this aggregate was accumulated under.
    pub tags: Tags,
    /// When this aggregate was flushed.
    pub timestamp: chrono::DateTime<chrono::Utc>,
    /// The accumulated statistics.
    pub snapshot: Snapshot,
}
