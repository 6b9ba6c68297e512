//! Runtime health reported by every exporter.

/// A point-in-time view of an exporter's health, returned by
/// [`crate::exporter::Exporter::status`].
#[derive(Debug, Clone, Default)]
pub struct ExporterStatus {
    /// Whether the exporter is still accepting work (`false` after `shutdown`).
    pub active: bool,
    /// How many samples/snapshots are currently buffered, awaiting flush.
    pub queue_depth: usize,
    /// Cumulative count of samples successfully exported.
    pub success_count: u64,
    /// Cumulative count of samples that failed to export.
    pub failure_count: u64,
    /// When the last successful export completed.
    pub last_export_ts: Option<chrono::DateTime<chrono::Utc>>,
    /// The most recent error, if any.
    pub last_error: Option<String>,
}
