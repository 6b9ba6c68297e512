//! The core [`Exporter`] trait every backend and wrapper implements.
//!
//! Grounded on the teacher's exporter-node shape (`debug_exporter/exporter.rs`,
//! `otlp_exporter.rs`): an async trait with an explicit lifecycle
//! (`shutdown` is terminal and idempotent) and a status snapshot, rather than
//! the caller inferring health from return values alone.

use crate::aggregated::Aggregated;
use crate::error::ExportError;
use crate::status::ExporterStatus;
use async_trait::async_trait;
use pipelinekit_metrics::MetricSample;

/// A sink for metric data: samples, batches of samples, or pre-aggregated
/// statistics.
///
/// Implementors own their transport (UDP socket, file handle, stdout) and are
/// responsible for reporting their own health via [`Exporter::status`].
/// `export`/`export_batch`/`export_aggregated` never panic; failures are
/// returned as [`ExportError`] and also recorded in the status snapshot.
#[async_trait]
pub trait Exporter: Send + Sync {
    /// Exports a single sample.
    async fn export(&self, sample: &MetricSample) -> Result<(), ExportError>;

    /// Exports a batch of samples. The default implementation calls
    /// [`Exporter::export`] once per sample; backends with a genuine batch
    /// wire format (StatsD packet coalescing, JSON array entries) override
    /// this for efficiency.
    async fn export_batch(&self, samples: &[MetricSample]) -> Result<(), ExportError> {
        for sample in samples {
            self.export(sample).await?;
        }
        Ok(())
    }

    /// Exports pre-aggregated statistics, one [`Aggregated`] per
    /// `(name, tag-set)` key.
    async fn export_aggregated(&self, aggregates: &[Aggregated]) -> Result<(), ExportError>;

    /// Forces any buffered data out to the transport now.
    async fn flush(&self) -> Result<(), ExportError>;

    /// Terminal: flips `active` false, cancels any internal timers, performs
    /// a best-effort final flush, and closes the transport. Idempotent —
    /// calling it twice is a no-op after the first. Every `export*` call
    /// after shutdown returns [`ExportError::ExporterClosed`].
    async fn shutdown(&self) -> Result<(), ExportError>;

    /// A point-in-time health snapshot.
    fn status(&self) -> ExporterStatus;
}
