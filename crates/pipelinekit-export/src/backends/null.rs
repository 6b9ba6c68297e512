//! An exporter that accepts and discards everything. Useful as a default
//! target in tests and as the bottom of a wrapper stack when no real sink is
//! configured yet.

use crate::aggregated::Aggregated;
use crate::error::ExportError;
use crate::exporter::Exporter;
use crate::status::ExporterStatus;
use async_trait::async_trait;
use pipelinekit_metrics::MetricSample;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};

/// Discards every sample it receives, while still tracking `status()`
/// honestly (so tests exercising wrapper behavior against this backend see
/// real counts).
pub struct NullExporter {
    active: AtomicBool,
    count: AtomicU64,
}

impl NullExporter {
    /// Builds a fresh, active null exporter.
    #[must_use]
    pub fn new() -> Self {
        Self {
            active: AtomicBool::new(true),
            count: AtomicU64::new(0),
        }
    }
}

impl Default for NullExporter {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Exporter for NullExporter {
    async fn export(&self, _sample: &MetricSample) -> Result<(), ExportError> {
        if !self.active.load(Ordering::Acquire) {
            return Err(ExportError::ExporterClosed);
        }
        self.count.fetch_add(1, Ordering::Relaxed);
        Ok(())
    }

    async fn export_aggregated(&self, aggregates: &[Aggregated]) -> Result<(), ExportError> {
        if !self.active.load(Ordering::Acquire) {
            return Err(ExportError::ExporterClosed);
        }
        self.count.fetch_add(aggregates.len() as u64, Ordering::Relaxed);
        Ok(())
    }

    async fn flush(&self) -> Result<(), ExportError> {
        Ok(())
    }

    async fn shutdown(&self) -> Result<(), ExportError> {
        self.active.store(false, Ordering::Release);
        Ok(())
    }

    fn status(&self) -> ExporterStatus {
        ExporterStatus {
            active: self.active.load(Ordering::Acquire),
            success_count: self.count.load(Ordering::Relaxed),
            ..ExporterStatus::default()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pipelinekit_metrics::MetricKind;

    #[tokio::test]
    async fn discards_and_reports_closed_after_shutdown() {
        let exporter = NullExporter::new();
        exporter
            .export(&MetricSample::new("m", MetricKind::Gauge, 1.0))
            .await
            .unwrap();
        assert_eq!(exporter.status().success_count, 1);
        exporter.shutdown().await.unwrap();
        let err = exporter
            .export(&MetricSample::new("m", MetricKind::Gauge, 1.0))
            .await
            .unwrap_err();
        assert!(matches!(err, ExportError::ExporterClosed));
    }
}
