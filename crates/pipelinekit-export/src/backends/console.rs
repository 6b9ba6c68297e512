//! Prints samples to stdout — pretty (one field per line) or compact
//! (one line per sample).

use crate::aggregated::Aggregated;
use crate::error::ExportError;
use crate::exporter::Exporter;
use crate::status::ExporterStatus;
use async_trait::async_trait;
use parking_lot::Mutex;
use pipelinekit_metrics::MetricSample;
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};

/// Console rendering style.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConsoleFormat {
    /// `name=value kind=counter tags={...} unit=ms` on one line.
    Compact,
    /// Each field of the sample on its own indented line.
    Pretty,
}

/// Writes to stdout. Exists primarily for local development and demos; never
/// fails on a healthy terminal, so its `status()` failure count stays at
/// zero in practice.
pub struct ConsoleExporter {
    format: ConsoleFormat,
    prefix: Option<String>,
    active: AtomicBool,
    success_count: AtomicU64,
    last_error: Mutex<Option<String>>,
}

impl ConsoleExporter {
    /// Builds a console exporter with the given rendering style and an
    /// optional line prefix.
    #[must_use]
    pub fn new(format: ConsoleFormat, prefix: Option<String>) -> Self {
        Self {
            format,
            prefix,
            active: AtomicBool::new(true),
            success_count: AtomicU64::new(0),
            last_error: Mutex::new(None),
        }
    }

    fn render(&self, sample: &MetricSample) -> String {
        let prefix = self.prefix.as_deref().unwrap_or("");
        match self.format {
            ConsoleFormat::Compact => {
                let tags = sample
                    .tags
                    .iter()
                    .map(|(k, v)| format!("{k}={v}"))
                    .collect::<Vec<_>>()
                    .join(",");
                format!(
                    "{prefix}{} {}={} [{}]",
                    sample.timestamp.to_rfc3339(),
                    sample.name,
                    sample.value,
                    tags
                )
            }
            ConsoleFormat::Pretty => {
                let mut out = format!("{prefix}{}\n", sample.name);
                out.push_str(&format!("  kind:      {}\n", sample.kind.label()));
                out.push_str(&format!("  value:     {}\n", sample.value));
                out.push_str(&format!("  timestamp: {}\n", sample.timestamp.to_rfc3339()));
                if let Some(unit) = &sample.unit {
                    out.push_str(&format!("  unit:      {unit}\n"));
                }
                for (k, v) in &sample.tags {
                    out.push_str(&format!("  tag.{k}:    {v}\n"));
                }
                out
            }
        }
    }
}

#[async_trait]
impl Exporter for ConsoleExporter {
    async fn export(&self, sample: &MetricSample) -> Result<(), ExportError> {
        if !self.active.load(Ordering::Acquire) {
            return Err(ExportError::ExporterClosed);
        }
        println!("{}", self.render(sample));
        self.success_count.fetch_add(1, Ordering::Relaxed);
        Ok(())
    }

    async fn export_aggregated(&self, aggregates: &[Aggregated]) -> Result<(), ExportError> {
        if !self.active.load(Ordering::Acquire) {
            return Err(ExportError::ExporterClosed);
        }
        for aggregate in aggregates {
            println!(
                "{}{} {:?} [{:?}]",
                self.prefix.as_deref().unwrap_or(""),
                aggregate.name,
                aggregate.snapshot,
                aggregate.tags
            );
        }
        self.success_count.fetch_add(aggregates.len() as u64, Ordering::Relaxed);
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
            success_count: self.success_count.load(Ordering::Relaxed),
            last_error: self.last_error.lock().clone(),
            ..ExporterStatus::default()
        }
    }
}
