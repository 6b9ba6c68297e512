//! CSV file backend with a header row and size-triggered rotation.
//!
//! The header is either caller-provided or inferred from the first batch of
//! samples written to a given file (the sorted union of their tag keys) —
//! true "union of every tag key ever observed" would require buffering the
//! whole run before the first byte hits disk, which defeats streaming output.

use crate::aggregated::Aggregated;
use crate::error::ExportError;
use crate::exporter::Exporter;
use crate::rotation::{self, RotationPolicy};
use crate::status::ExporterStatus;
use async_trait::async_trait;
use pipelinekit_metrics::{MetricSample, Snapshot};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use tokio::fs::File;
use tokio::io::{AsyncWriteExt, BufWriter};
use tokio::sync::Mutex as AsyncMutex;

/// Tunables for [`CsvFileExporter`].
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CsvFileConfig {
    /// Path of the active (not-yet-rotated) file.
    pub path: PathBuf,
    /// Rotate once the active file reaches this many bytes.
    #[serde(deserialize_with = "pipelinekit_config::byte_size::deserialize")]
    pub max_file_size: u64,
    /// History retention and compression applied on rotation.
    pub rotation: RotationPolicy,
    /// Fixed tag-column header; if `None`, inferred from the first write.
    pub header: Option<Vec<String>>,
}

impl Default for CsvFileConfig {
    fn default() -> Self {
        Self {
            path: PathBuf::from("metrics.csv"),
            max_file_size: 10 * 1024 * 1024,
            rotation: RotationPolicy::default(),
            header: None,
        }
    }
}

fn quote_field(field: &str) -> String {
    if field.contains(',') || field.contains('"') || field.contains('\r') || field.contains('\n') {
        format!("\"{}\"", field.replace('"', "\"\""))
    } else {
        field.to_string()
    }
}

fn row(fields: &[String]) -> String {
    fields.iter().map(|f| quote_field(f)).collect::<Vec<_>>().join(",") + "\n"
}

struct FileState {
    writer: BufWriter<File>,
    size: u64,
    tag_columns: Option<Vec<String>>,
}

/// Writes samples and aggregates as CSV rows, rotating the underlying file
/// once it grows past `max_file_size`.
pub struct CsvFileExporter {
    config: CsvFileConfig,
    file: AsyncMutex<FileState>,
    active: AtomicBool,
    success_count: AtomicU64,
    failure_count: AtomicU64,
}

impl CsvFileExporter {
    /// Opens (creating if needed) `config.path`. The header is written
    /// immediately if `config.header` is set; otherwise on the first write.
    pub async fn new(config: CsvFileConfig) -> Result<Self, ExportError> {
        let file = File::create(&config.path).await?;
        let mut writer = BufWriter::new(file);
        let mut size = 0u64;
        let tag_columns = if let Some(header) = &config.header {
            let line = Self::render_header(header);
            writer.write_all(line.as_bytes()).await?;
            size += line.len() as u64;
            Some(header.clone())
        } else {
            None
        };
        writer.flush().await?;
        Ok(Self {
            config,
            file: AsyncMutex::new(FileState {
                writer,
                size,
                tag_columns,
            }),
            active: AtomicBool::new(true),
            success_count: AtomicU64::new(0),
            failure_count: AtomicU64::new(0),
        })
    }

    fn render_header(tag_columns: &[String]) -> String {
        let mut fields = vec!["timestamp".to_string(), "name".to_string(), "value".to_string(), "type".to_string()];
        fields.extend(tag_columns.iter().cloned());
        row(&fields)
    }

    fn sample_row(sample: &MetricSample, tag_columns: &[String]) -> String {
        let mut fields = vec![
            sample.timestamp.to_rfc3339(),
            sample.name.clone(),
            sample.value.to_string(),
            sample.kind.label().to_string(),
        ];
        for col in tag_columns {
            fields.push(sample.tags.get(col).cloned().unwrap_or_default());
        }
        row(&fields)
    }

    fn aggregate_row(aggregate: &Aggregated, tag_columns: &[String]) -> String {
        let (representative, kind) = match &aggregate.snapshot {
            Snapshot::Counter(snap) => (snap.sum, "counter"),
            Snapshot::BasicStats(snap) => (snap.mean, "basic_stats"),
            Snapshot::Histogram(snap) => (snap.stats.mean, "histogram"),
            Snapshot::Decay(snap) => (snap.ewma, "decay"),
        };
        let mut fields = vec![
            aggregate.timestamp.to_rfc3339(),
            aggregate.name.clone(),
            representative.to_string(),
            kind.to_string(),
        ];
        for col in tag_columns {
            fields.push(aggregate.tags.get(col).cloned().unwrap_or_default());
        }
        row(&fields)
    }

    async fn ensure_header(&self, state: &mut FileState, tags_iter: impl Iterator<Item = std::collections::BTreeSet<String>>) -> Result<Vec<String>, ExportError> {
        if let Some(cols) = &state.tag_columns {
            return Ok(cols.clone());
        }
        let mut union: BTreeSet<String> = BTreeSet::new();
        for tags in tags_iter {
            union.extend(tags);
        }
        let cols: Vec<String> = union.into_iter().collect();
        let line = Self::render_header(&cols);
        state.writer.write_all(line.as_bytes()).await?;
        state.size += line.len() as u64;
        state.tag_columns = Some(cols.clone());
        Ok(cols)
    }

    async fn rotate(&self, state: &mut FileState) -> Result<(), ExportError> {
        state.writer.flush().await?;
        state.writer.shutdown().await?;
        rotation::rotate(&self.config.path, &self.config.rotation).await?;
        let file = File::create(&self.config.path).await?;
        let mut writer = BufWriter::new(file);
        let mut size = 0u64;
        if let Some(header) = &self.config.header {
            let line = Self::render_header(header);
            writer.write_all(line.as_bytes()).await?;
            size += line.len() as u64;
        }
        *state = FileState {
            writer,
            size,
            tag_columns: self.config.header.clone(),
        };
        Ok(())
    }
}

#[async_trait]
impl Exporter for CsvFileExporter {
    async fn export(&self, sample: &MetricSample) -> Result<(), ExportError> {
        if !self.active.load(Ordering::Acquire) {
            return Err(ExportError::ExporterClosed);
        }
        let mut state = self.file.lock().await;
        let cols = self.ensure_header(&mut state, std::iter::once(sample.tags.keys().cloned().collect())).await?;
        let line = Self::sample_row(sample, &cols);
        state.writer.write_all(line.as_bytes()).await?;
        state.size += line.len() as u64;
        let needs_rotation = state.size >= self.config.max_file_size;
        if needs_rotation {
            self.rotate(&mut state).await?;
        }
        drop(state);
        self.success_count.fetch_add(1, Ordering::Relaxed);
        Ok(())
    }

    async fn export_batch(&self, samples: &[MetricSample]) -> Result<(), ExportError> {
        if !self.active.load(Ordering::Acquire) {
            return Err(ExportError::ExporterClosed);
        }
        let mut state = self.file.lock().await;
        let tag_sets = samples.iter().map(|s| s.tags.keys().cloned().collect());
        let cols = self.ensure_header(&mut state, tag_sets).await?;
        for sample in samples {
            let line = Self::sample_row(sample, &cols);
            state.writer.write_all(line.as_bytes()).await?;
            state.size += line.len() as u64;
        }
        let needs_rotation = state.size >= self.config.max_file_size;
        if needs_rotation {
            self.rotate(&mut state).await?;
        }
        drop(state);
        self.success_count.fetch_add(samples.len() as u64, Ordering::Relaxed);
        Ok(())
    }

    async fn export_aggregated(&self, aggregates: &[Aggregated]) -> Result<(), ExportError> {
        if !self.active.load(Ordering::Acquire) {
            return Err(ExportError::ExporterClosed);
        }
        let mut state = self.file.lock().await;
        let tag_sets = aggregates.iter().map(|a| a.tags.keys().cloned().collect());
        let cols = self.ensure_header(&mut state, tag_sets).await?;
        for aggregate in aggregates {
            let line = Self::aggregate_row(aggregate, &cols);
            state.writer.write_all(line.as_bytes()).await?;
            state.size += line.len() as u64;
        }
        let needs_rotation = state.size >= self.config.max_file_size;
        if needs_rotation {
            self.rotate(&mut state).await?;
        }
        drop(state);
        self.success_count.fetch_add(aggregates.len() as u64, Ordering::Relaxed);
        Ok(())
    }

    async fn flush(&self) -> Result<(), ExportError> {
        let mut state = self.file.lock().await;
        state.writer.flush().await?;
        Ok(())
    }

    async fn shutdown(&self) -> Result<(), ExportError> {
        if !self.active.swap(false, Ordering::AcqRel) {
            return Ok(());
        }
        let mut state = self.file.lock().await;
        state.writer.flush().await?;
        state.writer.shutdown().await?;
        Ok(())
    }

    fn status(&self) -> ExporterStatus {
        ExporterStatus {
            active: self.active.load(Ordering::Acquire),
            success_count: self.success_count.load(Ordering::Relaxed),
            failure_count: self.failure_count.load(Ordering::Relaxed),
            ..ExporterStatus::default()
        }
    }
}
