//! Streaming JSON-array file backend with size-triggered rotation.

use crate::aggregated::Aggregated;
use crate::error::ExportError;
use crate::exporter::Exporter;
use crate::rotation::{self, RotationPolicy};
use crate::status::ExporterStatus;
use async_trait::async_trait;
use pipelinekit_config::ExporterDateFormat;
use pipelinekit_metrics::{MetricSample, Snapshot};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use tokio::fs::File;
use tokio::io::{AsyncWriteExt, BufWriter};
use tokio::sync::Mutex as AsyncMutex;

/// Tunables for [`JsonFileExporter`].
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JsonFileConfig {
    /// Path of the active (not-yet-rotated) file.
    pub path: PathBuf,
    /// Rotate once the active file reaches this many bytes.
    #[serde(deserialize_with = "pipelinekit_config::byte_size::deserialize")]
    pub max_file_size: u64,
    /// History retention and compression applied on rotation.
    pub rotation: RotationPolicy,
    /// How timestamps are rendered.
    pub date_format: ExporterDateFormat,
    /// Decimal places retained for floating point values (rounded).
    pub precision: usize,
}

impl Default for JsonFileConfig {
    fn default() -> Self {
        Self {
            path: PathBuf::from("metrics.json"),
            max_file_size: 10 * 1024 * 1024,
            rotation: RotationPolicy::default(),
            date_format: ExporterDateFormat::Iso8601,
            precision: 6,
        }
    }
}

fn round_to(value: f64, precision: usize) -> f64 {
    if !value.is_finite() {
        return value;
    }
    let factor = 10f64.powi(precision as i32);
    (value * factor).round() / factor
}

fn sample_to_value(sample: &MetricSample, date_format: &ExporterDateFormat, precision: usize) -> Value {
    json!({
        "timestamp": date_format.format(sample.timestamp),
        "name": sample.name,
        "kind": sample.kind.label(),
        "value": round_to(sample.value, precision),
        "tags": sample.tags,
        "unit": sample.unit,
    })
}

fn snapshot_to_value(snapshot: &Snapshot, precision: usize) -> Value {
    match snapshot {
        Snapshot::Counter(snap) => json!({
            "type": "counter",
            "count": snap.count,
            "sum": round_to(snap.sum, precision),
            "rate": round_to(snap.rate, precision),
        }),
        Snapshot::BasicStats(snap) => json!({
            "type": "basic_stats",
            "count": snap.counter.count,
            "sum": round_to(snap.counter.sum, precision),
            "min": round_to(snap.min, precision),
            "max": round_to(snap.max, precision),
            "mean": round_to(snap.mean, precision),
        }),
        Snapshot::Histogram(snap) => json!({
            "type": "histogram",
            "count": snap.stats.counter.count,
            "sum": round_to(snap.stats.counter.sum, precision),
            "min": round_to(snap.stats.min, precision),
            "max": round_to(snap.stats.max, precision),
            "mean": round_to(snap.stats.mean, precision),
            "buckets": snap.buckets.iter().map(|(b, c)| json!({"le": if b.is_infinite() { "+Inf".to_string() } else { b.to_string() }, "count": c})).collect::<Vec<_>>(),
            "p50": round_to(snap.percentiles.p50, precision),
            "p90": round_to(snap.percentiles.p90, precision),
            "p95": round_to(snap.percentiles.p95, precision),
            "p99": round_to(snap.percentiles.p99, precision),
            "p999": round_to(snap.percentiles.p999, precision),
        }),
        Snapshot::Decay(snap) => json!({
            "type": "decay",
            "count": snap.count,
            "min": round_to(snap.min, precision),
            "max": round_to(snap.max, precision),
            "ewma": round_to(snap.ewma, precision),
            "ewmv": round_to(snap.ewmv, precision),
            "ci_lower": round_to(snap.ci_lower, precision),
            "ci_upper": round_to(snap.ci_upper, precision),
        }),
    }
}

fn aggregate_to_value(aggregate: &Aggregated, date_format: &ExporterDateFormat, precision: usize) -> Value {
    json!({
        "timestamp": date_format.format(aggregate.timestamp),
        "name": aggregate.name,
        "tags": aggregate.tags,
        "stats": snapshot_to_value(&aggregate.snapshot, precision),
    })
}

struct FileState {
    writer: BufWriter<File>,
    size: u64,
    first_entry: bool,
}

/// Writes samples and aggregates as a single streaming JSON array, rotating
/// the underlying file once it grows past `max_file_size`.
pub struct JsonFileExporter {
    config: JsonFileConfig,
    file: AsyncMutex<FileState>,
    active: AtomicBool,
    success_count: AtomicU64,
    failure_count: AtomicU64,
}

impl JsonFileExporter {
    /// Opens (creating if needed) `config.path` and writes the opening `[\n`.
    pub async fn new(config: JsonFileConfig) -> Result<Self, ExportError> {
        let file = File::create(&config.path).await?;
        let mut writer = BufWriter::new(file);
        writer.write_all(b"[\n").await?;
        writer.flush().await?;
        Ok(Self {
            config,
            file: AsyncMutex::new(FileState {
                writer,
                size: 2,
                first_entry: true,
            }),
            active: AtomicBool::new(true),
            success_count: AtomicU64::new(0),
            failure_count: AtomicU64::new(0),
        })
    }

    async fn write_entry(&self, value: Value) -> Result<(), ExportError> {
        if !self.active.load(Ordering::Acquire) {
            return Err(ExportError::ExporterClosed);
        }
        let rendered = serde_json::to_string(&value)
            .map_err(|e| ExportError::InvalidData(e.to_string()))?;
        let mut state = self.file.lock().await;
        let prefix = if state.first_entry { "" } else { ",\n" };
        let chunk = format!("{prefix}{rendered}");
        state.writer.write_all(chunk.as_bytes()).await?;
        state.size += chunk.len() as u64;
        state.first_entry = false;
        let needs_rotation = state.size >= self.config.max_file_size;
        drop(state);
        if needs_rotation {
            self.rotate().await?;
        }
        Ok(())
    }

    async fn rotate(&self) -> Result<(), ExportError> {
        let mut state = self.file.lock().await;
        state.writer.write_all(b"\n]").await?;
        state.writer.flush().await?;
        state.writer.shutdown().await?;
        rotation::rotate(&self.config.path, &self.config.rotation).await?;
        let file = File::create(&self.config.path).await?;
        let mut writer = BufWriter::new(file);
        writer.write_all(b"[\n").await?;
        writer.flush().await?;
        *state = FileState {
            writer,
            size: 2,
            first_entry: true,
        };
        Ok(())
    }
}

#[async_trait]
impl Exporter for JsonFileExporter {
    async fn export(&self, sample: &MetricSample) -> Result<(), ExportError> {
        let result = self
            .write_entry(sample_to_value(sample, &self.config.date_format, self.config.precision))
            .await;
        self.record_outcome(&result);
        result
    }

    async fn export_aggregated(&self, aggregates: &[Aggregated]) -> Result<(), ExportError> {
        for aggregate in aggregates {
            let result = self
                .write_entry(aggregate_to_value(aggregate, &self.config.date_format, self.config.precision))
                .await;
            self.record_outcome(&result);
            result?;
        }
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
        state.writer.write_all(b"\n]").await?;
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

impl JsonFileExporter {
    fn record_outcome(&self, result: &Result<(), ExportError>) {
        match result {
            Ok(()) => {
                self.success_count.fetch_add(1, Ordering::Relaxed);
            }
            Err(_) => {
                self.failure_count.fetch_add(1, Ordering::Relaxed);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pipelinekit_metrics::MetricKind;

    #[tokio::test]
    async fn writes_a_well_formed_json_array() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("m.json");
        let exporter = JsonFileExporter::new(JsonFileConfig {
            path: path.clone(),
            ..JsonFileConfig::default()
        })
        .await
        .unwrap();
        exporter
            .export(&MetricSample::new("a", MetricKind::Counter, 1.0))
            .await
            .unwrap();
        exporter
            .export(&MetricSample::new("b", MetricKind::Gauge, 2.5))
            .await
            .unwrap();
        exporter.shutdown().await.unwrap();
        let contents = tokio::fs::read_to_string(&path).await.unwrap();
        let parsed: Value = serde_json::from_str(&contents).unwrap();
        assert_eq!(parsed.as_array().unwrap().len(), 2);
    }

    #[tokio::test]
    async fn rotates_once_max_file_size_is_exceeded() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("m.json");
        let exporter = JsonFileExporter::new(JsonFileConfig {
            path: path.clone(),
            max_file_size: 10,
            ..JsonFileConfig::default()
        })
        .await
        .unwrap();
        exporter
            .export(&MetricSample::new("a", MetricKind::Counter, 1.0))
            .await
            .unwrap();
        assert!(dir.path().join("m.1.json").exists());
        exporter.shutdown().await.unwrap();
    }

    #[tokio::test]
    async fn values_are_rounded_to_configured_precision() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("m.json");
        let exporter = JsonFileExporter::new(JsonFileConfig {
            path: path.clone(),
            precision: 2,
            ..JsonFileConfig::default()
        })
        .await
        .unwrap();
        exporter
            .export(&MetricSample::new("a", MetricKind::Gauge, 1.23456))
            .await
            .unwrap();
        exporter.shutdown().await.unwrap();
        let contents = tokio::fs::read_to_string(&path).await.unwrap();
        assert!(contents.contains("1.23"));
    }
}
