//! Pull-oriented Prometheus text exposition.
//!
//! Deliberately hand-rolled rather than built on the `prometheus` crate: that
//! crate's `Collector`/`Registry` model assumes a fixed, statically
//! registered set of metrics, while this substrate's metrics are dynamic
//! `(name, tag-set)` pairs discovered at record time. `scrape()` renders
//! whatever has been exported so far; wiring it behind an HTTP handler is
//! left to the integrator, matching the teacher's admin crate calling into
//! a snapshot function rather than owning the metrics themselves.

use crate::aggregated::Aggregated;
use crate::error::ExportError;
use crate::exporter::Exporter;
use crate::status::ExporterStatus;
use async_trait::async_trait;
use parking_lot::Mutex;
use pipelinekit_metrics::{MetricKind, MetricSample, Snapshot, Tags};
use std::collections::BTreeMap;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};

fn sanitize_name(name: &str) -> String {
    name.chars()
        .map(|c| if c == '.' || c == '-' { '_' } else { c })
        .collect()
}

fn escape_label_value(value: &str) -> String {
    value
        .replace('\\', "\\\\")
        .replace('"', "\\\"")
        .replace('\n', "\\n")
}

fn prom_type_and_suffix(kind: MetricKind) -> (&'static str, &'static str) {
    match kind {
        MetricKind::Counter => ("counter", "_total"),
        MetricKind::Gauge => ("gauge", ""),
        MetricKind::Timer => ("gauge", "_milliseconds"),
        MetricKind::Histogram => ("histogram", ""),
    }
}

#[derive(Debug, Clone)]
enum Entry {
    Scalar(f64),
    Histogram {
        sum: f64,
        count: u64,
        buckets: Vec<(f64, u64)>,
    },
}

#[derive(Debug, Clone)]
struct Series {
    kind: MetricKind,
    tags: Tags,
    entry: Entry,
}

/// Exports by tracking the latest value per `(name, tag-set)` and rendering
/// them as Prometheus text-format 0.0.4 on demand via [`scrape`](Self::scrape).
pub struct PrometheusExporter {
    active: AtomicBool,
    success_count: AtomicU64,
    // Key: sanitized metric name -> Key: sorted tag pairs -> series.
    series: Mutex<BTreeMap<String, BTreeMap<Vec<(String, String)>, Series>>>,
}

impl PrometheusExporter {
    /// Builds an empty, active exporter.
    #[must_use]
    pub fn new() -> Self {
        Self {
            active: AtomicBool::new(true),
            success_count: AtomicU64::new(0),
            series: Mutex::new(BTreeMap::new()),
        }
    }

    fn record_scalar(&self, name: &str, kind: MetricKind, tags: &Tags, value: f64) {
        let name = sanitize_name(name);
        let key: Vec<(String, String)> = tags.iter().map(|(k, v)| (k.clone(), v.clone())).collect();
        self.series.lock().entry(name).or_default().insert(
            key,
            Series {
                kind,
                tags: tags.clone(),
                entry: Entry::Scalar(value),
            },
        );
    }

    fn record_histogram(&self, name: &str, tags: &Tags, sum: f64, count: u64, buckets: Vec<(f64, u64)>) {
        let name = sanitize_name(name);
        let key: Vec<(String, String)> = tags.iter().map(|(k, v)| (k.clone(), v.clone())).collect();
        self.series.lock().entry(name).or_default().insert(
            key,
            Series {
                kind: MetricKind::Histogram,
                tags: tags.clone(),
                entry: Entry::Histogram { sum, count, buckets },
            },
        );
    }

    /// Renders every tracked series as Prometheus text-format 0.0.4
    /// (`text/plain; version=0.0.4`).
    #[must_use]
    pub fn scrape(&self) -> String {
        let series = self.series.lock();
        let mut out = String::new();
        for (name, by_tags) in series.iter() {
            let Some(first) = by_tags.values().next() else {
                continue;
            };
            let (type_name, suffix) = prom_type_and_suffix(first.kind);
            out.push_str(&format!("# TYPE {name}{suffix} {type_name}\n"));
            for series in by_tags.values() {
                let label_str = Self::render_labels(&series.tags);
                match &series.entry {
                    Entry::Scalar(value) => {
                        out.push_str(&format!("{name}{suffix}{label_str} {value}\n"));
                    }
                    Entry::Histogram { sum, count, buckets } => {
                        out.push_str(&format!("{name}_sum{label_str} {sum}\n"));
                        out.push_str(&format!("{name}_count{label_str} {count}\n"));
                        let mut cumulative = 0u64;
                        for (bound, bucket_count) in buckets {
                            cumulative += bucket_count;
                            let bound_str = if bound.is_infinite() {
                                "+Inf".to_string()
                            } else {
                                bound.to_string()
                            };
                            out.push_str(&format!(
                                "{name}_bucket{} {cumulative}\n",
                                Self::render_labels_with(&series.tags, "le", &bound_str)
                            ));
                        }
                    }
                }
            }
        }
        out
    }

    fn render_labels(tags: &Tags) -> String {
        if tags.is_empty() {
            return String::new();
        }
        let body = tags
            .iter()
            .map(|(k, v)| format!("{k}=\"{}\"", escape_label_value(v)))
            .collect::<Vec<_>>()
            .join(",");
        format!("{{{body}}}")
    }

    fn render_labels_with(tags: &Tags, extra_key: &str, extra_value: &str) -> String {
        let mut body = tags
            .iter()
            .map(|(k, v)| format!("{k}=\"{}\"", escape_label_value(v)))
            .collect::<Vec<_>>();
        body.push(format!("{extra_key}=\"{extra_value}\""));
        format!("{{{}}}", body.join(","))
    }
}

impl Default for PrometheusExporter {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Exporter for PrometheusExporter {
    async fn export(&self, sample: &MetricSample) -> Result<(), ExportError> {
        if !self.active.load(Ordering::Acquire) {
            return Err(ExportError::ExporterClosed);
        }
        self.record_scalar(&sample.name, sample.kind, &sample.tags, sample.value);
        self.success_count.fetch_add(1, Ordering::Relaxed);
        Ok(())
    }

    async fn export_aggregated(&self, aggregates: &[Aggregated]) -> Result<(), ExportError> {
        if !self.active.load(Ordering::Acquire) {
            return Err(ExportError::ExporterClosed);
        }
        for aggregate in aggregates {
            match &aggregate.snapshot {
                Snapshot::Counter(snap) => {
                    self.record_scalar(&aggregate.name, MetricKind::Counter, &aggregate.tags, snap.sum);
                }
                Snapshot::BasicStats(snap) => {
                    self.record_scalar(&aggregate.name, MetricKind::Gauge, &aggregate.tags, snap.mean);
                }
                Snapshot::Histogram(snap) => {
                    self.record_histogram(
                        &aggregate.name,
                        &aggregate.tags,
                        snap.stats.counter.sum,
                        snap.stats.counter.count,
                        snap.buckets.clone(),
                    );
                }
                Snapshot::Decay(snap) => {
                    self.record_scalar(&aggregate.name, MetricKind::Gauge, &aggregate.tags, snap.ewma);
                }
            }
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
            queue_depth: self.series.lock().len(),
            ..ExporterStatus::default()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn scrape_emits_type_line_then_dedupes_latest_value() {
        let exporter = PrometheusExporter::new();
        exporter
            .export(&MetricSample::new("api.requests", MetricKind::Counter, 1.0))
            .await
            .unwrap();
        exporter
            .export(&MetricSample::new("api.requests", MetricKind::Counter, 2.0))
            .await
            .unwrap();
        let text = exporter.scrape();
        assert_eq!(
            text,
            "# TYPE api_requests_total counter\napi_requests_total 2\n"
        );
    }

    #[tokio::test]
    async fn labels_are_escaped_and_sorted() {
        let exporter = PrometheusExporter::new();
        let sample = MetricSample::new("latency", MetricKind::Gauge, 12.5)
            .with_tag("path", "/a\"b")
            .with_tag("env", "prod");
        exporter.export(&sample).await.unwrap();
        let text = exporter.scrape();
        assert!(text.contains(r#"latency{env="prod",path="/a\"b"} 12.5"#));
    }

    #[tokio::test]
    async fn histogram_aggregate_emits_sum_count_and_buckets() {
        use pipelinekit_metrics::{BasicStatsSnapshot, CounterSnapshot, HistogramSnapshot, Percentiles};

        let exporter = PrometheusExporter::new();
        let snapshot = HistogramSnapshot {
            stats: BasicStatsSnapshot {
                counter: CounterSnapshot {
                    count: 3,
                    sum: 30.0,
                    first_value: Some(5.0),
                    last_value: 15.0,
                    first_ts: Some(0.0),
                    last_ts: 2.0,
                    rate: 5.0,
                },
                min: 5.0,
                max: 15.0,
                mean: 10.0,
            },
            buckets: vec![(10.0, 1), (20.0, 2), (f64::INFINITY, 0)],
            percentiles: Percentiles {
                p50: 10.0,
                p90: 15.0,
                p95: 15.0,
                p99: 15.0,
                p999: 15.0,
            },
        };
        exporter
            .export_aggregated(&[Aggregated {
                name: "req.latency".to_string(),
                tags: Tags::new(),
                timestamp: chrono::Utc::now(),
                snapshot: Snapshot::Histogram(snapshot),
            }])
            .await
            .unwrap();
        let text = exporter.scrape();
        assert!(text.contains("req_latency_sum 30\n"));
        assert!(text.contains("req_latency_count 3\n"));
        assert!(text.contains("req_latency_bucket{le=\"10\"} 1\n"));
        assert!(text.contains("req_latency_bucket{le=\"+Inf\"} 3\n"));
    }
}
