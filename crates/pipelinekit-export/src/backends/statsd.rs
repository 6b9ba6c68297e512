//! StatsD / DogStatsD line-protocol encoding over an abstract [`Transport`].

use super::transport::Transport;
use crate::aggregated::Aggregated;
use crate::error::ExportError;
use crate::exporter::Exporter;
use crate::status::ExporterStatus;
use async_trait::async_trait;
use parking_lot::Mutex;
use pipelinekit_metrics::{MetricKind, MetricSample, Snapshot, Tags};
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;

/// Which dialect of the StatsD line protocol to emit. `DogStatsd` and
/// `Vanilla` only differ in whether `|#tag=value,...` is appended — vanilla
/// StatsD servers don't understand tags.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StatsdFormat {
    /// No tag segment emitted, even if tags are present on the sample.
    Vanilla,
    /// `|#tag=value,...` appended when tags are non-empty (Datadog's
    /// extension, also understood by most modern StatsD-compatible agents).
    DogStatsd,
}

/// Default UDP packet size budget (bytes) before a batch is split across
/// multiple packets; chosen to stay under common MTUs with headroom.
pub const DEFAULT_MAX_PACKET_SIZE: usize = 1432;

/// Characters StatsD's line format reserves; any of these appearing in a
/// metric name are replaced with `_` before emission.
const RESERVED: [char; 5] = [':', '|', '@', '#', ' '];

/// Replaces StatsD-reserved characters in a metric name with `_`.
#[must_use]
pub fn sanitize_name(name: &str) -> String {
    name.chars()
        .map(|c| if RESERVED.contains(&c) { '_' } else { c })
        .collect()
}

fn deserialize_packet_size<'de, D>(deserializer: D) -> Result<usize, D::Error>
where
    D: serde::Deserializer<'de>,
{
    pipelinekit_config::byte_size::deserialize(deserializer).map(|n| n as usize)
}

fn type_char(kind: MetricKind) -> &'static str {
    match kind {
        MetricKind::Counter => "c",
        MetricKind::Gauge => "g",
        MetricKind::Timer => "ms",
        MetricKind::Histogram => "h",
    }
}

/// Tunables for [`StatsdExporter`].
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StatsdConfig {
    /// Dialect to emit.
    pub format: StatsdFormat,
    /// Prepended to every metric name (before sanitization), e.g. `"app."`.
    pub prefix: Option<String>,
    /// Tags merged into every sample's own tags (sample tags win on key
    /// collision).
    pub global_tags: Tags,
    /// Sample rate this exporter applies to every line, annotated as `@r`
    /// when less than 1.0. This is independent of
    /// [`crate::sampling::SamplingWrapper`], which decides *whether* a
    /// sample reaches the exporter at all; this only controls the wire
    /// annotation.
    pub sample_rate: f64,
    /// Maximum UDP payload size; lines are packed greedily up to this many
    /// bytes per packet.
    #[serde(deserialize_with = "deserialize_packet_size")]
    pub max_packet_size: usize,
}

impl Default for StatsdConfig {
    fn default() -> Self {
        Self {
            format: StatsdFormat::DogStatsd,
            prefix: None,
            global_tags: Tags::new(),
            sample_rate: 1.0,
            max_packet_size: DEFAULT_MAX_PACKET_SIZE,
        }
    }
}

impl StatsdConfig {
    fn encode_line(&self, sample: &MetricSample) -> String {
        let mut name = sanitize_name(&sample.name);
        if let Some(prefix) = &self.prefix {
            let prefix = sanitize_name(prefix);
            name = match prefix.as_str() {
                "" => name,
                p if p.ends_with('.') => format!("{p}{name}"),
                p => format!("{p}.{name}"),
            };
        }
        let mut line = format!("{name}:{}|{}", sample.value, type_char(sample.kind));
        if self.sample_rate < 1.0 {
            line.push_str(&format!("|@{}", self.sample_rate));
        }
        if self.format == StatsdFormat::DogStatsd {
            let mut merged: Tags = self.global_tags.clone();
            for (k, v) in &sample.tags {
                merged.insert(k.clone(), v.clone());
            }
            if !merged.is_empty() {
                let tags = merged
                    .iter()
                    .map(|(k, v)| format!("{k}={v}"))
                    .collect::<Vec<_>>()
                    .join(",");
                line.push_str(&format!("|#{tags}"));
            }
        }
        line
    }

    /// Projects an aggregated snapshot down to one or two representative
    /// lines: the StatsD wire format has no notion of a multi-statistic
    /// bundle, so `BasicStats`/`Histogram`/`ExponentialDecay` snapshots emit
    /// their central tendency as a gauge and their sample count as a
    /// counter.
    fn encode_aggregated(&self, aggregate: &Aggregated) -> Vec<String> {
        let base = MetricSample {
            name: aggregate.name.clone(),
            kind: MetricKind::Gauge,
            value: 0.0,
            timestamp: aggregate.timestamp,
            tags: aggregate.tags.clone(),
            unit: None,
        };
        match &aggregate.snapshot {
            Snapshot::Counter(snap) => {
                vec![self.encode_line(&MetricSample {
                    kind: MetricKind::Counter,
                    value: snap.sum,
                    ..base
                })]
            }
            Snapshot::BasicStats(snap) => vec![
                self.encode_line(&MetricSample {
                    value: snap.mean,
                    ..base.clone()
                }),
                self.encode_line(&MetricSample {
                    name: format!("{}.count", base.name),
                    kind: MetricKind::Counter,
                    value: snap.counter.count as f64,
                    ..base
                }),
            ],
            Snapshot::Histogram(snap) => vec![
                self.encode_line(&MetricSample {
                    value: snap.stats.mean,
                    ..base.clone()
                }),
                self.encode_line(&MetricSample {
                    name: format!("{}.count", base.name),
                    kind: MetricKind::Counter,
                    value: snap.stats.counter.count as f64,
                    ..base
                }),
            ],
            Snapshot::Decay(snap) => vec![self.encode_line(&MetricSample {
                value: snap.ewma,
                ..base
            })],
        }
    }
}

fn pack_lines(lines: Vec<String>, max_packet_size: usize) -> Vec<Vec<u8>> {
    let mut packets = Vec::new();
    let mut current = String::new();
    for line in lines {
        let additional = if current.is_empty() {
            line.len()
        } else {
            line.len() + 1
        };
        if !current.is_empty() && current.len() + additional > max_packet_size {
            packets.push(std::mem::take(&mut current).into_bytes());
        }
        if !current.is_empty() {
            current.push('\n');
        }
        current.push_str(&line);
    }
    if !current.is_empty() {
        packets.push(current.into_bytes());
    }
    packets
}

/// Forwards `MetricSample`s as StatsD/DogStatsD UDP lines.
pub struct StatsdExporter {
    config: StatsdConfig,
    transport: Arc<dyn Transport>,
    error_handler: Option<Arc<dyn Fn(&ExportError) + Send + Sync>>,
    active: AtomicBool,
    success_count: AtomicU64,
    failure_count: AtomicU64,
    last_error: Mutex<Option<String>>,
}

impl StatsdExporter {
    /// Builds an exporter over `transport` (typically a
    /// [`super::transport::UdpTransport`]).
    #[must_use]
    pub fn new(config: StatsdConfig, transport: Arc<dyn Transport>) -> Self {
        Self {
            config,
            transport,
            error_handler: None,
            active: AtomicBool::new(true),
            success_count: AtomicU64::new(0),
            failure_count: AtomicU64::new(0),
            last_error: Mutex::new(None),
        }
    }

    /// Registers a callback invoked whenever a send fails.
    #[must_use]
    pub fn with_error_handler(mut self, handler: Arc<dyn Fn(&ExportError) + Send + Sync>) -> Self {
        self.error_handler = Some(handler);
        self
    }

    async fn send_lines(&self, lines: Vec<String>) -> Result<(), ExportError> {
        if !self.active.load(Ordering::Acquire) {
            return Err(ExportError::ExporterClosed);
        }
        let packets = pack_lines(lines, self.config.max_packet_size);
        let result = self
            .transport
            .send_batch(&packets)
            .await
            .map_err(|e| ExportError::SendFailed(e.to_string()));
        match &result {
            Ok(()) => {
                self.success_count.fetch_add(1, Ordering::Relaxed);
            }
            Err(err) => {
                self.failure_count.fetch_add(1, Ordering::Relaxed);
                *self.last_error.lock() = Some(err.to_string());
                if let Some(handler) = &self.error_handler {
                    handler(err);
                }
            }
        }
        result
    }
}

#[async_trait]
impl Exporter for StatsdExporter {
    async fn export(&self, sample: &MetricSample) -> Result<(), ExportError> {
        self.send_lines(vec![self.config.encode_line(sample)]).await
    }

    async fn export_batch(&self, samples: &[MetricSample]) -> Result<(), ExportError> {
        let lines = samples.iter().map(|s| self.config.encode_line(s)).collect();
        self.send_lines(lines).await
    }

    async fn export_aggregated(&self, aggregates: &[Aggregated]) -> Result<(), ExportError> {
        let lines = aggregates
            .iter()
            .flat_map(|a| self.config.encode_aggregated(a))
            .collect();
        self.send_lines(lines).await
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
            failure_count: self.failure_count.load(Ordering::Relaxed),
            last_error: self.last_error.lock().clone(),
            ..ExporterStatus::default()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backends::transport::MockTransport;
    use pipelinekit_metrics::MetricKind;

    fn sample(name: &str, value: f64) -> MetricSample {
        MetricSample::new(name, MetricKind::Counter, value)
    }

    #[test]
    fn sanitizes_reserved_characters() {
        assert_eq!(sanitize_name("api:calls|total"), "api_calls_total");
        assert_eq!(sanitize_name("has space"), "has_space");
    }

    #[test]
    fn packs_lines_under_the_packet_budget() {
        let lines = vec!["a".repeat(10), "b".repeat(10), "c".repeat(10)];
        let packets = pack_lines(lines, 15);
        assert_eq!(packets.len(), 3);
    }

    #[tokio::test]
    async fn emits_dogstatsd_line_with_sorted_tags() {
        let transport = Arc::new(MockTransport::new());
        let exporter = StatsdExporter::new(
            StatsdConfig {
                format: StatsdFormat::DogStatsd,
                prefix: Some("app".to_string()),
                ..StatsdConfig::default()
            },
            transport.clone(),
        );
        let sample = sample("requests", 3.0)
            .with_tag("zone", "b")
            .with_tag("env", "prod");
        exporter.export(&sample).await.unwrap();
        let lines = transport.sent_lines();
        assert_eq!(lines.len(), 1);
        assert_eq!(lines[0], "app.requests:3|c|#env=prod,zone=b");
    }

    #[tokio::test]
    async fn prefix_without_trailing_dot_still_gets_a_separator() {
        let transport = Arc::new(MockTransport::new());
        let exporter = StatsdExporter::new(
            StatsdConfig {
                format: StatsdFormat::DogStatsd,
                prefix: Some("myapp".to_string()),
                ..StatsdConfig::default()
            },
            transport.clone(),
        );
        let sample = sample("api.requests", 5.0)
            .with_tag("endpoint", "/x")
            .with_tag("env", "prod");
        exporter.export(&sample).await.unwrap();
        let lines = transport.sent_lines();
        assert_eq!(lines.len(), 1);
        assert_eq!(lines[0], "myapp.api.requests:5|c|#endpoint=/x,env=prod");
    }

    #[tokio::test]
    async fn prefix_with_trailing_dot_is_not_doubled() {
        let transport = Arc::new(MockTransport::new());
        let exporter = StatsdExporter::new(
            StatsdConfig {
                format: StatsdFormat::Vanilla,
                prefix: Some("myapp.".to_string()),
                ..StatsdConfig::default()
            },
            transport.clone(),
        );
        exporter
            .export(&sample("api.requests", 5.0))
            .await
            .unwrap();
        assert_eq!(transport.sent_lines()[0], "myapp.api.requests:5|c");
    }

    #[tokio::test]
    async fn vanilla_format_omits_tags() {
        let transport = Arc::new(MockTransport::new());
        let exporter = StatsdExporter::new(
            StatsdConfig {
                format: StatsdFormat::Vanilla,
                ..StatsdConfig::default()
            },
            transport.clone(),
        );
        exporter
            .export(&sample("requests", 3.0).with_tag("env", "prod"))
            .await
            .unwrap();
        assert_eq!(transport.sent_lines()[0], "requests:3|c");
    }

    #[tokio::test]
    async fn sub_unity_sample_rate_is_annotated() {
        let transport = Arc::new(MockTransport::new());
        let exporter = StatsdExporter::new(
            StatsdConfig {
                sample_rate: 0.1,
                format: StatsdFormat::Vanilla,
                ..StatsdConfig::default()
            },
            transport.clone(),
        );
        exporter.export(&sample("requests", 3.0)).await.unwrap();
        assert_eq!(transport.sent_lines()[0], "requests:3|c|@0.1");
    }

    #[tokio::test]
    async fn shutdown_then_export_returns_closed() {
        let exporter = StatsdExporter::new(StatsdConfig::default(), Arc::new(MockTransport::new()));
        exporter.shutdown().await.unwrap();
        let err = exporter.export(&sample("requests", 1.0)).await.unwrap_err();
        assert!(matches!(err, ExportError::ExporterClosed));
    }
}
