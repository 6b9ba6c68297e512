//! Pre-aggregates same-key samples in a bounded table keyed by `(name,
//! tag-set)`, emitting one [`Aggregated`] per key on flush instead of
//! forwarding every individual observation.

use crate::aggregated::Aggregated;
use crate::error::ExportError;
use crate::exporter::Exporter;
use crate::status::ExporterStatus;
use async_trait::async_trait;
use pipelinekit_config::AggregationWindow;
use pipelinekit_metrics::window::{AccumulatorTemplate, Window};
use pipelinekit_metrics::{MetricKind, MetricSample, Tags};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex as AsyncMutex;
use tokio::task::JoinHandle;

fn template_for(kind: MetricKind) -> AccumulatorTemplate {
    match kind {
        MetricKind::Counter => AccumulatorTemplate::Counter,
        MetricKind::Gauge | MetricKind::Timer => AccumulatorTemplate::BasicStats,
        MetricKind::Histogram => AccumulatorTemplate::Histogram,
    }
}

fn seconds_since_epoch(sample: &MetricSample) -> f64 {
    sample.timestamp.timestamp_millis() as f64 / 1000.0
}

/// Tunables for [`AggregationWrapper`].
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AggregationConfig {
    /// Rotation/decay policy applied to every tracked key.
    pub window: AggregationWindow,
    /// Hard cap on distinct `(name, tag-set)` keys tracked at once.
    pub max_keys: usize,
    /// How often buffered windows are flushed to the target on a timer.
    #[serde(with = "humantime_serde")]
    pub flush_interval: Duration,
}

impl Default for AggregationConfig {
    fn default() -> Self {
        Self {
            window: AggregationWindow::Fixed {
                duration: Duration::from_secs(10),
            },
            max_keys: 10_000,
            flush_interval: Duration::from_secs(10),
        }
    }
}

type Key = (String, Vec<(String, String)>);

struct Entry {
    tags: Tags,
    window: Window,
}

struct Inner {
    target: Arc<dyn Exporter>,
    config: AggregationConfig,
    table: AsyncMutex<HashMap<Key, Entry>>,
    active: AtomicBool,
    success_count: AtomicU64,
    failure_count: AtomicU64,
    dropped_count: AtomicU64,
}

impl Inner {
    fn insert_new(table: &mut HashMap<Key, Entry>, key: Key, sample: &MetricSample, window_cfg: &AggregationWindow) {
        let mut window = Window::new(window_cfg, template_for(sample.kind));
        window.record(sample.value, seconds_since_epoch(sample));
        table.insert(
            key,
            Entry {
                tags: sample.tags.clone(),
                window,
            },
        );
    }

    async fn record(&self, sample: &MetricSample) -> Result<(), ExportError> {
        if !self.active.load(Ordering::Acquire) {
            return Err(ExportError::ExporterClosed);
        }
        let key = sample.key();
        let mut table = self.table.lock().await;
        if let Some(entry) = table.get_mut(&key) {
            entry.window.record(sample.value, seconds_since_epoch(sample));
            return Ok(());
        }
        if table.len() < self.config.max_keys {
            Self::insert_new(&mut table, key, sample, &self.config.window);
            return Ok(());
        }
        // Table is full and this is a brand-new key: force a flush to make
        // room, then retry once.
        drop(table);
        self.flush_now().await?;
        let mut table = self.table.lock().await;
        if table.len() < self.config.max_keys {
            Self::insert_new(&mut table, key, sample, &self.config.window);
            return Ok(());
        }
        self.dropped_count.fetch_add(1, Ordering::Relaxed);
        Ok(())
    }

    async fn flush_now(&self) -> Result<(), ExportError> {
        let drained: Vec<(Key, Entry)> = {
            let mut table = self.table.lock().await;
            table.drain().collect()
        };
        if drained.is_empty() {
            return Ok(());
        }
        let now = chrono::Utc::now();
        let aggregates: Vec<Aggregated> = drained
            .into_iter()
            .map(|((name, _), mut entry)| Aggregated {
                name,
                tags: entry.tags,
                timestamp: now,
                snapshot: entry.window.rotate(),
            })
            .collect();
        match self.target.export_aggregated(&aggregates).await {
            Ok(()) => {
                self.success_count.fetch_add(aggregates.len() as u64, Ordering::Relaxed);
                Ok(())
            }
            Err(err) => {
                self.failure_count.fetch_add(aggregates.len() as u64, Ordering::Relaxed);
                Err(err)
            }
        }
    }
}

/// Wraps an [`Exporter`], pre-aggregating individual samples keyed by
/// `(name, tag-set)` and forwarding one [`Aggregated`] value per key on
/// flush rather than every raw observation.
pub struct AggregationWrapper {
    inner: Arc<Inner>,
    ticker: JoinHandle<()>,
}

impl AggregationWrapper {
    /// Wraps `target`, spawning the background flush-interval ticker.
    #[must_use]
    pub fn new(target: Arc<dyn Exporter>, config: AggregationConfig) -> Self {
        let inner = Arc::new(Inner {
            target,
            config,
            table: AsyncMutex::new(HashMap::new()),
            active: AtomicBool::new(true),
            success_count: AtomicU64::new(0),
            failure_count: AtomicU64::new(0),
            dropped_count: AtomicU64::new(0),
        });
        let ticker_inner = Arc::clone(&inner);
        let ticker = tokio::spawn(async move {
            let mut interval = tokio::time::interval(ticker_inner.config.flush_interval);
            interval.tick().await;
            loop {
                interval.tick().await;
                if !ticker_inner.active.load(Ordering::Acquire) {
                    return;
                }
                if let Err(err) = ticker_inner.flush_now().await {
                    tracing::warn!(%err, "scheduled aggregation flush failed");
                }
            }
        });
        Self { inner, ticker }
    }

    /// Samples dropped so far because a brand-new key arrived while the
    /// table was at `max_keys` and a forced flush still left no room.
    #[must_use]
    pub fn dropped_count(&self) -> u64 {
        self.inner.dropped_count.load(Ordering::Relaxed)
    }

    /// Number of distinct keys currently tracked.
    #[must_use]
    pub async fn tracked_keys(&self) -> usize {
        self.inner.table.lock().await.len()
    }
}

#[async_trait]
impl Exporter for AggregationWrapper {
    async fn export(&self, sample: &MetricSample) -> Result<(), ExportError> {
        self.inner.record(sample).await
    }

    async fn export_batch(&self, samples: &[MetricSample]) -> Result<(), ExportError> {
        for sample in samples {
            self.inner.record(sample).await?;
        }
        Ok(())
    }

    async fn export_aggregated(&self, aggregates: &[Aggregated]) -> Result<(), ExportError> {
        // Already aggregated upstream; re-aggregating would discard the
        // sender's own windowing decision, so pass straight through.
        self.inner.target.export_aggregated(aggregates).await
    }

    async fn flush(&self) -> Result<(), ExportError> {
        self.inner.flush_now().await?;
        self.inner.target.flush().await
    }

    async fn shutdown(&self) -> Result<(), ExportError> {
        if !self.inner.active.swap(false, Ordering::AcqRel) {
            return Ok(());
        }
        self.ticker.abort();
        let _ = self.inner.flush_now().await;
        self.inner.target.shutdown().await
    }

    fn status(&self) -> ExporterStatus {
        let mut status = self.inner.target.status();
        status.active = self.inner.active.load(Ordering::Acquire);
        status.success_count = self.inner.success_count.load(Ordering::Relaxed);
        status.failure_count = self.inner.failure_count.load(Ordering::Relaxed);
        status
    }
}

impl Drop for AggregationWrapper {
    fn drop(&mut self) {
        self.ticker.abort();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backends::null::NullExporter;
    use pipelinekit_metrics::Snapshot;
    use std::sync::Mutex as StdMutex;

    struct CapturingExporter {
        captured: StdMutex<Vec<Aggregated>>,
    }

    #[async_trait]
    impl Exporter for CapturingExporter {
        async fn export(&self, _sample: &MetricSample) -> Result<(), ExportError> {
            Ok(())
        }
        async fn export_aggregated(&self, aggregates: &[Aggregated]) -> Result<(), ExportError> {
            self.captured.lock().unwrap().extend_from_slice(aggregates);
            Ok(())
        }
        async fn flush(&self) -> Result<(), ExportError> {
            Ok(())
        }
        async fn shutdown(&self) -> Result<(), ExportError> {
            Ok(())
        }
        fn status(&self) -> ExporterStatus {
            ExporterStatus::default()
        }
    }

    #[tokio::test]
    async fn repeated_samples_for_one_key_collapse_into_a_single_aggregate() {
        let target = Arc::new(CapturingExporter {
            captured: StdMutex::new(Vec::new()),
        });
        let wrapper = AggregationWrapper::new(
            target.clone(),
            AggregationConfig {
                flush_interval: Duration::from_secs(3600),
                ..AggregationConfig::default()
            },
        );
        for v in [10.0, 20.0, 30.0] {
            wrapper
                .export(&MetricSample::new("latency", MetricKind::Gauge, v))
                .await
                .unwrap();
        }
        wrapper.flush().await.unwrap();
        let captured = target.captured.lock().unwrap();
        assert_eq!(captured.len(), 1);
        let Snapshot::BasicStats(snap) = &captured[0].snapshot else {
            panic!("expected BasicStats snapshot");
        };
        assert_eq!(snap.counter.count, 3);
        assert_eq!(snap.mean, 20.0);
        wrapper.shutdown().await.unwrap();
    }

    #[tokio::test]
    async fn distinct_tag_sets_are_tracked_as_separate_keys() {
        let target = Arc::new(CapturingExporter {
            captured: StdMutex::new(Vec::new()),
        });
        let wrapper = AggregationWrapper::new(
            target.clone(),
            AggregationConfig {
                flush_interval: Duration::from_secs(3600),
                ..AggregationConfig::default()
            },
        );
        wrapper
            .export(&MetricSample::new("requests", MetricKind::Counter, 1.0).with_tag("region", "us"))
            .await
            .unwrap();
        wrapper
            .export(&MetricSample::new("requests", MetricKind::Counter, 1.0).with_tag("region", "eu"))
            .await
            .unwrap();
        assert_eq!(wrapper.tracked_keys().await, 2);
        wrapper.shutdown().await.unwrap();
    }

    #[tokio::test]
    async fn full_table_forces_a_flush_before_dropping_a_new_key() {
        let wrapper = AggregationWrapper::new(
            Arc::new(NullExporter::new()),
            AggregationConfig {
                max_keys: 1,
                flush_interval: Duration::from_secs(3600),
                ..AggregationConfig::default()
            },
        );
        wrapper
            .export(&MetricSample::new("a", MetricKind::Counter, 1.0))
            .await
            .unwrap();
        wrapper
            .export(&MetricSample::new("b", MetricKind::Counter, 1.0))
            .await
            .unwrap();
        // "a" was flushed out to make room, "b" took its place.
        assert_eq!(wrapper.tracked_keys().await, 1);
        assert_eq!(wrapper.dropped_count(), 0);
        wrapper.shutdown().await.unwrap();
    }
}
