//! Buffers samples and flushes them as batches, either when the buffer fills
//! or on a timer.

use crate::aggregated::Aggregated;
use crate::error::ExportError;
use crate::exporter::Exporter;
use crate::status::ExporterStatus;
use async_trait::async_trait;
use pipelinekit_metrics::MetricSample;
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{Mutex as AsyncMutex, Notify};
use tokio::task::JoinHandle;

/// What happens to an incoming sample once the buffer is already at
/// `buffer_capacity`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OverflowPolicy {
    /// The caller's `export` suspends until buffered space frees up.
    Block,
    /// The oldest buffered sample is evicted to make room for the new one.
    DropOldest,
    /// The new sample is discarded; the buffer is left untouched.
    DropNewest,
}

/// Tunables for [`BatchingWrapper`].
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct BatchingConfig {
    /// Flush as soon as the buffer reaches this many samples.
    pub max_batch_size: usize,
    /// Flush unconditionally on this interval even if `max_batch_size`
    /// hasn't been reached.
    #[serde(with = "humantime_serde")]
    pub flush_interval: Duration,
    /// Hard cap on buffered-but-unflushed samples.
    pub buffer_capacity: usize,
    /// What to do when a sample arrives and the buffer is already full.
    pub overflow: OverflowPolicy,
}

impl Default for BatchingConfig {
    fn default() -> Self {
        Self {
            max_batch_size: 100,
            flush_interval: Duration::from_secs(10),
            buffer_capacity: 10_000,
            overflow: OverflowPolicy::DropOldest,
        }
    }
}

struct Inner {
    target: Arc<dyn Exporter>,
    config: BatchingConfig,
    buffer: AsyncMutex<VecDeque<MetricSample>>,
    queue_depth: AtomicUsize,
    notify_space: Notify,
    active: AtomicBool,
    success_count: AtomicU64,
    failure_count: AtomicU64,
    dropped_count: AtomicU64,
}

impl Inner {
    async fn flush_now(&self) -> Result<(), ExportError> {
        let batch: Vec<MetricSample> = {
            let mut buf = self.buffer.lock().await;
            let drained = buf.drain(..).collect();
            self.queue_depth.store(buf.len(), Ordering::Release);
            drained
        };
        self.notify_space.notify_waiters();
        if batch.is_empty() {
            return Ok(());
        }
        match self.target.export_batch(&batch).await {
            Ok(()) => {
                self.success_count.fetch_add(batch.len() as u64, Ordering::Relaxed);
                Ok(())
            }
            Err(err) => {
                self.failure_count.fetch_add(batch.len() as u64, Ordering::Relaxed);
                Err(err)
            }
        }
    }

    async fn push(&self, sample: MetricSample) -> Result<(), ExportError> {
        if !self.active.load(Ordering::Acquire) {
            return Err(ExportError::ExporterClosed);
        }
        let mut sample = sample;
        loop {
            let mut buf = self.buffer.lock().await;
            if buf.len() < self.config.buffer_capacity {
                buf.push_back(sample);
                let should_flush = buf.len() >= self.config.max_batch_size;
                self.queue_depth.store(buf.len(), Ordering::Release);
                drop(buf);
                if should_flush {
                    self.flush_now().await?;
                }
                return Ok(());
            }
            match self.config.overflow {
                OverflowPolicy::DropNewest => {
                    self.dropped_count.fetch_add(1, Ordering::Relaxed);
                    return Ok(());
                }
                OverflowPolicy::DropOldest => {
                    buf.pop_front();
                    buf.push_back(sample);
                    self.dropped_count.fetch_add(1, Ordering::Relaxed);
                    self.queue_depth.store(buf.len(), Ordering::Release);
                    return Ok(());
                }
                OverflowPolicy::Block => {
                    drop(buf);
                    self.notify_space.notified().await;
                    // retry with the same sample once space (hopefully) exists
                }
            }
        }
    }
}

/// Wraps an [`Exporter`], buffering individual `export` calls and forwarding
/// them as batches via the target's `export_batch`, triggered by either
/// buffer size or a wall-clock timer.
pub struct BatchingWrapper {
    inner: Arc<Inner>,
    ticker: JoinHandle<()>,
}

impl BatchingWrapper {
    /// Wraps `target`, spawning the background flush-interval ticker.
    #[must_use]
    pub fn new(target: Arc<dyn Exporter>, config: BatchingConfig) -> Self {
        let inner = Arc::new(Inner {
            target,
            config,
            buffer: AsyncMutex::new(VecDeque::new()),
            queue_depth: AtomicUsize::new(0),
            notify_space: Notify::new(),
            active: AtomicBool::new(true),
            success_count: AtomicU64::new(0),
            failure_count: AtomicU64::new(0),
            dropped_count: AtomicU64::new(0),
        });
        let ticker_inner = Arc::clone(&inner);
        let ticker = tokio::spawn(async move {
            let mut interval = tokio::time::interval(ticker_inner.config.flush_interval);
            interval.tick().await; // first tick fires immediately; skip it
            loop {
                interval.tick().await;
                if !ticker_inner.active.load(Ordering::Acquire) {
                    return;
                }
                if let Err(err) = ticker_inner.flush_now().await {
                    tracing::warn!(%err, "scheduled batch flush failed");
                }
            }
        });
        Self { inner, ticker }
    }

    /// Samples dropped so far due to `OverflowPolicy::DropOldest` or
    /// `DropNewest`.
    #[must_use]
    pub fn dropped_count(&self) -> u64 {
        self.inner.dropped_count.load(Ordering::Relaxed)
    }
}

#[async_trait]
impl Exporter for BatchingWrapper {
    async fn export(&self, sample: &MetricSample) -> Result<(), ExportError> {
        self.inner.push(sample.clone()).await
    }

    async fn export_batch(&self, samples: &[MetricSample]) -> Result<(), ExportError> {
        for sample in samples {
            self.inner.push(sample.clone()).await?;
        }
        Ok(())
    }

    async fn export_aggregated(&self, aggregates: &[Aggregated]) -> Result<(), ExportError> {
        // Aggregates already arrive pre-batched by the aggregation wrapper
        // upstream; re-buffering them here would only add latency, so they
        // pass straight through to the target.
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
        status.queue_depth = self.inner.queue_depth.load(Ordering::Acquire);
        status.success_count = self.inner.success_count.load(Ordering::Relaxed);
        status.failure_count = self.inner.failure_count.load(Ordering::Relaxed);
        status
    }
}

impl Drop for BatchingWrapper {
    fn drop(&mut self) {
        self.ticker.abort();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backends::null::NullExporter;
    use pipelinekit_metrics::MetricKind;
    use std::sync::atomic::AtomicUsize as StdAtomicUsize;

    struct CountingExporter {
        batches: StdAtomicUsize,
        samples: StdAtomicUsize,
    }

    #[async_trait]
    impl Exporter for CountingExporter {
        async fn export(&self, _sample: &MetricSample) -> Result<(), ExportError> {
            self.samples.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }
        async fn export_batch(&self, samples: &[MetricSample]) -> Result<(), ExportError> {
            self.batches.fetch_add(1, Ordering::SeqCst);
            self.samples.fetch_add(samples.len(), Ordering::SeqCst);
            Ok(())
        }
        async fn export_aggregated(&self, _aggregates: &[Aggregated]) -> Result<(), ExportError> {
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
    async fn flushes_automatically_once_max_batch_size_is_reached() {
        let target = Arc::new(CountingExporter {
            batches: StdAtomicUsize::new(0),
            samples: StdAtomicUsize::new(0),
        });
        let wrapper = BatchingWrapper::new(
            target.clone(),
            BatchingConfig {
                max_batch_size: 3,
                flush_interval: Duration::from_secs(3600),
                ..BatchingConfig::default()
            },
        );
        for i in 0..3 {
            wrapper
                .export(&MetricSample::new(format!("m{i}"), MetricKind::Counter, 1.0))
                .await
                .unwrap();
        }
        assert_eq!(target.batches.load(Ordering::SeqCst), 1);
        assert_eq!(target.samples.load(Ordering::SeqCst), 3);
        wrapper.shutdown().await.unwrap();
    }

    #[tokio::test]
    async fn drop_newest_discards_without_growing_the_buffer() {
        let wrapper = BatchingWrapper::new(
            Arc::new(NullExporter::new()),
            BatchingConfig {
                max_batch_size: 1000,
                flush_interval: Duration::from_secs(3600),
                buffer_capacity: 2,
                overflow: OverflowPolicy::DropNewest,
            },
        );
        for i in 0..5 {
            wrapper
                .export(&MetricSample::new(format!("m{i}"), MetricKind::Gauge, 1.0))
                .await
                .unwrap();
        }
        assert_eq!(wrapper.dropped_count(), 3);
        assert_eq!(wrapper.status().queue_depth, 2);
        wrapper.shutdown().await.unwrap();
    }

    #[tokio::test]
    async fn shutdown_is_idempotent_and_flushes_best_effort() {
        let target = Arc::new(CountingExporter {
            batches: StdAtomicUsize::new(0),
            samples: StdAtomicUsize::new(0),
        });
        let wrapper = BatchingWrapper::new(target.clone(), BatchingConfig::default());
        wrapper
            .export(&MetricSample::new("m", MetricKind::Counter, 1.0))
            .await
            .unwrap();
        wrapper.shutdown().await.unwrap();
        wrapper.shutdown().await.unwrap();
        assert_eq!(target.samples.load(Ordering::SeqCst), 1);
        let err = wrapper
            .export(&MetricSample::new("m", MetricKind::Counter, 1.0))
            .await
            .unwrap_err();
        assert!(matches!(err, ExportError::ExporterClosed));
    }
}
