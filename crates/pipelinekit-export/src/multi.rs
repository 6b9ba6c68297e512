//! Fan-out to N underlying exporters in parallel.

use crate::aggregated::Aggregated;
use crate::circuit_breaker::{BreakerConfig, CircuitBreaker};
use crate::error::{ExportError, FanOutError};
use crate::exporter::Exporter;
use crate::status::ExporterStatus;
use async_trait::async_trait;
use parking_lot::Mutex;
use pipelinekit_metrics::MetricSample;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;

struct Member {
    label: String,
    exporter: Arc<dyn Exporter>,
    breaker: Mutex<CircuitBreaker>,
}

/// Fans a single batch out to every member exporter concurrently. A failure
/// in one member is collected and reported in an aggregate [`FanOutError`]
/// without preventing the others from receiving the batch. Each member has
/// its own [`CircuitBreaker`]: a member tripped open is skipped entirely
/// (not even attempted) until its timeout elapses.
pub struct MultiExporter {
    members: Vec<Member>,
    active: AtomicBool,
    success_count: AtomicU64,
    failure_count: AtomicU64,
}

impl MultiExporter {
    /// Builds a fan-out over `members`, each given a label (used in
    /// [`FanOutError`] and logs) and its own breaker configuration.
    #[must_use]
    pub fn new(members: Vec<(String, Arc<dyn Exporter>)>, breaker_config: BreakerConfig) -> Self {
        Self {
            members: members
                .into_iter()
                .map(|(label, exporter)| Member {
                    label,
                    exporter,
                    breaker: Mutex::new(CircuitBreaker::new(breaker_config)),
                })
                .collect(),
            active: AtomicBool::new(true),
            success_count: AtomicU64::new(0),
            failure_count: AtomicU64::new(0),
        }
    }

    async fn fan_out<F, Fut>(&self, call: F) -> Result<(), ExportError>
    where
        F: Fn(Arc<dyn Exporter>) -> Fut,
        Fut: std::future::Future<Output = Result<(), ExportError>> + Send + 'static,
    {
        if !self.active.load(Ordering::Acquire) {
            return Err(ExportError::ExporterClosed);
        }
        let mut failures = Vec::new();
        let mut tasks = tokio::task::JoinSet::new();
        for (index, member) in self.members.iter().enumerate() {
            if !member.breaker.lock().should_attempt() {
                failures.push((
                    member.label.clone(),
                    ExportError::ConnectionFailed("circuit breaker open".to_string()),
                ));
                continue;
            }
            let fut = call(Arc::clone(&member.exporter));
            tasks.spawn(async move { (index, fut.await) });
        }
        while let Some(joined) = tasks.join_next().await {
            let Ok((index, result)) = joined else {
                tracing::error!("exporter fan-out task panicked");
                continue;
            };
            let member = &self.members[index];
            match result {
                Ok(()) => {
                    member.breaker.lock().record_success();
                    self.success_count.fetch_add(1, Ordering::Relaxed);
                }
                Err(err) => {
                    member.breaker.lock().record_failure();
                    self.failure_count.fetch_add(1, Ordering::Relaxed);
                    failures.push((member.label.clone(), err));
                }
            }
        }
        if failures.is_empty() {
            Ok(())
        } else {
            let total = self.members.len();
            Err(ExportError::SendFailed(
                FanOutError { total, failures }.to_string(),
            ))
        }
    }
}

#[async_trait]
impl Exporter for MultiExporter {
    async fn export(&self, sample: &MetricSample) -> Result<(), ExportError> {
        self.fan_out(|exporter| {
            let sample = sample.clone();
            async move { exporter.export(&sample).await }
        })
        .await
    }

    async fn export_batch(&self, samples: &[MetricSample]) -> Result<(), ExportError> {
        self.fan_out(|exporter| {
            let samples = samples.to_vec();
            async move { exporter.export_batch(&samples).await }
        })
        .await
    }

    async fn export_aggregated(&self, aggregates: &[Aggregated]) -> Result<(), ExportError> {
        self.fan_out(|exporter| {
            let aggregates = aggregates.to_vec();
            async move { exporter.export_aggregated(&aggregates).await }
        })
        .await
    }

    async fn flush(&self) -> Result<(), ExportError> {
        self.fan_out(|exporter| async move { exporter.flush().await })
            .await
    }

    async fn shutdown(&self) -> Result<(), ExportError> {
        self.active.store(false, Ordering::Release);
        let mut failures = Vec::new();
        for member in &self.members {
            if let Err(err) = member.exporter.shutdown().await {
                failures.push((member.label.clone(), err));
            }
        }
        if failures.is_empty() {
            Ok(())
        } else {
            Err(ExportError::SendFailed(
                FanOutError {
                    total: self.members.len(),
                    failures,
                }
                .to_string(),
            ))
        }
    }

    fn status(&self) -> ExporterStatus {
        ExporterStatus {
            active: self.active.load(Ordering::Acquire),
            queue_depth: self.members.iter().map(|m| m.exporter.status().queue_depth).sum(),
            success_count: self.success_count.load(Ordering::Relaxed),
            failure_count: self.failure_count.load(Ordering::Relaxed),
            last_export_ts: self
                .members
                .iter()
                .filter_map(|m| m.exporter.status().last_export_ts)
                .max(),
            last_error: self.members.iter().find_map(|m| m.exporter.status().last_error),
        }
    }
}
