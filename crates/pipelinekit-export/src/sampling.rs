//! Deterministic, restart-stable sampling.

use crate::aggregated::Aggregated;
use crate::error::ExportError;
use crate::exporter::Exporter;
use crate::status::ExporterStatus;
use async_trait::async_trait;
use pipelinekit_metrics::{MetricKind, MetricSample};
use std::sync::Arc;

/// Substrings that bypass sampling entirely regardless of `rate`, so an
/// error spike is never thinned out right when it matters.
pub const DEFAULT_CRITICAL_PATTERNS: &[&str] =
    &["error", "timeout", "failure", "fatal", "panic"];

/// The classic DJB2 string hash. Used (instead of a keyed/random hasher) so
/// the same metric name samples the same way across process restarts.
#[must_use]
pub fn djb2(s: &str) -> u64 {
    let mut hash: u64 = 5381;
    for byte in s.bytes() {
        hash = hash.wrapping_mul(33).wrapping_add(u64::from(byte));
    }
    hash
}

/// Whether `name` should be sampled in, at `rate` (`[0.0, 1.0]`), given the
/// deterministic hash bucketing and the critical-pattern bypass list.
#[must_use]
pub fn should_sample(name: &str, rate: f64, critical_patterns: &[&str]) -> bool {
    if rate >= 1.0 {
        return true;
    }
    if rate <= 0.0 {
        return false;
    }
    if critical_patterns
        .iter()
        .any(|pattern| name.contains(pattern))
    {
        return true;
    }
    let bucket = djb2(name) as f64 / u64::MAX as f64;
    bucket < rate
}

/// Wraps an exporter so that a configurable fraction of metrics (by name) are
/// dropped before reaching it. Counters that survive sampling have their
/// value scaled by `1 / rate` so the exporter's totals remain an unbiased
/// estimate of the true total.
pub struct SamplingWrapper {
    inner: Arc<dyn Exporter>,
    rate: f64,
    critical_patterns: Vec<String>,
}

impl SamplingWrapper {
    /// Wraps `inner`, sampling at `rate` with the default critical patterns.
    #[must_use]
    pub fn new(inner: Arc<dyn Exporter>, rate: f64) -> Self {
        Self::with_critical_patterns(
            inner,
            rate,
            DEFAULT_CRITICAL_PATTERNS.iter().map(|s| s.to_string()).collect(),
        )
    }

    /// Wraps `inner` with a caller-supplied critical-pattern bypass list.
    #[must_use]
    pub fn with_critical_patterns(
        inner: Arc<dyn Exporter>,
        rate: f64,
        critical_patterns: Vec<String>,
    ) -> Self {
        Self {
            inner,
            rate: rate.clamp(0.0, 1.0),
            critical_patterns,
        }
    }

    fn admits(&self, name: &str) -> bool {
        let patterns: Vec<&str> = self.critical_patterns.iter().map(String::as_str).collect();
        should_sample(name, self.rate, &patterns)
    }

    fn scale(&self, sample: &MetricSample) -> MetricSample {
        if sample.kind == MetricKind::Counter && self.rate < 1.0 && self.rate > 0.0 {
            let mut scaled = sample.clone();
            scaled.value /= self.rate;
            scaled
        } else {
            sample.clone()
        }
    }
}

#[async_trait]
impl Exporter for SamplingWrapper {
    async fn export(&self, sample: &MetricSample) -> Result<(), ExportError> {
        if !self.admits(&sample.name) {
            return Ok(());
        }
        let scaled = self.scale(sample);
        self.inner.export(&scaled).await
    }

    async fn export_batch(&self, samples: &[MetricSample]) -> Result<(), ExportError> {
        let admitted: Vec<MetricSample> = samples
            .iter()
            .filter(|s| self.admits(&s.name))
            .map(|s| self.scale(s))
            .collect();
        if admitted.is_empty() {
            return Ok(());
        }
        self.inner.export_batch(&admitted).await
    }

    async fn export_aggregated(&self, aggregates: &[Aggregated]) -> Result<(), ExportError> {
        let admitted: Vec<Aggregated> = aggregates
            .iter()
            .filter(|a| self.admits(&a.name))
            .cloned()
            .collect();
        if admitted.is_empty() {
            return Ok(());
        }
        self.inner.export_aggregated(&admitted).await
    }

    async fn flush(&self) -> Result<(), ExportError> {
        self.inner.flush().await
    }

    async fn shutdown(&self) -> Result<(), ExportError> {
        self.inner.shutdown().await
    }

    fn status(&self) -> ExporterStatus {
        self.inner.status()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn djb2_is_stable() {
        assert_eq!(djb2("api.requests"), djb2("api.requests"));
        assert_ne!(djb2("api.requests"), djb2("api.errors"));
    }

    #[test]
    fn rate_one_admits_everything() {
        assert!(should_sample("anything", 1.0, &[]));
    }

    #[test]
    fn rate_zero_admits_nothing_except_critical_patterns() {
        assert!(!should_sample("api.requests", 0.0, &["error"]));
        assert!(should_sample("api.request.error", 0.0, &["error"]));
    }

    #[test]
    fn sampling_decision_is_deterministic_across_calls() {
        let first = should_sample("svc.latency", 0.3, &[]);
        let second = should_sample("svc.latency", 0.3, &[]);
        assert_eq!(first, second);
    }
}
