//! The `MetricSample` / tag data model shared by every accumulator and exporter.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Tags are kept in a `BTreeMap` so iteration is always lexicographically
/// sorted by key — both the StatsD and Prometheus backends require sorted tags
/// in their wire format, and sorting once here avoids re-sorting at every
/// export.
pub type Tags = BTreeMap<String, String>;

/// The wire-level kind of a metric, independent of which accumulator produced
/// it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MetricKind {
    /// Monotonically increasing (until reset) value.
    Counter,
    /// Point-in-time value that can move in either direction.
    Gauge,
    /// A distribution of observed values.
    Histogram,
    /// A duration measurement, exported like a gauge with a time unit.
    Timer,
}

impl MetricKind {
    /// A short machine-readable label.
    #[must_use]
    pub const fn label(self) -> &'static str {
        match self {
            MetricKind::Counter => "counter",
            MetricKind::Gauge => "gauge",
            MetricKind::Histogram => "histogram",
            MetricKind::Timer => "timer",
        }
    }
}

/// A single immutable metric observation, ready to hand to an exporter.
///
/// Once constructed, a `MetricSample` is never mutated; exporters only ever
/// read it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MetricSample {
    /// The metric's name, e.g. `"api.requests"`.
    pub name: String,
    /// The metric's kind.
    pub kind: MetricKind,
    /// The observed value.
    pub value: f64,
    /// When the observation was made.
    pub timestamp: chrono::DateTime<chrono::Utc>,
    /// Dimensional tags.
    pub tags: Tags,
    /// An optional unit string (e.g. `"ms"`, `"By"`), following the
    /// `{unit}` convention used by the pipeline metrics in the teacher crate.
    pub unit: Option<String>,
}

impl MetricSample {
    /// Constructs a sample with no tags and no unit.
    #[must_use]
    pub fn new(name: impl Into<String>, kind: MetricKind, value: f64) -> Self {
        Self {
            name: name.into(),
            kind,
            value,
            timestamp: chrono::Utc::now(),
            tags: Tags::new(),
            unit: None,
        }
    }

    /// Builder-style tag insertion.
    #[must_use]
    pub fn with_tag(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.tags.insert(key.into(), value.into());
        self
    }

    /// Builder-style unit assignment.
    #[must_use]
    pub fn with_unit(mut self, unit: impl Into<String>) -> Self {
        self.unit = Some(unit.into());
        self
    }

    /// The `(name, sorted-tags)` identity used for deduplication and
    /// aggregation keys.
    #[must_use]
    pub fn key(&self) -> (String, Vec<(String, String)>) {
        (
            self.name.clone(),
            self.tags
                .iter()
                .map(|(k, v)| (k.clone(), v.clone()))
                .collect(),
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sample_round_trips_through_json() {
        let sample = MetricSample::new("api.requests", MetricKind::Counter, 5.0)
            .with_tag("endpoint", "/x")
            .with_unit("requests");
        let json = serde_json::to_string(&sample).unwrap();
        let back: MetricSample = serde_json::from_str(&json).unwrap();
        assert_eq!(sample, back);
    }

    #[test]
    fn kind_serializes_as_snake_case() {
        let json = serde_json::to_string(&MetricKind::Timer).unwrap();
        assert_eq!(json, "\"timer\"");
    }
}
