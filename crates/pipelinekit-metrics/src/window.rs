//! Aggregation windows: the rotation/decay policy wrapped around an
//! [`AccumulatorState`].

use crate::accumulator::{
    AccumulatorState, BasicStatsSnapshot, CounterSnapshot, DecaySnapshot, HistogramSnapshot,
    Snapshot,
};
use pipelinekit_config::AggregationWindow;

/// A live aggregation window: a rotation/decay strategy wrapped around one or
/// more [`AccumulatorState`] instances.
#[derive(Debug, Clone)]
pub enum Window {
    /// A single accumulator, rotated only on external request (see
    /// [`Window::rotate`]).
    Fixed { inner: AccumulatorState },
    /// A ring of `buckets` accumulators, each covering
    /// `duration / buckets` of wall-clock time.
    Sliding {
        buckets: Vec<AccumulatorState>,
        bucket_span: f64,
        duration: f64,
        /// The timestamp each bucket was last written or rotated at, used to
        /// detect staleness on the next write.
        bucket_started_at: Vec<f64>,
    },
    /// A single continuously decaying accumulator; never rotated.
    Decay(AccumulatorState),
}

impl Window {
    /// Builds a window from a configuration value and a template accumulator
    /// describing which kind (Counter/BasicStats/Histogram) to use — ignored
    /// for [`AggregationWindow::ExponentialDecay`], which always uses
    /// [`AccumulatorState::Decay`].
    #[must_use]
    pub fn new(config: &AggregationWindow, template: AccumulatorTemplate) -> Self {
        match *config {
            AggregationWindow::Fixed { duration: _ } => Window::Fixed {
                inner: template.fresh(),
            },
            AggregationWindow::Sliding { duration, buckets } => {
                let duration = duration.as_secs_f64();
                let buckets = buckets.max(1);
                let bucket_span = duration / buckets as f64;
                Window::Sliding {
                    buckets: (0..buckets).map(|_| template.fresh()).collect(),
                    bucket_span,
                    duration,
                    bucket_started_at: vec![0.0; buckets as usize],
                }
            }
            AggregationWindow::ExponentialDecay {
                half_life,
                warmup_period,
                min_weight,
            } => Window::Decay(AccumulatorState::Decay(
                crate::accumulator::DecayAccumulator::new(
                    half_life.as_secs_f64(),
                    warmup_period.as_secs_f64(),
                    min_weight,
                ),
            )),
        }
    }

    fn bucket_index(&self, at: f64, bucket_span: f64, duration: f64) -> usize {
        let len = (duration / bucket_span).round().max(1.0) as usize;
        let phase = at.rem_euclid(duration.max(f64::MIN_POSITIVE));
        ((phase / bucket_span) as usize).min(len.saturating_sub(1))
    }

    /// Records a sample at timestamp `at` (seconds, monotonic for the life of
    /// the window).
    pub fn record(&mut self, value: f64, at: f64) {
        match self {
            Window::Fixed { inner } => inner.record(value, at),
            Window::Sliding {
                buckets,
                bucket_span,
                duration,
                bucket_started_at,
            } => {
                let idx = {
                    let len = (*duration / *bucket_span).round().max(1.0) as usize;
                    let phase = at.rem_euclid((*duration).max(f64::MIN_POSITIVE));
                    ((phase / *bucket_span) as usize).min(len.saturating_sub(1))
                };
                // A bucket is stale once more than one full window duration
                // has elapsed since it was last touched; reset it before
                // writing the new sample into it.
                if at - bucket_started_at[idx] >= *duration {
                    buckets[idx].reset();
                }
                bucket_started_at[idx] = at;
                buckets[idx].record(value, at);
            }
            Window::Decay(inner) => inner.record(value, at),
        }
    }

    /// Produces a merged snapshot across all active buckets (for
    /// [`Window::Sliding`]) or the single accumulator otherwise.
    #[must_use]
    pub fn snapshot(&self) -> Snapshot {
        match self {
            Window::Fixed { inner } => inner.snapshot(),
            Window::Sliding { buckets, .. } => {
                let mut iter = buckets.iter();
                let Some(first) = iter.next() else {
                    return AccumulatorState::BasicStats(
                        crate::accumulator::BasicStatsAccumulator::new(),
                    )
                    .snapshot();
                };
                let mut merged = first.clone();
                for bucket in iter {
                    merged.merge_from(bucket);
                }
                merged.snapshot()
            }
            Window::Decay(inner) => inner.snapshot(),
        }
    }

    /// Explicitly rotates a [`Window::Fixed`] window, returning the snapshot
    /// taken just before the reset. A no-op (returning the current snapshot)
    /// for `Sliding`/`Decay`, which rotate/decay implicitly.
    pub fn rotate(&mut self) -> Snapshot {
        match self {
            Window::Fixed { inner } => {
                let snap = inner.snapshot();
                inner.reset();
                snap
            }
            other => other.snapshot(),
        }
    }

    /// Total samples recorded across all buckets.
    #[must_use]
    pub fn count(&self) -> u64 {
        match self {
            Window::Fixed { inner } => inner.count(),
            Window::Sliding { buckets, .. } => buckets.iter().map(|b| b.count()).sum(),
            Window::Decay(inner) => inner.count(),
        }
    }
}

/// Which accumulator kind a freshly constructed [`Window`] bucket should use.
#[derive(Debug, Clone, Copy)]
pub enum AccumulatorTemplate {
    /// See [`AccumulatorState::Counter`].
    Counter,
    /// See [`AccumulatorState::BasicStats`].
    BasicStats,
    /// See [`AccumulatorState::Histogram`]; bucket boundaries as given.
    Histogram,
}

impl AccumulatorTemplate {
    fn fresh(self) -> AccumulatorState {
        match self {
            AccumulatorTemplate::Counter => {
                AccumulatorState::Counter(crate::accumulator::CounterAccumulator::new())
            }
            AccumulatorTemplate::BasicStats => {
                AccumulatorState::BasicStats(crate::accumulator::BasicStatsAccumulator::new())
            }
            AccumulatorTemplate::Histogram => AccumulatorState::Histogram(
                crate::accumulator::HistogramAccumulator::with_default_buckets(),
            ),
        }
    }
}

/// Converts a decay snapshot into an equivalent [`CounterSnapshot`], for
/// exporters that only understand bounded accumulator shapes.
///
/// `sum = ewma × effective_weight`; `first_value`/`first_ts` are left unset
/// since a decay window has no discrete epoch start.
#[must_use]
pub fn decay_to_counter(snap: &DecaySnapshot) -> CounterSnapshot {
    CounterSnapshot {
        count: snap.count,
        sum: snap.ewma * snap.effective_weight,
        first_value: None,
        last_value: snap.last_value,
        first_ts: None,
        last_ts: snap.last_ts,
        rate: 0.0,
    }
}

/// Converts a decay snapshot into an equivalent [`BasicStatsSnapshot`].
#[must_use]
pub fn decay_to_basic_stats(snap: &DecaySnapshot) -> BasicStatsSnapshot {
    BasicStatsSnapshot {
        counter: decay_to_counter(snap),
        min: snap.min,
        max: snap.max,
        mean: snap.ewma,
    }
}

/// Converts a decay snapshot into a synthetic [`HistogramSnapshot`] with
/// `count` distributed across three buckets at `min`, `mean = ewma`, and
/// `max`, so a decay-windowed metric can still be exported as a Prometheus
/// histogram. Original percentiles cannot be reconstructed from a decay
/// accumulator and are reported as `0.0`.
#[must_use]
pub fn decay_to_histogram(snap: &DecaySnapshot) -> HistogramSnapshot {
    let stats = decay_to_basic_stats(snap);
    let total = snap.count;
    let per_bucket = total / 3;
    let remainder = total % 3;
    // min bucket gets any remainder so bucket counts always sum to `total`.
    let buckets = vec![
        (snap.min, per_bucket + remainder),
        (snap.ewma, per_bucket),
        (snap.max, per_bucket),
        (f64::INFINITY, 0),
    ];
    HistogramSnapshot {
        stats,
        buckets,
        percentiles: crate::accumulator::Percentiles::default(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pipelinekit_config::AggregationWindow;
    use std::time::Duration;

    #[test]
    fn sliding_window_merges_buckets_like_the_spec_scenario() {
        let config = AggregationWindow::sliding(Duration::from_secs(12), 4);
        let mut window = Window::new(&config, AccumulatorTemplate::BasicStats);
        window.record(10.0, 0.0);
        window.record(20.0, 3.0);
        window.record(30.0, 6.0);
        window.record(40.0, 9.0);
        let Snapshot::BasicStats(snap) = window.snapshot() else {
            panic!("expected BasicStats snapshot");
        };
        assert_eq!(snap.counter.count, 4);
        assert_eq!(snap.counter.sum, 100.0);
        assert_eq!(snap.mean, 25.0);
        assert_eq!(snap.min, 10.0);
        assert_eq!(snap.max, 40.0);
        assert_eq!(snap.counter.last_value, 40.0);
    }

    #[test]
    fn fixed_window_rotation_resets_and_returns_prior_state() {
        let config = AggregationWindow::Fixed {
            duration: Duration::from_secs(60),
        };
        let mut window = Window::new(&config, AccumulatorTemplate::Counter);
        window.record(5.0, 0.0);
        window.record(7.0, 1.0);
        let Snapshot::Counter(before) = window.rotate() else {
            panic!("expected Counter snapshot");
        };
        assert_eq!(before.count, 2);
        assert_eq!(window.count(), 0);
    }

    #[test]
    fn decay_to_histogram_distributes_remainder_into_min_bucket() {
        let snap = DecaySnapshot {
            count: 7,
            min: 1.0,
            max: 9.0,
            last_value: 9.0,
            last_ts: 10.0,
            ewma: 5.0,
            ewmv: 1.0,
            ewm_std_dev: 1.0,
            ci_lower: 4.0,
            ci_upper: 6.0,
            effective_weight: 7.0,
        };
        let hist = decay_to_histogram(&snap);
        let total: u64 = hist.buckets.iter().map(|(_, c)| *c).sum();
        assert_eq!(total, 7);
        assert_eq!(hist.buckets[0].1, 3);
    }
}
