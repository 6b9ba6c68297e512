//! Accumulator kinds: the per-bucket state a [`crate::window::Window`] rotates
//! or decays, and the read-only snapshots they produce.

pub mod basic_stats;
pub mod counter;
pub mod decay;
pub mod histogram;

pub use basic_stats::{BasicStatsAccumulator, BasicStatsSnapshot};
pub use counter::{CounterAccumulator, CounterSnapshot};
pub use decay::{DecayAccumulator, DecaySnapshot};
pub use histogram::{HistogramAccumulator, HistogramSnapshot, Percentiles};

/// One accumulator kind, chosen when a metric is first registered and held
/// fixed for its lifetime.
#[derive(Debug, Clone)]
pub enum AccumulatorState {
    /// Count/sum/first/last/rate only.
    Counter(CounterAccumulator),
    /// Counter plus min/max/mean.
    BasicStats(BasicStatsAccumulator),
    /// BasicStats plus bucket counts and percentile estimates.
    Histogram(HistogramAccumulator),
    /// Continuously decaying mean/variance, never rotated.
    Decay(DecayAccumulator),
}

/// The snapshot produced by any [`AccumulatorState`] variant.
#[derive(Debug, Clone, PartialEq)]
pub enum Snapshot {
    /// See [`CounterSnapshot`].
    Counter(CounterSnapshot),
    /// See [`BasicStatsSnapshot`].
    BasicStats(BasicStatsSnapshot),
    /// See [`HistogramSnapshot`].
    Histogram(HistogramSnapshot),
    /// See [`DecaySnapshot`].
    Decay(DecaySnapshot),
}

impl AccumulatorState {
    /// Records a sample into whichever accumulator variant this is.
    pub fn record(&mut self, value: f64, at: f64) {
        match self {
            AccumulatorState::Counter(a) => a.record(value, at),
            AccumulatorState::BasicStats(a) => a.record(value, at),
            AccumulatorState::Histogram(a) => a.record(value, at),
            AccumulatorState::Decay(a) => a.record(value, at),
        }
    }

    /// Produces an immutable snapshot of the current state.
    #[must_use]
    pub fn snapshot(&self) -> Snapshot {
        match self {
            AccumulatorState::Counter(a) => Snapshot::Counter(a.snapshot()),
            AccumulatorState::BasicStats(a) => Snapshot::BasicStats(a.snapshot()),
            AccumulatorState::Histogram(a) => Snapshot::Histogram(a.snapshot()),
            AccumulatorState::Decay(a) => Snapshot::Decay(a.snapshot()),
        }
    }

    /// Merges `other` into `self`. Both sides must be the same variant; a
    /// mismatched merge is a no-op, since it can only arise from a
    /// programming error (mixing accumulator kinds within one window).
    pub fn merge_from(&mut self, other: &Self) {
        match (self, other) {
            (AccumulatorState::Counter(a), AccumulatorState::Counter(b)) => a.merge_from(b),
            (AccumulatorState::BasicStats(a), AccumulatorState::BasicStats(b)) => a.merge_from(b),
            (AccumulatorState::Histogram(a), AccumulatorState::Histogram(b)) => a.merge_from(b),
            (AccumulatorState::Decay(a), AccumulatorState::Decay(b)) => a.merge_from(b),
            _ => {}
        }
    }

    /// Resets the accumulator to its initial (empty) state.
    pub fn reset(&mut self) {
        match self {
            AccumulatorState::Counter(a) => a.reset(),
            AccumulatorState::BasicStats(a) => a.reset(),
            AccumulatorState::Histogram(a) => a.reset(),
            AccumulatorState::Decay(a) => a.reset(),
        }
    }

    /// Number of samples recorded so far.
    #[must_use]
    pub fn count(&self) -> u64 {
        match self {
            AccumulatorState::Counter(a) => a.count(),
            AccumulatorState::BasicStats(a) => a.count(),
            AccumulatorState::Histogram(a) => a.count(),
            AccumulatorState::Decay(a) => a.count(),
        }
    }

    /// A freshly reset accumulator of the same kind as `self`, used when a
    /// sliding window needs a new empty bucket.
    #[must_use]
    pub fn fresh_like(&self) -> Self {
        match self {
            AccumulatorState::Counter(_) => AccumulatorState::Counter(CounterAccumulator::new()),
            AccumulatorState::BasicStats(_) => {
                AccumulatorState::BasicStats(BasicStatsAccumulator::new())
            }
            AccumulatorState::Histogram(h) => {
                let mut fresh = h.clone();
                fresh.reset();
                AccumulatorState::Histogram(fresh)
            }
            AccumulatorState::Decay(d) => {
                let mut fresh = d.clone();
                fresh.reset();
                AccumulatorState::Decay(fresh)
            }
        }
    }
}
