//! BasicStats accumulator: counter fields plus min/max/running mean (Welford).

use super::counter::{CounterAccumulator, CounterSnapshot};

/// Snapshot of a [`BasicStatsAccumulator`].
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BasicStatsSnapshot {
    /// The underlying counter fields.
    pub counter: CounterSnapshot,
    /// Minimum recorded value.
    pub min: f64,
    /// Maximum recorded value.
    pub max: f64,
    /// Running mean (Welford's algorithm).
    pub mean: f64,
}

/// Accumulates count/sum/min/max/mean over a stream of samples.
#[derive(Debug, Clone, Default)]
pub struct BasicStatsAccumulator {
    counter: CounterAccumulator,
    min: f64,
    max: f64,
    mean: f64,
}

impl BasicStatsAccumulator {
    /// Creates an empty accumulator.
    #[must_use]
    pub fn new() -> Self {
        Self {
            counter: CounterAccumulator::new(),
            min: f64::INFINITY,
            max: f64::NEG_INFINITY,
            mean: 0.0,
        }
    }

    /// Records a sample. Non-finite values are silently rejected.
    pub fn record(&mut self, value: f64, at: f64) {
        if !value.is_finite() {
            return;
        }
        let count_before = self.counter.count();
        self.counter.record(value, at);
        if count_before == 0 {
            self.min = value;
            self.max = value;
            self.mean = value;
            return;
        }
        self.min = self.min.min(value);
        self.max = self.max.max(value);
        let n = (count_before + 1) as f64;
        self.mean += (value - self.mean) / n;
    }

    /// Produces an immutable snapshot of the current state.
    #[must_use]
    pub fn snapshot(&self) -> BasicStatsSnapshot {
        BasicStatsSnapshot {
            counter: self.counter.snapshot(),
            min: self.min,
            max: self.max,
            mean: self.mean,
        }
    }

    /// Merges `other`'s state into `self` using a weighted combination of
    /// means (standard parallel-Welford merge).
    pub fn merge_from(&mut self, other: &Self) {
        if other.counter.count() == 0 {
            return;
        }
        if self.counter.count() == 0 {
            *self = other.clone();
            return;
        }
        let n_a = self.counter.count() as f64;
        let n_b = other.counter.count() as f64;
        let combined_mean = (self.mean * n_a + other.mean * n_b) / (n_a + n_b);
        self.min = self.min.min(other.min);
        self.max = self.max.max(other.max);
        self.mean = combined_mean;
        self.counter.merge_from(&other.counter);
    }

    /// Resets the accumulator to its initial (empty) state.
    pub fn reset(&mut self) {
        *self = Self::new();
    }

    /// Number of samples recorded so far.
    #[must_use]
    pub fn count(&self) -> u64 {
        self.counter.count()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tracks_min_max_mean() {
        let mut acc = BasicStatsAccumulator::new();
        for v in [10.0, 20.0, 30.0, 40.0] {
            acc.record(v, 0.0);
        }
        let snap = acc.snapshot();
        assert_eq!(snap.min, 10.0);
        assert_eq!(snap.max, 40.0);
        assert_eq!(snap.mean, 25.0);
        assert_eq!(snap.counter.count, 4);
        assert_eq!(snap.counter.sum, 100.0);
    }

    #[test]
    fn sliding_window_merge_scenario() {
        // §8.4 scenario 1: sliding(12s, 4 buckets), record at t=0:10,3:20,6:30,9:40
        let mut buckets: Vec<BasicStatsAccumulator> = (0..4).map(|_| BasicStatsAccumulator::new()).collect();
        buckets[0].record(10.0, 0.0);
        buckets[1].record(20.0, 3.0);
        buckets[2].record(30.0, 6.0);
        buckets[3].record(40.0, 9.0);
        let mut merged = BasicStatsAccumulator::new();
        for b in &buckets {
            merged.merge_from(b);
        }
        let snap = merged.snapshot();
        assert_eq!(snap.counter.count, 4);
        assert_eq!(snap.counter.sum, 100.0);
        assert_eq!(snap.mean, 25.0);
        assert_eq!(snap.min, 10.0);
        assert_eq!(snap.max, 40.0);
        assert_eq!(snap.counter.last_value, 40.0);
    }
}
