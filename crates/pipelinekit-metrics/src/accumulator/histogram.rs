//! Histogram accumulator: BasicStats plus per-sample bucket counts and
//! derived percentiles.

use super::basic_stats::{BasicStatsAccumulator, BasicStatsSnapshot};
use std::collections::BTreeMap;

/// Converts an `f64` into a `u64` that sorts in the same order as the float,
/// so it can be used as a `BTreeMap` key. Positive floats flip their sign bit;
/// negative floats (and NaN, which we never insert) have all bits flipped.
#[inline]
fn sortable_bits(value: f64) -> u64 {
    let bits = value.to_bits();
    if bits & (1 << 63) != 0 {
        !bits
    } else {
        bits | (1 << 63)
    }
}

#[inline]
fn from_sortable_bits(key: u64) -> f64 {
    let bits = if key & (1 << 63) != 0 {
        key & !(1 << 63)
    } else {
        !key
    };
    f64::from_bits(bits)
}

/// Percentile summary derived from the bucket map at snapshot time.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct Percentiles {
    /// 50th percentile (median).
    pub p50: f64,
    /// 90th percentile.
    pub p90: f64,
    /// 95th percentile.
    pub p95: f64,
    /// 99th percentile.
    pub p99: f64,
    /// 99.9th percentile.
    pub p999: f64,
}

/// Snapshot of a [`HistogramAccumulator`].
#[derive(Debug, Clone, PartialEq)]
pub struct HistogramSnapshot {
    /// The underlying basic-stats fields.
    pub stats: BasicStatsSnapshot,
    /// Sorted `(upper_bound, cumulative-exclusive count)` pairs, i.e. the
    /// per-bucket count (not yet cumulative) for each configured boundary,
    /// ascending by boundary. The final entry's boundary is always `+Inf`.
    pub buckets: Vec<(f64, u64)>,
    /// Derived percentile estimates.
    pub percentiles: Percentiles,
}

/// Accumulates a bounded set of bucket boundaries (plus a `+Inf` overflow
/// bucket) alongside the usual count/sum/min/max/mean fields.
#[derive(Debug, Clone)]
pub struct HistogramAccumulator {
    stats: BasicStatsAccumulator,
    buckets: BTreeMap<u64, u64>,
}

impl HistogramAccumulator {
    /// Creates a histogram with the given ascending, finite bucket
    /// boundaries. A `+Inf` boundary is appended automatically.
    #[must_use]
    pub fn new(boundaries: impl IntoIterator<Item = f64>) -> Self {
        let mut buckets = BTreeMap::new();
        for b in boundaries {
            let _ = buckets.insert(sortable_bits(b), 0);
        }
        let _ = buckets.insert(sortable_bits(f64::INFINITY), 0);
        Self {
            stats: BasicStatsAccumulator::new(),
            buckets,
        }
    }

    /// The default bucket ladder used when a caller doesn't supply one:
    /// a log-scale spread covering microseconds to tens of seconds, suitable
    /// for latency-style histograms.
    #[must_use]
    pub fn with_default_buckets() -> Self {
        Self::new([
            0.001, 0.005, 0.01, 0.05, 0.1, 0.5, 1.0, 5.0, 10.0, 30.0, 60.0,
        ])
    }

    /// Records a sample. Non-finite values are silently rejected.
    pub fn record(&mut self, value: f64, at: f64) {
        if !value.is_finite() {
            return;
        }
        self.stats.record(value, at);
        let key = sortable_bits(value);
        if let Some((&boundary_key, count)) = self.buckets.range_mut(key..).next() {
            *count += 1;
            let _ = boundary_key;
        }
    }

    /// Produces an immutable snapshot, including derived percentiles.
    #[must_use]
    pub fn snapshot(&self) -> HistogramSnapshot {
        let stats = self.stats.snapshot();
        let buckets: Vec<(f64, u64)> = self
            .buckets
            .iter()
            .map(|(&k, &c)| (from_sortable_bits(k), c))
            .collect();
        let percentiles = Self::percentiles_from_buckets(&buckets, stats.counter.count);
        HistogramSnapshot {
            stats,
            buckets,
            percentiles,
        }
    }

    fn percentiles_from_buckets(buckets: &[(f64, u64)], total: u64) -> Percentiles {
        if total == 0 {
            return Percentiles::default();
        }
        let rank_for = |q: f64| -> f64 { (q * total as f64).ceil().clamp(1.0, total as f64) };
        let quantile = |q: f64| -> f64 {
            let rank = rank_for(q);
            let mut cumulative = 0u64;
            for &(boundary, count) in buckets {
                cumulative += count;
                if cumulative as f64 >= rank {
                    return boundary;
                }
            }
            buckets.last().map(|&(b, _)| b).unwrap_or(0.0)
        };
        Percentiles {
            p50: quantile(0.50),
            p90: quantile(0.90),
            p95: quantile(0.95),
            p99: quantile(0.99),
            p999: quantile(0.999),
        }
    }

    /// Merges `other`'s bucket counts and stats into `self`. Both histograms
    /// must have been constructed with the same boundary set (true for all
    /// buckets within one sliding window ring).
    pub fn merge_from(&mut self, other: &Self) {
        self.stats.merge_from(&other.stats);
        for (key, count) in &other.buckets {
            *self.buckets.entry(*key).or_insert(0) += count;
        }
    }

    /// Resets the accumulator to its initial (empty) state, keeping the
    /// configured bucket boundaries.
    pub fn reset(&mut self) {
        self.stats.reset();
        for count in self.buckets.values_mut() {
            *count = 0;
        }
    }

    /// Number of samples recorded so far.
    #[must_use]
    pub fn count(&self) -> u64 {
        self.stats.count()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sortable_bits_preserve_order() {
        let values = [-10.0, -1.0, 0.0, 0.5, 1.0, 100.0, f64::INFINITY];
        let mut keys: Vec<u64> = values.iter().map(|&v| sortable_bits(v)).collect();
        let sorted = {
            let mut k = keys.clone();
            k.sort_unstable();
            k
        };
        assert_eq!(keys, sorted);
        keys.sort_unstable();
        for (k, v) in keys.iter().zip(values.iter()) {
            assert_eq!(from_sortable_bits(*k), *v);
        }
    }

    #[test]
    fn buckets_count_samples_into_smallest_fitting_boundary() {
        let mut h = HistogramAccumulator::new([1.0, 5.0, 10.0]);
        h.record(0.5, 0.0);
        h.record(3.0, 0.0);
        h.record(7.0, 0.0);
        h.record(50.0, 0.0);
        let snap = h.snapshot();
        assert_eq!(snap.stats.counter.count, 4);
        let by_boundary: std::collections::HashMap<_, _> = snap.buckets.into_iter().collect();
        assert_eq!(by_boundary[&1.0], 1);
        assert_eq!(by_boundary[&5.0], 1);
        assert_eq!(by_boundary[&10.0], 1);
        assert_eq!(by_boundary[&f64::INFINITY], 1);
    }

    #[test]
    fn percentiles_are_monotone() {
        let mut h = HistogramAccumulator::new([1.0, 2.0, 5.0, 10.0, 20.0]);
        for v in [0.5, 1.5, 1.5, 3.0, 7.0, 15.0, 19.0] {
            h.record(v, 0.0);
        }
        let p = h.snapshot().percentiles;
        assert!(p.p50 <= p.p90);
        assert!(p.p90 <= p.p95);
        assert!(p.p95 <= p.p99);
        assert!(p.p99 <= p.p999);
    }
}
