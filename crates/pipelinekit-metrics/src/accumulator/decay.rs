//! Exponential-decay accumulator: a continuously decaying mean/variance with
//! no discrete rotation, for metrics that should weight recent samples more
//! heavily without ever "resetting" on a window boundary.

/// Snapshot of a [`DecayAccumulator`].
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DecaySnapshot {
    /// Number of samples recorded.
    pub count: u64,
    /// Minimum recorded value (never decays).
    pub min: f64,
    /// Maximum recorded value (never decays).
    pub max: f64,
    /// Most recently recorded value.
    pub last_value: f64,
    /// Timestamp of the most recently recorded sample.
    pub last_ts: f64,
    /// Exponentially weighted moving average.
    pub ewma: f64,
    /// Exponentially weighted moving variance.
    pub ewmv: f64,
    /// `sqrt(ewmv.max(0.0))`.
    pub ewm_std_dev: f64,
    /// Lower bound of a 95% Wald confidence interval around `ewma`.
    pub ci_lower: f64,
    /// Upper bound of a 95% Wald confidence interval around `ewma`.
    pub ci_upper: f64,
    /// Effective sample weight accumulated so far, saturating at
    /// `1 / (1 - min_weight)`; used to rescale a decay snapshot into an
    /// equivalent bounded-accumulator sum.
    pub effective_weight: f64,
}

/// The z-score for a two-sided 95% confidence interval.
const Z_95: f64 = 1.96;

/// Continuously decaying mean/variance accumulator.
///
/// During the configured `warmup_period` (measured from the first recorded
/// sample's timestamp), the accumulator behaves like a plain Welford running
/// mean/variance so that early estimates aren't dominated by a single sample.
/// After warmup, every subsequent sample blends into the running estimate
/// with a decay weight `alpha` derived from the elapsed time since the last
/// sample and the configured `half_life`.
#[derive(Debug, Clone)]
pub struct DecayAccumulator {
    half_life: f64,
    warmup_period: f64,
    min_weight: f64,
    count: u64,
    min: f64,
    max: f64,
    last_value: f64,
    last_ts: f64,
    first_ts: Option<f64>,
    ewma: f64,
    ewmv: f64,
    warmup_m2: f64,
    effective_weight: f64,
}

impl DecayAccumulator {
    /// Creates a new accumulator. `half_life` and `warmup_period` are in the
    /// same time unit as the `at` timestamps passed to [`Self::record`]
    /// (seconds, by convention, elsewhere in this crate). `min_weight` is the
    /// floor placed on the retained weight of the pre-existing estimate once
    /// `Δt` grows large, clamped to `[0, 1]` by the caller (see
    /// `pipelinekit_config::window::AggregationWindow::validate`).
    #[must_use]
    pub fn new(half_life: f64, warmup_period: f64, min_weight: f64) -> Self {
        Self {
            half_life: half_life.max(f64::MIN_POSITIVE),
            warmup_period,
            min_weight,
            count: 0,
            min: f64::INFINITY,
            max: f64::NEG_INFINITY,
            last_value: 0.0,
            last_ts: 0.0,
            first_ts: None,
            ewma: 0.0,
            ewmv: 0.0,
            warmup_m2: 0.0,
            effective_weight: 0.0,
        }
    }

    /// The decay weight applied to a new sample arriving `delta` time units
    /// after the previous one.
    ///
    /// `alpha` is the weight given to the *new* sample; `1 - alpha` is the
    /// weight retained from the existing estimate. As `delta` grows, the new
    /// sample's influence approaches `1 - min_weight`, so the prior estimate
    /// never loses more than `min_weight` of its standing.
    #[must_use]
    pub fn alpha(delta: f64, half_life: f64, min_weight: f64) -> f64 {
        let delta = delta.max(0.0);
        let decayed = 0.5_f64.powf(delta / half_life);
        1.0 - decayed.max(min_weight)
    }

    /// Records a sample. Non-finite values are silently rejected.
    pub fn record(&mut self, value: f64, at: f64) {
        if !value.is_finite() {
            return;
        }
        self.count += 1;
        self.min = self.min.min(value);
        self.max = self.max.max(value);
        self.last_value = value;
        self.last_ts = at;

        if self.first_ts.is_none() {
            self.first_ts = Some(at);
            self.ewma = value;
            self.ewmv = 0.0;
            self.effective_weight = 1.0;
            return;
        }
        let first_ts = self.first_ts.unwrap_or(at);
        let in_warmup = at - first_ts < self.warmup_period;
        if in_warmup {
            let n = self.count as f64;
            let delta = value - self.ewma;
            self.ewma += delta / n;
            let delta2 = value - self.ewma;
            self.warmup_m2 += delta * delta2;
            self.ewmv = if n > 1.0 { self.warmup_m2 / n } else { 0.0 };
            self.effective_weight += 1.0;
            return;
        }
        let delta_t = at - self.last_ts;
        let alpha = Self::alpha(delta_t.max(0.0), self.half_life, self.min_weight);
        let diff = value - self.ewma;
        self.ewma += alpha * diff;
        self.ewmv = (1.0 - alpha) * (self.ewmv + alpha * diff * diff);
        let max_weight = 1.0 / (1.0 - self.min_weight).max(f64::MIN_POSITIVE);
        self.effective_weight = (self.effective_weight * (1.0 - alpha) + 1.0).min(max_weight);
    }

    /// Produces an immutable snapshot of the current state.
    #[must_use]
    pub fn snapshot(&self) -> DecaySnapshot {
        let ewm_std_dev = self.ewmv.max(0.0).sqrt();
        let margin = if self.count > 0 {
            Z_95 * ewm_std_dev / (self.count as f64).sqrt()
        } else {
            0.0
        };
        DecaySnapshot {
            count: self.count,
            min: self.min,
            max: self.max,
            last_value: self.last_value,
            last_ts: self.last_ts,
            ewma: self.ewma,
            ewmv: self.ewmv,
            ewm_std_dev,
            ci_lower: self.ewma - margin,
            ci_upper: self.ewma + margin,
            effective_weight: self.effective_weight,
        }
    }

    /// Merges `other` into `self`. Since decay accumulators have no discrete
    /// window boundary, a merge is only meaningful when combining two
    /// instances tracking the same logical series (e.g. sharded producers);
    /// the later-timestamped side's `ewma`/`ewmv` win, weighted by relative
    /// `effective_weight`, while count/min/max/last accumulate normally.
    pub fn merge_from(&mut self, other: &Self) {
        if other.count == 0 {
            return;
        }
        if self.count == 0 {
            *self = other.clone();
            return;
        }
        self.count += other.count;
        self.min = self.min.min(other.min);
        self.max = self.max.max(other.max);
        if other.last_ts >= self.last_ts {
            self.last_value = other.last_value;
            self.last_ts = other.last_ts;
        }
        let w_a = self.effective_weight;
        let w_b = other.effective_weight;
        let total_w = (w_a + w_b).max(f64::MIN_POSITIVE);
        self.ewma = (self.ewma * w_a + other.ewma * w_b) / total_w;
        self.ewmv = (self.ewmv * w_a + other.ewmv * w_b) / total_w;
        self.effective_weight = total_w.min(1.0 / (1.0 - self.min_weight).max(f64::MIN_POSITIVE));
    }

    /// Resets the accumulator to its initial (empty) state, keeping its
    /// configured `half_life`/`warmup_period`/`min_weight`.
    pub fn reset(&mut self) {
        let (half_life, warmup_period, min_weight) =
            (self.half_life, self.warmup_period, self.min_weight);
        *self = Self::new(half_life, warmup_period, min_weight);
    }

    /// Number of samples recorded so far.
    #[must_use]
    pub fn count(&self) -> u64 {
        self.count
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn single_half_life_averages_two_samples() {
        // one half-life apart, no warmup: alpha = 1 - 0.5 = 0.5, so the
        // second sample moves ewma exactly halfway toward itself.
        let mut acc = DecayAccumulator::new(2.0, 0.0, 0.0);
        acc.record(10.0, 0.0);
        acc.record(20.0, 2.0);
        let snap = acc.snapshot();
        assert!((snap.ewma - 15.0).abs() < 1e-9);
    }

    #[test]
    fn decay_correctness_scenario() {
        // half_life=2s, samples 100@0, 50@2, 25@4, no warmup.
        let mut acc = DecayAccumulator::new(2.0, 0.0, 0.0);
        acc.record(100.0, 0.0);
        acc.record(50.0, 2.0);
        acc.record(25.0, 4.0);
        let snap = acc.snapshot();
        assert_eq!(snap.count, 3);
        assert_eq!(snap.min, 25.0);
        assert_eq!(snap.max, 100.0);
        assert!(snap.ewma < 58.333, "ewma {} should be biased toward recent samples", snap.ewma);
    }

    #[test]
    fn large_delta_retains_min_weight_influence() {
        let half_life = 1.0;
        let min_weight = 0.1;
        let mut acc = DecayAccumulator::new(half_life, 0.0, min_weight);
        acc.record(10.0, 0.0);
        // delta = 1000 half-lives: alpha caps at (1 - min_weight).
        acc.record(1000.0, 1000.0);
        let alpha = DecayAccumulator::alpha(1000.0, half_life, min_weight);
        assert!((alpha - (1.0 - min_weight)).abs() < 1e-9);
    }

    #[test]
    fn negative_delta_is_clamped_to_zero() {
        let mut acc = DecayAccumulator::new(2.0, 0.0, 0.0);
        acc.record(10.0, 5.0);
        let before = acc.snapshot();
        acc.record(20.0, 1.0);
        let after = acc.snapshot();
        assert_eq!(before.ewma, after.ewma);
        assert_eq!(after.count, 2);
        assert_eq!(after.max, 20.0);
        assert_eq!(after.last_value, 20.0);
    }

    #[test]
    fn warmup_phase_behaves_like_plain_mean() {
        let mut acc = DecayAccumulator::new(10.0, 5.0, 0.0);
        acc.record(10.0, 0.0);
        acc.record(20.0, 1.0);
        acc.record(30.0, 2.0);
        let snap = acc.snapshot();
        assert!((snap.ewma - 20.0).abs() < 1e-9);
    }
}
