//! `IntelligentShrinker`: decides a pool's target idle-object count from its
//! recent usage history and the current memory-pressure level.

use crate::stats::PoolStatistics;
use pipelinekit_config::MemoryPressureLevel;

/// The allocation-pattern classification driving `pattern_adjustment`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UsagePattern {
    /// Utilization variance is low; the pool's load is predictable.
    Steady,
    /// Utilization variance is high; load spikes unpredictably.
    Bursty,
    /// The second half of the observation window used noticeably more than
    /// the first half.
    Growing,
    /// The second half of the observation window used noticeably less than
    /// the first half.
    Declining,
    /// None of the above thresholds were crossed.
    Unknown,
}

impl UsagePattern {
    fn adjustment(self) -> f64 {
        match self {
            UsagePattern::Steady => 1.0,
            UsagePattern::Bursty => 1.5,
            UsagePattern::Growing => 2.0,
            UsagePattern::Declining => 0.8,
            UsagePattern::Unknown => 1.2,
        }
    }

    fn clarity(self) -> f64 {
        match self {
            UsagePattern::Steady | UsagePattern::Growing | UsagePattern::Declining => 0.9,
            UsagePattern::Bursty => 0.7,
            UsagePattern::Unknown => 0.3,
        }
    }
}

/// A summary of recent pool utilization, sampled at regular intervals over
/// some observation window.
#[derive(Debug, Clone, PartialEq)]
pub struct UsageAnalysis {
    /// Utilization fraction (`in_use / max_size`) sampled at each interval,
    /// in chronological order.
    pub utilization_samples: Vec<f64>,
    /// New-allocation count observed over the window, per minute.
    pub allocation_velocity: f64,
    /// The highest `currently_in_use` observed during the window.
    pub recent_peak_usage: usize,
    /// Length of the observation window, in seconds.
    pub window_seconds: f64,
}

impl UsageAnalysis {
    fn average_utilization(&self) -> f64 {
        if self.utilization_samples.is_empty() {
            return 0.0;
        }
        self.utilization_samples.iter().sum::<f64>() / self.utilization_samples.len() as f64
    }

    fn variance(&self) -> f64 {
        let n = self.utilization_samples.len();
        if n < 2 {
            return 0.0;
        }
        let mean = self.average_utilization();
        let sum_sq: f64 = self
            .utilization_samples
            .iter()
            .map(|v| (v - mean).powi(2))
            .sum();
        sum_sq / n as f64
    }

    /// Classifies the usage pattern per the variance/trend thresholds.
    #[must_use]
    pub fn detect_pattern(&self) -> UsagePattern {
        let variance = self.variance();
        if variance < 0.01 {
            return UsagePattern::Steady;
        }
        if variance > 0.1 {
            return UsagePattern::Bursty;
        }
        let n = self.utilization_samples.len();
        if n >= 2 {
            let mid = n / 2;
            let first_half = &self.utilization_samples[..mid];
            let second_half = &self.utilization_samples[mid..];
            let mean_of = |s: &[f64]| -> f64 {
                if s.is_empty() {
                    0.0
                } else {
                    s.iter().sum::<f64>() / s.len() as f64
                }
            };
            let first_mean = mean_of(first_half);
            let second_mean = mean_of(second_half);
            if first_mean > 0.0 {
                if second_mean > first_mean * 1.2 {
                    return UsagePattern::Growing;
                }
                if second_mean < first_mean * 0.8 {
                    return UsagePattern::Declining;
                }
            }
        }
        UsagePattern::Unknown
    }

    /// Confidence in the pattern classification: the mean of three 0-1
    /// scores derived from sample count, window length, and pattern clarity.
    #[must_use]
    pub fn confidence(&self, pattern: UsagePattern) -> f64 {
        let count_score = (self.utilization_samples.len() as f64 / 20.0).min(1.0);
        let window_score = (self.window_seconds / 600.0).min(1.0);
        let clarity_score = pattern.clarity();
        (count_score + window_score + clarity_score) / 3.0
    }
}

/// Computes a shrink target from a pool's statistics, recent usage analysis,
/// and the current memory-pressure level.
#[derive(Debug, Clone, Copy, Default)]
pub struct IntelligentShrinker;

impl IntelligentShrinker {
    /// Creates the (stateless) shrinker.
    #[must_use]
    pub fn new() -> Self {
        Self
    }

    /// Computes the idle-object count a pool should shrink to.
    pub fn target(
        &self,
        stats: &PoolStatistics,
        analysis: &UsageAnalysis,
        pressure: MemoryPressureLevel,
        max_size: usize,
    ) -> usize {
        let utilization_score = 1.0 - analysis.average_utilization();
        let velocity_factor = (analysis.allocation_velocity / 100.0).min(1.0);
        let pressure_multiplier = pressure.shrink_multiplier();
        let pattern = analysis.detect_pattern();
        let pattern_adjustment = pattern.adjustment();
        let confidence = analysis.confidence(pattern);

        let base = max_size as f64 * utilization_score * pressure_multiplier;
        let bounded = (confidence * pattern_adjustment * velocity_factor * base)
            .min(max_size as f64);
        let target = (analysis.recent_peak_usage as f64).max(bounded);

        target.round().clamp(0.0, max_size as f64) as usize
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn stats_with_in_use(in_use: usize) -> PoolStatistics {
        PoolStatistics {
            currently_in_use: in_use,
            ..Default::default()
        }
    }

    #[test]
    fn steady_pattern_detected_for_low_variance() {
        let analysis = UsageAnalysis {
            utilization_samples: vec![0.5, 0.5, 0.51, 0.49, 0.5],
            allocation_velocity: 1.0,
            recent_peak_usage: 5,
            window_seconds: 300.0,
        };
        assert_eq!(analysis.detect_pattern(), UsagePattern::Steady);
    }

    #[test]
    fn bursty_pattern_detected_for_high_variance() {
        let analysis = UsageAnalysis {
            utilization_samples: vec![0.0, 1.0, 0.0, 1.0, 0.0],
            allocation_velocity: 50.0,
            recent_peak_usage: 10,
            window_seconds: 300.0,
        };
        assert_eq!(analysis.detect_pattern(), UsagePattern::Bursty);
    }

    #[test]
    fn growing_pattern_detected_when_second_half_outpaces_first() {
        let analysis = UsageAnalysis {
            utilization_samples: vec![0.1, 0.12, 0.11, 0.3, 0.32, 0.31],
            allocation_velocity: 10.0,
            recent_peak_usage: 8,
            window_seconds: 300.0,
        };
        assert_eq!(analysis.detect_pattern(), UsagePattern::Growing);
    }

    #[test]
    fn target_never_drops_below_recent_peak() {
        let shrinker = IntelligentShrinker::new();
        let stats = stats_with_in_use(2);
        let analysis = UsageAnalysis {
            utilization_samples: vec![0.01, 0.01],
            allocation_velocity: 0.0,
            recent_peak_usage: 50,
            window_seconds: 60.0,
        };
        let target = shrinker.target(&stats, &analysis, MemoryPressureLevel::Critical, 100);
        assert_eq!(target, 50);
    }

    #[test]
    fn critical_pressure_shrinks_harder_than_normal() {
        let shrinker = IntelligentShrinker::new();
        let stats = stats_with_in_use(20);
        let analysis = UsageAnalysis {
            utilization_samples: vec![0.5; 20],
            allocation_velocity: 100.0,
            recent_peak_usage: 0,
            window_seconds: 600.0,
        };
        let normal = shrinker.target(&stats, &analysis, MemoryPressureLevel::Normal, 100);
        let critical = shrinker.target(&stats, &analysis, MemoryPressureLevel::Critical, 100);
        assert!(critical < normal);
    }
}
