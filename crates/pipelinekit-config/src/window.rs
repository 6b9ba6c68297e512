//! Aggregation window configuration.

use serde::{Deserialize, Serialize};
use std::time::Duration;

/// How samples are windowed before being snapshotted.
///
/// Mirrors the three accumulator window strategies: a single bucket rotated on
/// request, a ring of buckets rotated by wall clock, or continuous exponential
/// decay with no discrete rotation at all.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum AggregationWindow {
    /// A single accumulator covering `duration`. Rotation happens only when the
    /// caller explicitly requests it (e.g. on a timer).
    Fixed {
        /// Duration covered before rotation is expected.
        #[serde(with = "humantime_serde")]
        duration: Duration,
    },
    /// A ring of `buckets` equal-sized sub-windows covering `duration` in total.
    /// Snapshotting merges all currently-active buckets.
    Sliding {
        /// Total duration covered by the ring.
        #[serde(with = "humantime_serde")]
        duration: Duration,
        /// Number of buckets in the ring. Must be at least 1.
        buckets: u32,
    },
    /// Continuous exponential decay; no discrete window rotation.
    ExponentialDecay {
        /// Half-life of the decay.
        #[serde(with = "humantime_serde")]
        half_life: Duration,
        /// Duration after the first sample during which plain averaging (no
        /// decay) is used instead.
        #[serde(with = "humantime_serde")]
        warmup_period: Duration,
        /// Minimum residual weight `alpha` can decay to, e.g. `1e-3`.
        min_weight: f64,
    },
}

impl AggregationWindow {
    /// Convenience constructor for a sliding window.
    #[must_use]
    pub const fn sliding(duration: Duration, buckets: u32) -> Self {
        Self::Sliding { duration, buckets }
    }

    /// Convenience constructor for an exponential-decay window.
    #[must_use]
    pub const fn exponential_decay(half_life: Duration) -> Self {
        Self::ExponentialDecay {
            half_life,
            warmup_period: Duration::from_secs(0),
            min_weight: 1e-3,
        }
    }

    /// Validates the window parameters, returning a [`crate::ConfigurationError`]
    /// if they are out of range.
    pub fn validate(&self) -> Result<(), crate::ConfigurationError> {
        use crate::ConfigurationError as E;
        match self {
            Self::Fixed { duration } if duration.is_zero() => Err(E::InvalidValue {
                field: "duration",
                reason: "must be non-zero".into(),
            }),
            Self::Sliding { duration, buckets } => {
                if duration.is_zero() {
                    Err(E::InvalidValue {
                        field: "duration",
                        reason: "must be non-zero".into(),
                    })
                } else if *buckets == 0 {
                    Err(E::InvalidValue {
                        field: "buckets",
                        reason: "must be at least 1".into(),
                    })
                } else {
                    Ok(())
                }
            }
            Self::ExponentialDecay {
                half_life,
                min_weight,
                ..
            } => {
                if half_life.is_zero() {
                    Err(E::InvalidValue {
                        field: "half_life",
                        reason: "must be non-zero".into(),
                    })
                } else if !(0.0..=1.0).contains(min_weight) {
                    Err(E::InvalidValue {
                        field: "min_weight",
                        reason: "must be in [0, 1]".into(),
                    })
                } else {
                    Ok(())
                }
            }
            Self::Fixed { .. } => Ok(()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sliding_rejects_zero_buckets() {
        let w = AggregationWindow::sliding(Duration::from_secs(10), 0);
        assert!(w.validate().is_err());
    }

    #[test]
    fn decay_rejects_out_of_range_min_weight() {
        let w = AggregationWindow::ExponentialDecay {
            half_life: Duration::from_secs(2),
            warmup_period: Duration::from_secs(0),
            min_weight: 1.5,
        };
        assert!(w.validate().is_err());
    }

    #[test]
    fn round_trips_through_json() {
        let w = AggregationWindow::sliding(Duration::from_secs(12), 4);
        let json = serde_json::to_string(&w).unwrap();
        let back: AggregationWindow = serde_json::from_str(&json).unwrap();
        assert_eq!(w, back);
    }

    #[test]
    fn parses_from_yaml_config_document() {
        let yaml = "kind: exponential_decay\nhalf_life: 30s\nwarmup_period: 5s\nmin_weight: 0.001\n";
        let w: AggregationWindow = serde_yaml::from_str(yaml).unwrap();
        assert_eq!(
            w,
            AggregationWindow::ExponentialDecay {
                half_life: Duration::from_secs(30),
                warmup_period: Duration::from_secs(5),
                min_weight: 0.001,
            }
        );
    }
}
