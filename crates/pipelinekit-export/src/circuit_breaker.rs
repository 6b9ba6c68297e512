//! Per-exporter health tracking for [`crate::multi::MultiExporter`].
//!
//! A failing sub-exporter inside a fan-out shouldn't be retried on every
//! single batch — that just pays its failure latency (or UDP/file-open
//! retry cost) over and over. The breaker trips `Open` after enough
//! consecutive failures, skips the sub-exporter entirely while open, then
//! allows one trial call through once `timeout` has elapsed (`HalfOpen`)
//! before deciding whether to close again or re-open.

use serde::{Deserialize, Serialize};
use std::time::{Duration, Instant};

/// The circuit breaker's current state.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum BreakerState {
    /// Calls pass through normally.
    Closed,
    /// Calls are skipped until `until` elapses.
    Open {
        /// When the breaker will move to `HalfOpen`.
        until: Instant,
    },
    /// A single trial call is allowed through to decide whether to close.
    HalfOpen,
}

/// Tunables for [`CircuitBreaker`].
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct BreakerConfig {
    /// Consecutive failures (while closed) before tripping open.
    pub failure_threshold: u32,
    /// Consecutive successes (while half-open) before closing again.
    pub success_threshold: u32,
    /// How long the breaker stays open before allowing a trial call.
    #[serde(with = "humantime_serde")]
    pub timeout: Duration,
}

impl Default for BreakerConfig {
    fn default() -> Self {
        Self {
            failure_threshold: 5,
            success_threshold: 2,
            timeout: Duration::from_secs(30),
        }
    }
}

/// Tracks one sub-exporter's health for [`crate::multi::MultiExporter`].
pub struct CircuitBreaker {
    config: BreakerConfig,
    state: BreakerState,
    failure_count: u32,
    success_count: u32,
}

impl CircuitBreaker {
    /// Builds a breaker in the `Closed` state.
    #[must_use]
    pub fn new(config: BreakerConfig) -> Self {
        Self {
            config,
            state: BreakerState::Closed,
            failure_count: 0,
            success_count: 0,
        }
    }

    /// Whether a call should currently be attempted. `Open` transitions to
    /// `HalfOpen` (and returns `true`, admitting the trial call) once its
    /// timeout has elapsed.
    pub fn should_attempt(&mut self) -> bool {
        match self.state {
            BreakerState::Closed | BreakerState::HalfOpen => true,
            BreakerState::Open { until } => {
                if Instant::now() >= until {
                    tracing::debug!("circuit breaker half-opening after timeout");
                    self.state = BreakerState::HalfOpen;
                    self.success_count = 0;
                    true
                } else {
                    false
                }
            }
        }
    }

    /// Records a successful call.
    pub fn record_success(&mut self) {
        match self.state {
            BreakerState::Closed => {
                self.failure_count = 0;
            }
            BreakerState::HalfOpen => {
                self.success_count += 1;
                if self.success_count >= self.config.success_threshold {
                    tracing::debug!("circuit breaker closing after successful trial calls");
                    self.state = BreakerState::Closed;
                    self.failure_count = 0;
                    self.success_count = 0;
                }
            }
            BreakerState::Open { .. } => {}
        }
    }

    /// Records a failed call.
    pub fn record_failure(&mut self) {
        match self.state {
            BreakerState::Closed => {
                self.failure_count += 1;
                if self.failure_count >= self.config.failure_threshold {
                    self.trip();
                }
            }
            BreakerState::HalfOpen => {
                self.trip();
            }
            BreakerState::Open { .. } => {}
        }
    }

    fn trip(&mut self) {
        tracing::warn!("circuit breaker tripping open");
        self.state = BreakerState::Open {
            until: Instant::now() + self.config.timeout,
        };
        self.failure_count = 0;
        self.success_count = 0;
    }

    /// The breaker's current state.
    #[must_use]
    pub fn state(&self) -> BreakerState {
        self.state
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn trips_open_after_threshold_failures() {
        let mut breaker = CircuitBreaker::new(BreakerConfig {
            failure_threshold: 3,
            ..BreakerConfig::default()
        });
        for _ in 0..2 {
            assert!(breaker.should_attempt());
            breaker.record_failure();
        }
        assert!(matches!(breaker.state(), BreakerState::Closed));
        assert!(breaker.should_attempt());
        breaker.record_failure();
        assert!(matches!(breaker.state(), BreakerState::Open { .. }));
        assert!(!breaker.should_attempt());
    }

    #[test]
    fn half_open_trial_failure_reopens_immediately() {
        let mut breaker = CircuitBreaker::new(BreakerConfig {
            failure_threshold: 1,
            timeout: Duration::from_millis(0),
            ..BreakerConfig::default()
        });
        breaker.record_failure();
        assert!(breaker.should_attempt()); // half-opens immediately (zero timeout)
        breaker.record_failure();
        assert!(matches!(breaker.state(), BreakerState::Open { .. }));
    }

    #[test]
    fn half_open_closes_after_success_threshold() {
        let mut breaker = CircuitBreaker::new(BreakerConfig {
            failure_threshold: 1,
            success_threshold: 2,
            timeout: Duration::from_millis(0),
        });
        breaker.record_failure();
        assert!(breaker.should_attempt());
        breaker.record_success();
        assert!(matches!(breaker.state(), BreakerState::HalfOpen));
        breaker.record_success();
        assert!(matches!(breaker.state(), BreakerState::Closed));
    }
}
