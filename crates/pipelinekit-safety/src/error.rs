//! Failure modes for the reservation protocol.

use pipelinekit_config::ResourceKind;

/// Why a reservation or confirmation failed.
#[derive(Debug, Clone, Copy, PartialEq, thiserror::Error)]
pub enum SafetyError {
    /// Admitting the requested count would exceed the per-kind limit.
    #[error("resource exhausted: {kind} limit is {limit}")]
    ResourceExhausted {
        /// Which resource kind was exhausted.
        kind: ResourceKind,
        /// The limit that would have been exceeded.
        limit: f64,
    },
    /// The monitor has entered emergency shutdown; no new reservations are
    /// accepted.
    #[error("safety monitor is shut down")]
    Shutdown,
    /// The reservation's timeout elapsed before it was confirmed or
    /// cancelled.
    #[error("reservation timed out before confirmation")]
    ReservationTimeout,
}
