//! The pending [`Reservation`] and confirmed [`ResourceHandle`] halves of the
//! reserve -> confirm/cancel -> release protocol.

use crate::monitor::Inner;
use pipelinekit_config::ResourceKind;
use std::sync::atomic::{AtomicU8, Ordering};
use std::sync::Arc;
use std::time::Instant;

pub(crate) const RESERVATION_PENDING: u8 = 0;
pub(crate) const RESERVATION_CONFIRMED: u8 = 1;
pub(crate) const RESERVATION_CANCELLED: u8 = 2;

/// A speculative hold on `count` units of `kind`, returned by
/// [`crate::monitor::SafetyMonitor::reserve`]. Must be resolved with
/// `confirm` or `cancel` before its timeout elapses, or it is cancelled
/// automatically and its pending units released.
pub struct Reservation {
    pub(crate) id: u64,
    pub(crate) kind: ResourceKind,
    pub(crate) count: u64,
    pub(crate) state: Arc<AtomicU8>,
    pub(crate) created_at: Instant,
}

impl Reservation {
    /// The reservation's unique id, stable across confirm into the
    /// eventual [`ResourceHandle`].
    #[must_use]
    pub fn id(&self) -> u64 {
        self.id
    }

    /// The resource kind this reservation holds.
    #[must_use]
    pub fn kind(&self) -> ResourceKind {
        self.kind
    }

    /// The number of units reserved.
    #[must_use]
    pub fn count(&self) -> u64 {
        self.count
    }

    /// Time elapsed since the reservation was created.
    #[must_use]
    pub fn age(&self) -> std::time::Duration {
        self.created_at.elapsed()
    }

    pub(crate) fn try_claim(&self, to: u8) -> bool {
        self.state
            .compare_exchange(RESERVATION_PENDING, to, Ordering::AcqRel, Ordering::Acquire)
            .is_ok()
    }
}

/// An RAII handle over a confirmed reservation. Units held by the handle are
/// released back to the monitor on drop (or explicitly via [`ResourceHandle::release`]).
pub struct ResourceHandle {
    pub(crate) id: u64,
    pub(crate) kind: ResourceKind,
    pub(crate) monitor: Arc<Inner>,
    pub(crate) released: std::cell::Cell<bool>,
}

impl ResourceHandle {
    /// The id of the reservation this handle confirmed.
    #[must_use]
    pub fn id(&self) -> u64 {
        self.id
    }

    /// The resource kind held by this handle.
    #[must_use]
    pub fn kind(&self) -> ResourceKind {
        self.kind
    }

    /// Releases the held units back to the monitor. Idempotent: calling this
    /// more than once (or calling it then dropping the handle) only releases
    /// once.
    pub fn release(&self) {
        if !self.released.replace(true) {
            self.monitor.release(self.id, self.kind);
        }
    }
}

impl Drop for ResourceHandle {
    fn drop(&mut self) {
        self.release();
    }
}
