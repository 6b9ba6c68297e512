//! The safety monitor: an atomic reserve -> confirm/cancel -> release
//! protocol layered over the per-kind policies in [`crate::limits::Limits`],
//! backed by a bounded registry that doubles as leak detector and
//! consistency-audit source of truth.
//!
//! Grounded on the teacher's `Admitter` reserve-then-confirm shape
//! (`admitter.rs`) and its heartbeat-driven liveness check (`heartbeat.rs`),
//! generalized from one counter to the nine tracked [`ResourceKind`]s and
//! given an explicit watchdog/emergency-shutdown escape hatch.

use crate::error::SafetyError;
use crate::handle::{
    Reservation, ResourceHandle, RESERVATION_CANCELLED, RESERVATION_CONFIRMED, RESERVATION_PENDING,
};
use crate::limits::Limits;
use crate::probe::{HostProbe, SystemProbe};
use crate::registry::{LruRegistry, ResourceLeak};
use crate::watchdog::Watchdog;
use parking_lot::Mutex;
use pipelinekit_config::ResourceKind;
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicU8, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinSet;

const KIND_COUNT: usize = ResourceKind::ALL.len();

fn kind_index(kind: ResourceKind) -> usize {
    ResourceKind::ALL
        .iter()
        .position(|&k| k == kind)
        .expect("ResourceKind::ALL enumerates every kind")
}

/// Tunables for the monitor's bookkeeping, separate from the per-kind
/// admission policy in [`Limits`].
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct MonitorConfig {
    /// How long an unconfirmed reservation may sit before it is auto-cancelled.
    #[serde(with = "humantime_serde")]
    pub reservation_timeout: Duration,
    /// Maximum number of confirmed entries the registry retains.
    pub registry_capacity: usize,
    /// Age past which a confirmed entry is reported by [`SafetyMonitor::scan_leaks`].
    #[serde(with = "humantime_serde")]
    pub leak_threshold: Duration,
}

impl Default for MonitorConfig {
    fn default() -> Self {
        Self {
            reservation_timeout: Duration::from_secs(5),
            registry_capacity: 10_000,
            leak_threshold: Duration::from_secs(300),
        }
    }
}

/// One line item of a [`ConsistencyReport`]: a kind whose atomic counter
/// disagreed with the registry's own tally.
#[derive(Debug, Clone, Copy)]
pub struct Mismatch {
    /// The kind whose counters disagreed.
    pub kind: ResourceKind,
    /// What the atomic `allocated` counter said.
    pub counter_value: u64,
    /// What the registry (source of truth) said.
    pub registry_value: u64,
    /// Whether the counter was rewritten to match the registry.
    pub repaired: bool,
}

/// The result of [`SafetyMonitor::check_consistency`].
#[derive(Debug, Clone, Default)]
pub struct ConsistencyReport {
    /// Every kind found to disagree between the counter and the registry.
    pub mismatches: Vec<Mismatch>,
}

impl ConsistencyReport {
    /// Whether every kind's counter agreed with the registry.
    #[must_use]
    pub fn is_consistent(&self) -> bool {
        self.mismatches.is_empty()
    }
}

pub(crate) struct Inner {
    limits: Limits,
    config: MonitorConfig,
    probe: Box<dyn SystemProbe>,
    allocated: [AtomicU64; KIND_COUNT],
    pending: [AtomicU64; KIND_COUNT],
    next_id: AtomicU64,
    registry: Mutex<LruRegistry>,
    shutdown: AtomicBool,
}

impl Inner {
    pub(crate) fn release(&self, id: u64, kind: ResourceKind) {
        if let Some((_, count)) = self.registry.lock().remove(id) {
            self.allocated[kind_index(kind)].fetch_sub(count, Ordering::AcqRel);
        }
    }
}

/// A shutdown callback registered with [`SafetyMonitor::on_emergency_shutdown`].
pub type ShutdownHandler = Arc<dyn Fn() + Send + Sync>;

/// Guards every [`ResourceKind`] against exhaustion via an atomic
/// reserve -> confirm/cancel protocol, with leak detection and a
/// consistency audit against its own bookkeeping.
pub struct SafetyMonitor {
    inner: Arc<Inner>,
    watchdog: Mutex<Option<Watchdog>>,
    shutdown_handlers: Mutex<Vec<ShutdownHandler>>,
}

impl SafetyMonitor {
    /// Builds a monitor using the real host probe.
    #[must_use]
    pub fn new(limits: Limits, config: MonitorConfig) -> Arc<Self> {
        Self::with_probe(limits, config, Box::new(HostProbe::new()))
    }

    /// Builds a monitor over a caller-supplied probe (a [`crate::probe::FixedProbe`]
    /// in tests).
    #[must_use]
    pub fn with_probe(
        limits: Limits,
        config: MonitorConfig,
        probe: Box<dyn SystemProbe>,
    ) -> Arc<Self> {
        Arc::new(Self {
            inner: Arc::new(Inner {
                limits,
                registry: Mutex::new(LruRegistry::new(config.registry_capacity)),
                config,
                probe,
                allocated: std::array::from_fn(|_| AtomicU64::new(0)),
                pending: std::array::from_fn(|_| AtomicU64::new(0)),
                next_id: AtomicU64::new(1),
                shutdown: AtomicBool::new(false),
            }),
            watchdog: Mutex::new(None),
            shutdown_handlers: Mutex::new(Vec::new()),
        })
    }

    /// Speculatively reserves `count` units of `kind`. The reservation must
    /// be resolved with [`confirm`](Self::confirm) or [`cancel`](Self::cancel)
    /// within the configured timeout or it is auto-cancelled and its pending
    /// units released.
    ///
    /// The admission check runs *after* the pending counter has already been
    /// bumped, so a concurrent reservation racing this one is always
    /// reflected in the projected total — closing the classic
    /// check-then-act gap where two reservations could each see room for
    /// one more unit and together overshoot the limit.
    pub fn reserve(self: &Arc<Self>, kind: ResourceKind, count: u64) -> Result<Reservation, SafetyError> {
        if self.inner.shutdown.load(Ordering::Acquire) {
            return Err(SafetyError::Shutdown);
        }
        let idx = kind_index(kind);
        let pending_before = self.inner.pending[idx].fetch_add(count, Ordering::AcqRel);
        let current = self.inner.allocated[idx].load(Ordering::Acquire);
        if let Err(err) = self
            .inner
            .limits
            .check(kind, current, pending_before, count, self.inner.probe.as_ref())
        {
            self.inner.pending[idx].fetch_sub(count, Ordering::AcqRel);
            return Err(err);
        }

        let id = self.inner.next_id.fetch_add(1, Ordering::Relaxed);
        let state = Arc::new(AtomicU8::new(RESERVATION_PENDING));
        let inner = Arc::clone(&self.inner);
        let timer_state = Arc::clone(&state);
        let timeout = self.inner.config.reservation_timeout;
        tokio::spawn(async move {
            tokio::time::sleep(timeout).await;
            if timer_state
                .compare_exchange(
                    RESERVATION_PENDING,
                    RESERVATION_CANCELLED,
                    Ordering::AcqRel,
                    Ordering::Acquire,
                )
                .is_ok()
            {
                inner.pending[idx].fetch_sub(count, Ordering::AcqRel);
                tracing::warn!(kind = %kind, id, "reservation auto-cancelled: confirmation timeout elapsed");
            }
        });

        Ok(Reservation {
            id,
            kind,
            count,
            state,
            created_at: std::time::Instant::now(),
        })
    }

    /// Confirms a reservation, converting its pending units into allocated
    /// ones and registering it for leak detection. Returns an error if the
    /// reservation already timed out.
    pub fn confirm(&self, reservation: Reservation) -> Result<ResourceHandle, SafetyError> {
        if !reservation.try_claim(RESERVATION_CONFIRMED) {
            return Err(SafetyError::ReservationTimeout);
        }
        let idx = kind_index(reservation.kind);
        self.inner.pending[idx].fetch_sub(reservation.count, Ordering::AcqRel);
        self.inner.allocated[idx].fetch_add(reservation.count, Ordering::AcqRel);

        let evicted = self
            .inner
            .registry
            .lock()
            .insert(reservation.id, reservation.kind, reservation.count);
        if let Some(evicted) = evicted {
            self.inner.allocated[kind_index(evicted.kind)].fetch_sub(evicted.count, Ordering::AcqRel);
            tracing::warn!(
                kind = %evicted.kind,
                id = evicted.id,
                age_secs = evicted.age.as_secs_f64(),
                "registry at capacity: evicted oldest confirmed reservation"
            );
        }

        Ok(ResourceHandle {
            id: reservation.id,
            kind: reservation.kind,
            monitor: Arc::clone(&self.inner),
            released: std::cell::Cell::new(false),
        })
    }

    /// Cancels a reservation, releasing its pending units. No-op if the
    /// reservation already timed out or was already resolved.
    pub fn cancel(&self, reservation: Reservation) {
        if reservation.try_claim(RESERVATION_CANCELLED) {
            let idx = kind_index(reservation.kind);
            self.inner.pending[idx].fetch_sub(reservation.count, Ordering::AcqRel);
        }
    }

    /// Currently allocated (confirmed) units of `kind`.
    #[must_use]
    pub fn allocated(&self, kind: ResourceKind) -> u64 {
        self.inner.allocated[kind_index(kind)].load(Ordering::Acquire)
    }

    /// Currently pending (reserved, unconfirmed) units of `kind`.
    #[must_use]
    pub fn pending(&self, kind: ResourceKind) -> u64 {
        self.inner.pending[kind_index(kind)].load(Ordering::Acquire)
    }

    /// Scans the registry for confirmed entries older than the configured
    /// leak threshold. Reports only — does not release them, since a
    /// long-lived but legitimate allocation is indistinguishable from a leak
    /// without application-level context.
    #[must_use]
    pub fn scan_leaks(&self) -> Vec<ResourceLeak> {
        self.inner
            .registry
            .lock()
            .leaks_older_than(self.inner.config.leak_threshold)
    }

    /// Compares each kind's `allocated` counter against the registry's own
    /// tally of confirmed units, optionally repairing drift by rewriting the
    /// counter to match the registry.
    pub fn check_consistency(&self, repair: bool) -> ConsistencyReport {
        let registry = self.inner.registry.lock();
        let mut mismatches = Vec::new();
        for kind in ResourceKind::ALL {
            let counter_value = self.inner.allocated[kind_index(kind)].load(Ordering::Acquire);
            let registry_value = registry.units_by_kind(kind);
            if counter_value != registry_value {
                if repair {
                    self.inner.allocated[kind_index(kind)]
                        .store(registry_value, Ordering::Release);
                }
                mismatches.push(Mismatch {
                    kind,
                    counter_value,
                    registry_value,
                    repaired: repair,
                });
            }
        }
        ConsistencyReport { mismatches }
    }

    /// Registers a callback invoked (alongside every other registered
    /// handler, concurrently) when [`emergency_shutdown`](Self::emergency_shutdown)
    /// runs.
    pub fn on_emergency_shutdown(&self, handler: ShutdownHandler) {
        self.shutdown_handlers.lock().push(handler);
    }

    /// Arms a watchdog that trips [`emergency_shutdown`](Self::emergency_shutdown)
    /// if not [`pet`](Self::pet_watchdog) within `timeout`.
    pub fn arm_watchdog(self: &Arc<Self>, timeout: Duration) {
        let monitor = Arc::clone(self);
        let watchdog = Watchdog::arm(timeout, move || {
            tracing::error!("watchdog expired without a pet: tripping emergency shutdown");
            let monitor = Arc::clone(&monitor);
            tokio::spawn(async move { monitor.emergency_shutdown().await });
        });
        *self.watchdog.lock() = Some(watchdog);
    }

    /// Extends the armed watchdog's deadline. No-op if no watchdog is armed.
    pub fn pet_watchdog(&self, extend_by: Duration) {
        if let Some(watchdog) = self.watchdog.lock().as_ref() {
            watchdog.pet(extend_by);
        }
    }

    /// Whether the monitor has entered emergency shutdown and is rejecting
    /// new reservations.
    #[must_use]
    pub fn is_shutdown(&self) -> bool {
        self.inner.shutdown.load(Ordering::Acquire)
    }

    /// Trips emergency shutdown: marks the monitor as rejecting all future
    /// reservations, disarms the watchdog, and invokes every registered
    /// shutdown handler concurrently, waiting for all of them to finish.
    pub async fn emergency_shutdown(&self) {
        if self.inner.shutdown.swap(true, Ordering::AcqRel) {
            return;
        }
        tracing::error!("safety monitor entering emergency shutdown");
        if let Some(watchdog) = self.watchdog.lock().take() {
            watchdog.disarm();
        }
        let handlers = self.shutdown_handlers.lock().clone();
        let mut tasks = JoinSet::new();
        for handler in handlers {
            tasks.spawn(async move { handler() });
        }
        while tasks.join_next().await.is_some() {}
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::probe::FixedProbe;

    fn ample_probe() -> FixedProbe {
        FixedProbe {
            system_memory_bytes: 16 * 1024 * 1024 * 1024,
            process_memory_bytes: 1024 * 1024 * 1024,
            rlimit_nofile: 4096,
            system_fd_usage: 0,
        }
    }

    fn monitor_with(limits: Limits, config: MonitorConfig) -> Arc<SafetyMonitor> {
        SafetyMonitor::with_probe(limits, config, Box::new(ample_probe()))
    }

    #[tokio::test]
    async fn confirm_moves_pending_into_allocated() {
        let monitor = monitor_with(Limits::default(), MonitorConfig::default());
        let reservation = monitor.reserve(ResourceKind::Lock, 3).unwrap();
        assert_eq!(monitor.pending(ResourceKind::Lock), 3);
        let handle = monitor.confirm(reservation).unwrap();
        assert_eq!(monitor.pending(ResourceKind::Lock), 0);
        assert_eq!(monitor.allocated(ResourceKind::Lock), 3);
        drop(handle);
        assert_eq!(monitor.allocated(ResourceKind::Lock), 0);
    }

    #[tokio::test]
    async fn cancel_releases_pending_units() {
        let monitor = monitor_with(Limits::default(), MonitorConfig::default());
        let reservation = monitor.reserve(ResourceKind::Lock, 5).unwrap();
        monitor.cancel(reservation);
        assert_eq!(monitor.pending(ResourceKind::Lock), 0);
        assert_eq!(monitor.allocated(ResourceKind::Lock), 0);
    }

    #[tokio::test]
    async fn reserve_past_the_hard_cap_is_rejected_and_rolls_back_pending() {
        let monitor = monitor_with(Limits::default(), MonitorConfig::default());
        let err = monitor
            .reserve(ResourceKind::Lock, Limits::default().lock_hard_cap + 1)
            .unwrap_err();
        assert!(matches!(err, SafetyError::ResourceExhausted { .. }));
        assert_eq!(monitor.pending(ResourceKind::Lock), 0);
    }

    #[tokio::test]
    async fn two_concurrent_reservations_cannot_together_overshoot_the_cap() {
        // The literal TOCTOU scenario: a cap of 10, two reservations of 6
        // each. Naive check-then-act admission would pass both (6 <= 10 seen
        // independently); reserving pending before checking ensures the
        // second sees the first's six already counted and is rejected.
        let limits = Limits {
            lock_hard_cap: 10,
            ..Limits::default()
        };
        let monitor = monitor_with(limits, MonitorConfig::default());
        let first = monitor.reserve(ResourceKind::Lock, 6).unwrap();
        let second = monitor.reserve(ResourceKind::Lock, 6);
        assert!(second.is_err());
        assert_eq!(monitor.pending(ResourceKind::Lock), 6);
        monitor.cancel(first);
    }

    #[tokio::test]
    async fn confirming_an_already_timed_out_reservation_fails() {
        let monitor = monitor_with(
            Limits::default(),
            MonitorConfig {
                reservation_timeout: Duration::from_millis(1),
                ..MonitorConfig::default()
            },
        );
        let reservation = monitor.reserve(ResourceKind::Task, 1).unwrap();
        tokio::time::sleep(Duration::from_millis(20)).await;
        let err = monitor.confirm(reservation).unwrap_err();
        assert!(matches!(err, SafetyError::ReservationTimeout));
        assert_eq!(monitor.pending(ResourceKind::Task), 0);
    }

    #[tokio::test]
    async fn leak_scan_reports_old_confirmed_entries_without_releasing_them() {
        let monitor = monitor_with(
            Limits::default(),
            MonitorConfig {
                leak_threshold: Duration::from_secs(0),
                ..MonitorConfig::default()
            },
        );
        let reservation = monitor.reserve(ResourceKind::Actor, 1).unwrap();
        let handle = monitor.confirm(reservation).unwrap();
        let leaks = monitor.scan_leaks();
        assert_eq!(leaks.len(), 1);
        assert_eq!(monitor.allocated(ResourceKind::Actor), 1);
        drop(handle);
    }

    #[tokio::test]
    async fn consistency_audit_detects_and_repairs_drift() {
        let monitor = monitor_with(Limits::default(), MonitorConfig::default());
        let reservation = monitor.reserve(ResourceKind::Socket, 2).unwrap();
        let _handle = monitor.confirm(reservation).unwrap();
        // Manually desync the counter from the registry.
        monitor.inner.allocated[kind_index(ResourceKind::Socket)]
            .fetch_add(10, Ordering::AcqRel);

        let report = monitor.check_consistency(false);
        assert!(!report.is_consistent());
        assert_eq!(monitor.allocated(ResourceKind::Socket), 12);

        let repaired = monitor.check_consistency(true);
        assert!(!repaired.is_consistent());
        assert_eq!(monitor.allocated(ResourceKind::Socket), 2);
        assert!(monitor.check_consistency(false).is_consistent());
    }

    #[tokio::test]
    async fn emergency_shutdown_rejects_future_reservations_and_runs_handlers() {
        let monitor = monitor_with(Limits::default(), MonitorConfig::default());
        let ran = Arc::new(AtomicBool::new(false));
        let flag = Arc::clone(&ran);
        monitor.on_emergency_shutdown(Arc::new(move || {
            flag.store(true, Ordering::SeqCst);
        }));
        monitor.emergency_shutdown().await;
        assert!(ran.load(Ordering::SeqCst));
        assert!(monitor.is_shutdown());
        let err = monitor.reserve(ResourceKind::Lock, 1).unwrap_err();
        assert!(matches!(err, SafetyError::Shutdown));
    }
}
