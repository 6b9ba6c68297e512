//! Priority-aware admission semaphore.
//!
//! Follows the guard/`Inner`/`Arc` shape of the teacher's single-threaded
//! admission controller, generalized to a multi-threaded, async-aware
//! semaphore with a priority queue and configurable overflow strategy.

use crate::error::BackpressureError;
use crate::token::Token;
use pipelinekit_config::{BackpressureStrategy, Priority};
use std::collections::VecDeque;
use std::sync::atomic::{AtomicU64, AtomicU8, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{oneshot, Notify};

const WAITER_PENDING: u8 = 0;
const WAITER_GRANTED: u8 = 1;
const WAITER_CANCELLED: u8 = 2;
const WAITER_EVICTED: u8 = 3;

/// Runs whenever a queued `acquire` call stops waiting without having
/// observed a grant — including the calling task itself being dropped
/// mid-`await`, which is otherwise invisible to the rest of this module.
///
/// On drop there are three possibilities: the waiter is still pending
/// (claim the cancellation and release its reserved queue memory), it has
/// already been granted by a racing `release_one` (forward the capacity to
/// the next waiter rather than leaking it), or it was evicted by a
/// `DropOldest` admission (the evictor already released its queue memory
/// and dropped its sender, so this guard has nothing left to do).
/// [`CancelGuard::disarm`] is called on the success path so a normal,
/// completed acquisition does none of these.
struct CancelGuard {
    inner: Arc<Inner>,
    waiter_state: Arc<AtomicU8>,
    estimated_size: u64,
    armed: bool,
}

impl CancelGuard {
    fn disarm(mut self) {
        self.armed = false;
    }
}

impl Drop for CancelGuard {
    fn drop(&mut self) {
        if !self.armed {
            return;
        }
        match self.waiter_state.compare_exchange(
            WAITER_PENDING,
            WAITER_CANCELLED,
            Ordering::SeqCst,
            Ordering::SeqCst,
        ) {
            Ok(_) => {
                let mut state = self.inner.state.lock();
                state.queued_memory = state.queued_memory.saturating_sub(self.estimated_size);
            }
            Err(WAITER_GRANTED) => self.inner.release_one(),
            Err(_) => {
                // WAITER_EVICTED: the DropOldest evictor already released
                // this waiter's queue memory and dropped its sender.
            }
        }
    }
}

struct Waiter {
    estimated_size: u64,
    state: Arc<AtomicU8>,
    sender: oneshot::Sender<()>,
}

struct State {
    in_use: usize,
    /// One FIFO queue per priority level, indexed `Low=0 .. Critical=3`.
    queues: [VecDeque<Waiter>; 4],
    queued_memory: u64,
}

impl State {
    fn queued_count(&self) -> usize {
        self.queues.iter().map(VecDeque::len).sum()
    }

    fn priority_index(priority: Priority) -> usize {
        match priority {
            Priority::Low => 0,
            Priority::Normal => 1,
            Priority::High => 2,
            Priority::Critical => 3,
        }
    }

    /// Removes and returns the id of the single oldest-queued waiter across
    /// all priorities (used by `DropOldest`): the front of the lowest
    /// non-empty priority queue.
    fn pop_oldest(&mut self) -> Option<Waiter> {
        for queue in &mut self.queues {
            if let Some(w) = queue.pop_front() {
                return Some(w);
            }
        }
        None
    }

    /// Removes and returns the next waiter to service: the front of the
    /// highest non-empty priority queue.
    fn pop_next(&mut self) -> Option<Waiter> {
        for queue in self.queues.iter_mut().rev() {
            if let Some(w) = queue.pop_front() {
                return Some(w);
            }
        }
        None
    }
}

pub(crate) struct Inner {
    max_concurrency: usize,
    max_outstanding: usize,
    max_queue_memory: Option<u64>,
    strategy: BackpressureStrategy,
    state: parking_lot::Mutex<State>,
    notify_capacity: Notify,
    next_token_id: AtomicU64,
}

impl Inner {
    pub(crate) fn release_one(&self) {
        let mut state = self.state.lock();
        loop {
            match state.pop_next() {
                None => {
                    state.in_use = state.in_use.saturating_sub(1);
                    break;
                }
                Some(waiter) => {
                    // Exactly-once: only fire if nobody else (a timeout or
                    // cancellation) already claimed this waiter.
                    if waiter
                        .state
                        .compare_exchange(
                            WAITER_PENDING,
                            WAITER_GRANTED,
                            Ordering::SeqCst,
                            Ordering::SeqCst,
                        )
                        .is_ok()
                    {
                        state.queued_memory = state.queued_memory.saturating_sub(waiter.estimated_size);
                        let _ = waiter.sender.send(());
                        // in_use stays the same: the released slot passes
                        // directly to the woken waiter.
                        break;
                    }
                    // Waiter already cancelled/timed out; its memory was
                    // released when that happened. Keep looking.
                }
            }
        }
        self.notify_capacity.notify_waiters();
    }

    fn outstanding(&self, state: &State) -> usize {
        state.in_use + state.queued_count()
    }

    fn memory_would_overflow(&self, state: &State, estimated_size: u64) -> bool {
        match self.max_queue_memory {
            Some(limit) => state.queued_memory + estimated_size > limit,
            None => false,
        }
    }
}

/// A priority-aware semaphore enforcing both `max_concurrency` (simultaneous
/// token holders) and `max_outstanding` (held plus queued).
#[derive(Clone)]
pub struct Semaphore {
    inner: Arc<Inner>,
}

/// Point-in-time observability snapshot.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SemaphoreStats {
    /// Tokens currently held.
    pub in_use: usize,
    /// Free concurrency slots (`max_concurrency - in_use`).
    pub available: usize,
    /// Waiters currently queued across all priorities.
    pub queued: usize,
    /// `max_concurrency` this semaphore was constructed with.
    pub max_concurrency: usize,
    /// `max_outstanding` this semaphore was constructed with.
    pub max_outstanding: usize,
}

/// Cheap liveness probe, distinct from [`SemaphoreStats`] so hot paths don't
/// have to pay for the full snapshot.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct HealthCheck {
    /// `false` once the queue is completely saturated (`queued >= max_outstanding - in_use`).
    pub healthy: bool,
    /// `queued / max_outstanding`, in `[0, 1]`.
    pub queue_utilization: f64,
}

impl Semaphore {
    /// Builds a semaphore with the given concurrency/outstanding caps,
    /// overflow strategy, and optional queue memory bound.
    #[must_use]
    pub fn new(
        max_concurrency: usize,
        max_outstanding: usize,
        strategy: BackpressureStrategy,
        max_queue_memory: Option<u64>,
    ) -> Self {
        Self {
            inner: Arc::new(Inner {
                max_concurrency,
                max_outstanding,
                max_queue_memory,
                strategy,
                state: parking_lot::Mutex::new(State {
                    in_use: 0,
                    queues: [
                        VecDeque::new(),
                        VecDeque::new(),
                        VecDeque::new(),
                        VecDeque::new(),
                    ],
                    queued_memory: 0,
                }),
                notify_capacity: Notify::new(),
                next_token_id: AtomicU64::new(1),
            }),
        }
    }

    fn grant(&self, estimated_size: u64) -> Token {
        let id = self.inner.next_token_id.fetch_add(1, Ordering::Relaxed);
        Token {
            id,
            estimated_size,
            inner: Arc::clone(&self.inner),
            released: std::cell::Cell::new(false),
        }
    }

    /// Attempts to acquire a token, respecting priority ordering, the
    /// configured back-pressure strategy, and an optional `timeout`.
    ///
    /// Returns `Ok(None)` if `timeout` elapsed without a grant. A `timeout`
    /// of `Duration::ZERO` fails (returns `Ok(None)`) immediately unless a
    /// slot is available right now.
    pub async fn acquire(
        &self,
        priority: Priority,
        estimated_size: u64,
        timeout: Option<Duration>,
    ) -> Result<Option<Token>, BackpressureError> {
        loop {
            let mut state = self.inner.state.lock();
            if state.in_use < self.inner.max_concurrency && state.queued_count() == 0 {
                state.in_use += 1;
                drop(state);
                return Ok(Some(self.grant(estimated_size)));
            }

            let would_overflow_count = self.inner.outstanding(&state) >= self.inner.max_outstanding;
            let would_overflow_memory = self.inner.memory_would_overflow(&state, estimated_size);

            if would_overflow_count || would_overflow_memory {
                match self.inner.strategy {
                    BackpressureStrategy::Error => {
                        return Err(if would_overflow_memory {
                            BackpressureError::MemoryLimitExceeded
                        } else {
                            BackpressureError::QueueFull
                        });
                    }
                    BackpressureStrategy::DropNewest => {
                        return Err(BackpressureError::Dropped);
                    }
                    BackpressureStrategy::DropOldest => {
                        if let Some(evicted) = state.pop_oldest() {
                            if evicted
                                .state
                                .compare_exchange(
                                    WAITER_PENDING,
                                    WAITER_EVICTED,
                                    Ordering::SeqCst,
                                    Ordering::SeqCst,
                                )
                                .is_ok()
                            {
                                state.queued_memory =
                                    state.queued_memory.saturating_sub(evicted.estimated_size);
                                drop(evicted.sender);
                            }
                        }
                        // fall through: enqueue the newcomer below.
                    }
                    BackpressureStrategy::Suspend => {
                        drop(state);
                        self.inner.notify_capacity.notified().await;
                        continue;
                    }
                }
            }

            // A zero timeout never actually waits, so there is no point
            // enqueueing a waiter that would just have to be cancelled again
            // immediately: fail now, before anyone can observe it queued.
            if matches!(timeout, Some(d) if d.is_zero()) {
                drop(state);
                return Ok(None);
            }

            let (tx, rx) = oneshot::channel();
            let waiter_state = Arc::new(AtomicU8::new(WAITER_PENDING));
            let idx = State::priority_index(priority);
            state.queues[idx].push_back(Waiter {
                estimated_size,
                state: Arc::clone(&waiter_state),
                sender: tx,
            });
            state.queued_memory += estimated_size;
            drop(state);

            // Lives across the await below. If this whole `acquire` call is
            // cancelled (the caller's task is dropped/aborted) before the
            // channel resolves, this guard's `Drop` still runs as the async
            // state machine unwinds, removing the waiter and releasing its
            // reserved memory exactly as an explicit cancellation would.
            let guard = CancelGuard {
                inner: Arc::clone(&self.inner),
                waiter_state: Arc::clone(&waiter_state),
                estimated_size,
                armed: true,
            };

            let result = match timeout {
                Some(d) => tokio::time::timeout(d, rx).await.map_err(|_| ()).and_then(|r| r.map_err(|_| ())),
                None => rx.await.map_err(|_| ()),
            };

            match result {
                Ok(()) => {
                    guard.disarm();
                    return Ok(Some(self.grant(estimated_size)));
                }
                Err(()) => {
                    // Timed out or evicted (`DropOldest`). The guard's drop
                    // claims the cancellation (releasing queue memory) unless
                    // a racing `release_one` already granted this waiter in
                    // the same instant, in which case it forwards the
                    // capacity on instead of leaking it.
                    drop(guard);
                    if timeout.is_some() {
                        return Ok(None);
                    }
                    return Err(BackpressureError::Dropped);
                }
            }
        }
    }

    /// A read-only snapshot of current occupancy.
    #[must_use]
    pub fn stats(&self) -> SemaphoreStats {
        let state = self.inner.state.lock();
        SemaphoreStats {
            in_use: state.in_use,
            available: self.inner.max_concurrency.saturating_sub(state.in_use),
            queued: state.queued_count(),
            max_concurrency: self.inner.max_concurrency,
            max_outstanding: self.inner.max_outstanding,
        }
    }

    /// A cheap liveness probe.
    #[must_use]
    pub fn health_check(&self) -> HealthCheck {
        let stats = self.stats();
        let queue_utilization = if self.inner.max_outstanding == 0 {
            0.0
        } else {
            stats.queued as f64 / self.inner.max_outstanding as f64
        };
        HealthCheck {
            healthy: stats.in_use + stats.queued < self.inner.max_outstanding,
            queue_utilization,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pipelinekit_config::BackpressureStrategy;

    #[tokio::test]
    async fn grants_up_to_max_concurrency_immediately() {
        let sem = Semaphore::new(2, 10, BackpressureStrategy::Suspend, None);
        let a = sem.acquire(Priority::Normal, 0, None).await.unwrap();
        let b = sem.acquire(Priority::Normal, 0, None).await.unwrap();
        assert!(a.is_some());
        assert!(b.is_some());
        assert_eq!(sem.stats().in_use, 2);
    }

    #[tokio::test]
    async fn zero_timeout_fails_immediately_when_saturated() {
        let sem = Semaphore::new(1, 10, BackpressureStrategy::Suspend, None);
        let _held = sem.acquire(Priority::Normal, 0, None).await.unwrap().unwrap();
        let second = sem
            .acquire(Priority::Normal, 0, Some(Duration::ZERO))
            .await
            .unwrap();
        assert!(second.is_none());
    }

    #[tokio::test]
    async fn error_strategy_rejects_beyond_max_outstanding() {
        let sem = Semaphore::new(1, 1, BackpressureStrategy::Error, None);
        let _held = sem.acquire(Priority::Normal, 0, None).await.unwrap().unwrap();
        let err = sem.acquire(Priority::Normal, 0, None).await.unwrap_err();
        assert_eq!(err, BackpressureError::QueueFull);
    }

    #[tokio::test]
    async fn drop_newest_rejects_the_incoming_request() {
        let sem = Semaphore::new(1, 1, BackpressureStrategy::DropNewest, None);
        let _held = sem.acquire(Priority::Normal, 0, None).await.unwrap().unwrap();
        let err = sem.acquire(Priority::Normal, 0, None).await.unwrap_err();
        assert_eq!(err, BackpressureError::Dropped);
    }

    #[tokio::test]
    async fn release_wakes_highest_priority_waiter_first() {
        let sem = Semaphore::new(1, 10, BackpressureStrategy::Suspend, None);
        let held = sem.acquire(Priority::Normal, 0, None).await.unwrap().unwrap();

        let sem_low = sem.clone();
        let low = tokio::spawn(async move { sem_low.acquire(Priority::Low, 0, None).await });
        tokio::task::yield_now().await;
        let sem_crit = sem.clone();
        let critical =
            tokio::spawn(async move { sem_crit.acquire(Priority::Critical, 0, None).await });
        tokio::task::yield_now().await;

        held.release();

        let critical_token = critical.await.unwrap().unwrap();
        assert!(critical_token.is_some(), "critical waiter should be granted first");
        critical_token.unwrap().release();

        let low_token = low.await.unwrap().unwrap();
        assert!(low_token.is_some());
    }

    #[tokio::test]
    async fn memory_limit_rejects_when_estimated_size_would_overflow() {
        let sem = Semaphore::new(1, 10, BackpressureStrategy::Error, Some(100));
        let _held = sem.acquire(Priority::Normal, 0, None).await.unwrap().unwrap();
        let err = sem.acquire(Priority::Normal, 150, None).await.unwrap_err();
        assert_eq!(err, BackpressureError::MemoryLimitExceeded);
    }

    #[tokio::test]
    async fn token_release_is_idempotent() {
        let sem = Semaphore::new(1, 10, BackpressureStrategy::Suspend, None);
        let token = sem.acquire(Priority::Normal, 0, None).await.unwrap().unwrap();
        token.release();
        token.release();
        assert_eq!(sem.stats().in_use, 0);
    }

    #[tokio::test]
    async fn drop_oldest_eviction_does_not_leak_capacity_to_the_next_waiter() {
        let sem = Semaphore::new(1, 2, BackpressureStrategy::DropOldest, None);
        let held = sem.acquire(Priority::Normal, 0, None).await.unwrap().unwrap();

        let sem_first = sem.clone();
        let first = tokio::spawn(async move { sem_first.acquire(Priority::Normal, 0, None).await });
        tokio::task::yield_now().await;

        let sem_second = sem.clone();
        let second = tokio::spawn(async move { sem_second.acquire(Priority::Normal, 0, None).await });
        tokio::task::yield_now().await;

        // the incoming request above overflows max_outstanding, so the
        // first (oldest) waiter is evicted to make room for it.
        let first_result = first.await.unwrap();
        assert_eq!(first_result, Err(BackpressureError::Dropped));

        // give the evicted waiter's guard a chance to run its Drop.
        tokio::task::yield_now().await;
        tokio::task::yield_now().await;

        assert!(
            !second.is_finished(),
            "second waiter must not be granted a slot nobody released yet"
        );

        held.release();
        let second_token = second.await.unwrap().unwrap();
        assert!(second_token.is_some(), "released slot should pass to the surviving waiter");
        assert_eq!(sem.stats().in_use, 1);

        second_token.unwrap().release();
        assert_eq!(sem.stats().in_use, 0);
    }
}
