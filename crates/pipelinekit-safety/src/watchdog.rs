//! An optional liveness timer: if nobody "pets" it within its timeout, the
//! monitor it's attached to is tripped into emergency shutdown.
//!
//! Grounded on the teacher's heartbeat-driven liveness check in
//! `heartbeat.rs`, which compares a last-seen timestamp against a deadline on
//! an interval timer; generalized here into a standalone petted timer so the
//! safety monitor can arm/disarm it independently of any particular heartbeat
//! source.

use parking_lot::Mutex;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::task::JoinHandle;

struct State {
    deadline: Instant,
}

/// A handle to a running watchdog task. Dropping the handle does not stop
/// the watchdog; call [`Watchdog::disarm`] explicitly.
pub struct Watchdog {
    state: Arc<Mutex<State>>,
    tripped: Arc<AtomicBool>,
    task: JoinHandle<()>,
}

impl Watchdog {
    /// Arms a watchdog with the given `timeout`, invoking `on_trip` exactly
    /// once if the timeout elapses without an intervening [`pet`](Self::pet).
    pub fn arm<F>(timeout: Duration, on_trip: F) -> Self
    where
        F: FnOnce() + Send + 'static,
    {
        let state = Arc::new(Mutex::new(State {
            deadline: Instant::now() + timeout,
        }));
        let tripped = Arc::new(AtomicBool::new(false));
        let task_state = Arc::clone(&state);
        let task_tripped = Arc::clone(&tripped);
        let task = tokio::spawn(async move {
            loop {
                let deadline = task_state.lock().deadline;
                let now = Instant::now();
                if now >= deadline {
                    task_tripped.store(true, Ordering::Release);
                    on_trip();
                    return;
                }
                tokio::time::sleep(deadline - now).await;
            }
        });
        Self {
            state,
            tripped,
            task,
        }
    }

    /// Pushes the deadline out by `timeout` from now, preventing a trip that
    /// would otherwise be imminent.
    pub fn pet(&self, timeout: Duration) {
        self.state.lock().deadline = Instant::now() + timeout;
    }

    /// Whether the watchdog has already tripped.
    #[must_use]
    pub fn has_tripped(&self) -> bool {
        self.tripped.load(Ordering::Acquire)
    }

    /// Cancels the watchdog task without tripping it.
    pub fn disarm(self) {
        self.task.abort();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicUsize;

    #[tokio::test(start_paused = true)]
    async fn trips_after_timeout_without_a_pet() {
        let trips = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&trips);
        let watchdog = Watchdog::arm(Duration::from_millis(50), move || {
            counter.fetch_add(1, Ordering::SeqCst);
        });
        tokio::time::advance(Duration::from_millis(60)).await;
        tokio::task::yield_now().await;
        assert_eq!(trips.load(Ordering::SeqCst), 1);
        assert!(watchdog.has_tripped());
    }

    #[tokio::test(start_paused = true)]
    async fn petting_pushes_the_deadline_out() {
        let trips = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&trips);
        let watchdog = Watchdog::arm(Duration::from_millis(50), move || {
            counter.fetch_add(1, Ordering::SeqCst);
        });
        tokio::time::advance(Duration::from_millis(30)).await;
        watchdog.pet(Duration::from_millis(50));
        tokio::time::advance(Duration::from_millis(30)).await;
        tokio::task::yield_now().await;
        assert_eq!(trips.load(Ordering::SeqCst), 0);
        watchdog.disarm();
    }
}
