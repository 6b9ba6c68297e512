//! Error types returned by [`crate::Semaphore::acquire`].

/// Why an `acquire` call failed to produce a [`crate::Token`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum BackpressureError {
    /// `max_outstanding` was already reached and the configured strategy is
    /// `Error`.
    #[error("queue is full")]
    QueueFull,
    /// The waiter was rejected (configured strategy is `DropNewest`) or
    /// evicted to make room for a newer arrival (`DropOldest`).
    #[error("request dropped under back-pressure")]
    Dropped,
    /// Queuing this request would exceed `max_queue_memory`.
    #[error("queue memory limit exceeded")]
    MemoryLimitExceeded,
}
