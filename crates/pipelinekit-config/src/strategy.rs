//! Back-pressure strategy configuration.

use serde::{Deserialize, Serialize};
use std::time::Duration;

/// What the back-pressure semaphore does once `max_outstanding` is reached.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum BackpressureStrategy {
    /// Queue waiters up to `max_outstanding`; beyond that, the caller blocks
    /// until space exists (subject to its own `acquire` timeout, if any).
    Suspend,
    /// Beyond `max_outstanding`, fail immediately with `QueueFull`.
    Error {
        /// Optional timeout override applied while waiting for the error check
        /// itself to be evaluated (normally immediate).
        #[serde(default, with = "humantime_serde::option")]
        timeout: Option<Duration>,
    },
    /// Reject the newest queued waiter once `max_outstanding` is reached.
    DropNewest,
    /// Cancel the oldest queued waiter to make room for the newcomer.
    DropOldest,
}

impl Default for BackpressureStrategy {
    fn default() -> Self {
        Self::Suspend
    }
}
