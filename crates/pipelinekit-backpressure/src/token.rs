//! The capacity token handed back by a successful `acquire`.

use crate::semaphore::Inner;
use std::cell::Cell;
use std::sync::Arc;

/// A held unit of concurrency.
///
/// Carries a monotonic id for tracing/log correlation. Capacity is returned
/// to the semaphore exactly once, whether via an explicit [`Token::release`]
/// call or by dropping the token — whichever happens first.
#[derive(Debug)]
pub struct Token {
    pub(crate) id: u64,
    pub(crate) estimated_size: u64,
    pub(crate) inner: Arc<Inner>,
    pub(crate) released: Cell<bool>,
}

impl Token {
    /// The token's monotonic id.
    #[must_use]
    pub fn id(&self) -> u64 {
        self.id
    }

    /// Releases the held capacity, waking the next queued waiter (if any).
    /// A no-op if already released.
    pub fn release(&self) {
        if self.released.replace(true) {
            return;
        }
        self.inner.release_one();
    }
}

impl Drop for Token {
    fn drop(&mut self) {
        self.release();
    }
}
