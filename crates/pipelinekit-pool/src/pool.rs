//! Generic, thread-safe object pool.
//!
//! Re-use of `T` is safe by construction: an object handed to [`Pool::acquire`]
//! always either comes fresh from the factory or has already run through the
//! optional reset hook, and released objects are dropped once the pool is at
//! `max_size` rather than silently growing without bound.

use crate::stats::PoolStatistics;
use std::cell::Cell;
use std::collections::VecDeque;
use std::future::Future;
use std::sync::Arc;

use parking_lot::Mutex;

type Factory<T> = Box<dyn Fn() -> T + Send + Sync>;
type ResetFn<T> = Box<dyn Fn(&mut T) + Send + Sync>;

struct Inner<T> {
    available: Mutex<VecDeque<T>>,
    factory: Factory<T>,
    reset: Option<ResetFn<T>>,
    max_size: usize,
    stats: Mutex<PoolStatistics>,
}

/// A generic object pool.
///
/// Cloning a `Pool` is cheap (it shares the underlying `Arc`); clones all
/// observe the same `available` queue and statistics.
pub struct Pool<T> {
    inner: Arc<Inner<T>>,
}

impl<T> Clone for Pool<T> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<T> Pool<T> {
    /// Builds a pool with no upper bound on returned objects beyond
    /// `max_size`, using `factory` to construct new objects when the pool is
    /// empty.
    #[must_use]
    pub fn new(max_size: usize, factory: impl Fn() -> T + Send + Sync + 'static) -> Self {
        Self {
            inner: Arc::new(Inner {
                available: Mutex::new(VecDeque::new()),
                factory: Box::new(factory),
                reset: None,
                max_size,
                stats: Mutex::new(PoolStatistics::default()),
            }),
        }
    }

    /// Attaches a reset hook, run on an object just before it's handed back
    /// out by [`Pool::acquire`] (not when it's returned).
    #[must_use]
    pub fn with_reset(mut self, reset: impl Fn(&mut T) + Send + Sync + 'static) -> Self {
        let inner = Arc::get_mut(&mut self.inner)
            .expect("with_reset must be called before the pool is shared");
        inner.reset = Some(Box::new(reset));
        self
    }

    /// Pops an object from `available`, resetting it if a reset hook is
    /// configured, or constructs a fresh one via the factory. Never fails: a
    /// factory that can't produce a value is a programmer error, not a
    /// recoverable condition here.
    pub fn acquire(&self) -> T {
        let mut stats = self.inner.stats.lock();
        stats.total_borrows += 1;
        let popped = self.inner.available.lock().pop_front();
        let value = match popped {
            Some(mut value) => {
                stats.hits += 1;
                if let Some(reset) = &self.inner.reset {
                    reset(&mut value);
                }
                value
            }
            None => {
                stats.total_allocated += 1;
                (self.inner.factory)()
            }
        };
        stats.currently_in_use += 1;
        stats.peak_usage = stats.peak_usage.max(stats.currently_in_use);
        stats.recompute_hit_rate();
        value
    }

    /// Returns `value` to the pool. If `available` is already at `max_size`,
    /// the value is dropped instead of queued.
    pub fn release(&self, value: T) {
        let mut stats = self.inner.stats.lock();
        stats.currently_in_use = stats.currently_in_use.saturating_sub(1);
        stats.total_returns += 1;
        let mut available = self.inner.available.lock();
        if available.len() < self.inner.max_size {
            available.push_back(value);
        }
        stats.currently_available = available.len();
    }

    /// Scoped acquisition: runs `body` with a borrowed object and releases it
    /// back to the pool on every exit path, including when `body` itself
    /// returns an error value (the pool has no opinion on `R`'s shape).
    pub async fn with_borrowed<R, Fut>(&self, body: impl FnOnce(&mut T) -> Fut) -> R
    where
        Fut: Future<Output = R>,
    {
        let mut value = self.acquire();
        let result = body(&mut value).await;
        self.release(value);
        result
    }

    /// Acquires an object wrapped in a [`Handle`] that releases it back to
    /// the pool automatically on drop.
    #[must_use]
    pub fn acquire_pooled(&self) -> Handle<T> {
        let value = self.acquire();
        Handle {
            pool: self.clone(),
            value: Some(value),
            released: Cell::new(false),
        }
    }

    /// Pre-populates `available` with `count` freshly constructed objects.
    pub fn warm_up(&self, count: usize) {
        for _ in 0..count {
            let mut stats = self.inner.stats.lock();
            stats.total_allocated += 1;
            drop(stats);
            let value = (self.inner.factory)();
            self.inner.available.lock().push_back(value);
        }
        let mut stats = self.inner.stats.lock();
        stats.currently_available = self.inner.available.lock().len();
    }

    /// Drops every idle object, leaving `currently_in_use` untouched.
    pub fn clear(&self) {
        self.inner.available.lock().clear();
        let mut stats = self.inner.stats.lock();
        stats.currently_available = 0;
    }

    /// Drops idle objects until `available.len() <= to`.
    pub fn shrink(&self, to: usize) {
        let mut available = self.inner.available.lock();
        while available.len() > to {
            let _ = available.pop_back();
        }
        let mut stats = self.inner.stats.lock();
        stats.currently_available = available.len();
    }

    /// A snapshot of the pool's current statistics.
    #[must_use]
    pub fn statistics(&self) -> PoolStatistics {
        let mut stats = self.inner.stats.lock();
        stats.currently_available = self.inner.available.lock().len();
        *stats
    }

    /// The configured upper bound on idle objects.
    #[must_use]
    pub fn max_size(&self) -> usize {
        self.inner.max_size
    }
}

/// A borrowed object that returns itself to the originating [`Pool`] when
/// dropped.
///
/// Release is idempotent: calling [`Handle::release`] and then letting the
/// handle drop (or calling it twice) only returns the object once.
pub struct Handle<T> {
    pool: Pool<T>,
    value: Option<T>,
    released: Cell<bool>,
}

impl<T> Handle<T> {
    /// Explicitly returns the held object to the pool now, rather than
    /// waiting for drop. A no-op if already released.
    pub fn release(&mut self) {
        if self.released.get() {
            return;
        }
        if let Some(value) = self.value.take() {
            self.pool.release(value);
        }
        self.released.set(true);
    }
}

impl<T> std::ops::Deref for Handle<T> {
    type Target = T;

    fn deref(&self) -> &T {
        self.value
            .as_ref()
            .expect("handle value is only taken on release, after which it is never dereferenced")
    }
}

impl<T> std::ops::DerefMut for Handle<T> {
    fn deref_mut(&mut self) -> &mut T {
        self.value
            .as_mut()
            .expect("handle value is only taken on release, after which it is never dereferenced")
    }
}

impl<T> Drop for Handle<T> {
    fn drop(&mut self) {
        self.release();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[test]
    fn acquire_then_release_tracks_hits_and_usage() {
        let built = Arc::new(AtomicUsize::new(0));
        let built_for_factory = Arc::clone(&built);
        let pool = Pool::new(4, move || {
            built_for_factory.fetch_add(1, Ordering::Relaxed);
            0i32
        });

        let a = pool.acquire();
        let stats = pool.statistics();
        assert_eq!(stats.total_allocated, 1);
        assert_eq!(stats.currently_in_use, 1);
        assert_eq!(stats.hits, 0);

        pool.release(a);
        let b = pool.acquire();
        let stats = pool.statistics();
        assert_eq!(stats.total_allocated, 1, "second acquire should reuse, not allocate");
        assert_eq!(stats.hits, 1);
        assert!((stats.hit_rate - 0.5).abs() < 1e-9);
        pool.release(b);
    }

    #[test]
    fn release_beyond_max_size_drops_the_value() {
        let pool = Pool::new(1, || 0i32);
        let a = pool.acquire();
        let b = pool.acquire();
        pool.release(a);
        pool.release(b);
        assert_eq!(pool.statistics().currently_available, 1);
    }

    #[test]
    fn handle_release_is_idempotent() {
        let pool = Pool::new(2, || 0i32);
        let mut handle = pool.acquire_pooled();
        assert_eq!(pool.statistics().currently_in_use, 1);
        handle.release();
        assert_eq!(pool.statistics().currently_in_use, 0);
        handle.release();
        assert_eq!(pool.statistics().currently_in_use, 0, "double release must be a no-op");
    }

    #[test]
    fn handle_releases_on_drop() {
        let pool = Pool::new(2, || 0i32);
        {
            let _handle = pool.acquire_pooled();
            assert_eq!(pool.statistics().currently_in_use, 1);
        }
        assert_eq!(pool.statistics().currently_in_use, 0);
    }

    #[test]
    fn reset_hook_runs_on_reuse_not_on_return() {
        let resets = Arc::new(AtomicUsize::new(0));
        let resets_for_hook = Arc::clone(&resets);
        let pool = Pool::new(2, || 0i32).with_reset(move |_v| {
            resets_for_hook.fetch_add(1, Ordering::Relaxed);
        });
        let a = pool.acquire();
        assert_eq!(resets.load(Ordering::Relaxed), 0);
        pool.release(a);
        let _b = pool.acquire();
        assert_eq!(resets.load(Ordering::Relaxed), 1);
    }

    #[tokio::test]
    async fn with_borrowed_releases_on_every_exit_path() {
        let pool = Pool::new(2, || 0i32);
        let doubled = pool
            .with_borrowed(|v| {
                *v += 21;
                async move { *v * 2 }
            })
            .await;
        assert_eq!(doubled, 42);
        assert_eq!(pool.statistics().currently_in_use, 0);
    }
}
