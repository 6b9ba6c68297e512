//! Lock-free single-value metrics addressable by `(name, tag-set)`.
//!
//! Values are stored as the bit pattern of an `f64` inside an `AtomicU64`.
//! Arithmetic that can't be expressed as a single atomic instruction (addition,
//! `update`) is implemented as a compare-and-swap retry loop, the same pattern
//! the teacher uses for its `AtomicCounters` (plain `AtomicU64` fields updated
//! with `Ordering::Relaxed`), generalized here to floats via bit-cast.

use std::sync::atomic::{AtomicU64, Ordering};

#[inline]
fn load(cell: &AtomicU64) -> f64 {
    f64::from_bits(cell.load(Ordering::Relaxed))
}

#[inline]
fn cas_update(cell: &AtomicU64, mut f: impl FnMut(f64) -> f64) -> f64 {
    let mut current_bits = cell.load(Ordering::Relaxed);
    loop {
        let current = f64::from_bits(current_bits);
        let next = f(current);
        match cell.compare_exchange_weak(
            current_bits,
            next.to_bits(),
            Ordering::Relaxed,
            Ordering::Relaxed,
        ) {
            Ok(_) => return next,
            Err(observed) => current_bits = observed,
        }
    }
}

/// A lock-free monotonic (until reset) counter.
///
/// `increment`/`decrement` saturate per IEEE-754 float arithmetic; there is no
/// error path.
#[derive(Debug, Default)]
pub struct AtomicCounter {
    value: AtomicU64,
}

impl AtomicCounter {
    /// Creates a new counter starting at zero.
    #[must_use]
    pub fn new() -> Self {
        Self {
            value: AtomicU64::new(0),
        }
    }

    /// Adds `by` to the counter, returning the new value.
    pub fn increment(&self, by: f64) -> f64 {
        cas_update(&self.value, |v| v + by)
    }

    /// Subtracts `by` from the counter, returning the new value.
    pub fn decrement(&self, by: f64) -> f64 {
        cas_update(&self.value, |v| v - by)
    }

    /// Returns the current value without modifying it.
    #[must_use]
    pub fn value(&self) -> f64 {
        load(&self.value)
    }

    /// An alias for [`Self::value`], for call sites that snapshot many metrics
    /// uniformly.
    #[must_use]
    pub fn snapshot(&self) -> f64 {
        self.value()
    }

    /// Resets the counter to zero.
    pub fn reset(&self) {
        self.value.store(0f64.to_bits(), Ordering::Relaxed);
    }

    /// Atomically reads the current value and resets to zero.
    pub fn get_and_reset(&self) -> f64 {
        f64::from_bits(self.value.swap(0f64.to_bits(), Ordering::Relaxed))
    }
}

/// A lock-free gauge holding an arbitrary (non-monotonic) `f64`.
#[derive(Debug, Default)]
pub struct AtomicGauge {
    value: AtomicU64,
}

impl AtomicGauge {
    /// Creates a new gauge starting at zero.
    #[must_use]
    pub fn new() -> Self {
        Self {
            value: AtomicU64::new(0),
        }
    }

    /// Sets the gauge to `v`.
    pub fn set(&self, v: f64) {
        self.value.store(v.to_bits(), Ordering::Relaxed);
    }

    /// Adds `by` to the gauge (may be negative), returning the new value.
    pub fn adjust(&self, by: f64) -> f64 {
        cas_update(&self.value, |v| v + by)
    }

    /// Sets the gauge to `v`, returning the previous value.
    pub fn get_and_set(&self, v: f64) -> f64 {
        f64::from_bits(self.value.swap(v.to_bits(), Ordering::Relaxed))
    }

    /// Sets the gauge to `new` only if its current value is `expected`.
    /// Returns `true` if the swap happened.
    pub fn compare_and_set(&self, expected: f64, new: f64) -> bool {
        self.value
            .compare_exchange(
                expected.to_bits(),
                new.to_bits(),
                Ordering::Relaxed,
                Ordering::Relaxed,
            )
            .is_ok()
    }

    /// Applies `f` to the current value via a CAS retry loop, returning the
    /// new value.
    pub fn update(&self, f: impl FnMut(f64) -> f64) -> f64 {
        cas_update(&self.value, f)
    }

    /// Returns the current value.
    #[must_use]
    pub fn value(&self) -> f64 {
        load(&self.value)
    }

    /// An alias for [`Self::value`].
    #[must_use]
    pub fn snapshot(&self) -> f64 {
        self.value()
    }

    /// Resets the gauge to zero.
    pub fn reset(&self) {
        self.value.store(0f64.to_bits(), Ordering::Relaxed);
    }

    /// Atomically reads the current value and resets to zero.
    pub fn get_and_reset(&self) -> f64 {
        f64::from_bits(self.value.swap(0f64.to_bits(), Ordering::Relaxed))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::thread;

    #[test]
    fn counter_saturates_and_resets() {
        let c = AtomicCounter::new();
        assert_eq!(c.increment(5.0), 5.0);
        assert_eq!(c.increment(2.5), 7.5);
        assert_eq!(c.value(), 7.5);
        assert_eq!(c.get_and_reset(), 7.5);
        assert_eq!(c.value(), 0.0);
    }

    #[test]
    fn gauge_cas_and_update() {
        let g = AtomicGauge::new();
        g.set(10.0);
        assert!(g.compare_and_set(10.0, 20.0));
        assert!(!g.compare_and_set(10.0, 30.0));
        assert_eq!(g.value(), 20.0);
        assert_eq!(g.update(|v| v * 2.0), 40.0);
    }

    #[test]
    fn concurrent_increments_are_exact() {
        let counter = Arc::new(AtomicCounter::new());
        let threads = 8;
        let per_thread = 1000;
        let handles: Vec<_> = (0..threads)
            .map(|_| {
                let counter = Arc::clone(&counter);
                thread::spawn(move || {
                    for _ in 0..per_thread {
                        counter.increment(1.0);
                    }
                })
            })
            .collect();
        for h in handles {
            h.join().unwrap();
        }
        assert_eq!(counter.value(), (threads * per_thread) as f64);
    }
}
