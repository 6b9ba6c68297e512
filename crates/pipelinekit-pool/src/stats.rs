//! Pool observability: the running counters every [`crate::Pool`] exposes.

/// A snapshot of a pool's lifetime and current-state counters.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct PoolStatistics {
    /// Objects ever constructed by the factory (still alive or not).
    pub total_allocated: usize,
    /// Objects currently sitting idle in the pool.
    pub currently_available: usize,
    /// Objects currently checked out.
    pub currently_in_use: usize,
    /// Total `acquire`/`acquire_pooled`/`with_borrowed` calls.
    pub total_borrows: u64,
    /// Total objects returned to the pool (excludes drops past `max_size`).
    pub total_returns: u64,
    /// Borrows satisfied from `available` rather than the factory.
    pub hits: u64,
    /// `hits / total_borrows`, or `0.0` if there have been no borrows yet.
    pub hit_rate: f64,
    /// The highest `currently_in_use` has ever reached.
    pub peak_usage: usize,
}

impl PoolStatistics {
    pub(crate) fn recompute_hit_rate(&mut self) {
        self.hit_rate = if self.total_borrows == 0 {
            0.0
        } else {
            self.hits as f64 / self.total_borrows as f64
        };
    }
}
