//! Waiter priority for the back-pressure semaphore.

use serde::{Deserialize, Serialize};

/// Priority class for a back-pressure semaphore waiter.
///
/// Ordered so that `Critical > High > Normal > Low`; the derived [`Ord`] impl
/// lists variants from lowest to highest so that a max-heap (or a
/// `Reverse`-wrapped min-heap) built on this type services `Critical` first.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum Priority {
    /// Lowest priority; serviced last.
    Low,
    /// Default priority for unmarked work.
    #[default]
    Normal,
    /// Above normal; serviced ahead of `Normal` and `Low`.
    High,
    /// Highest priority; serviced first.
    Critical,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn orders_critical_above_all() {
        assert!(Priority::Critical > Priority::High);
        assert!(Priority::High > Priority::Normal);
        assert!(Priority::Normal > Priority::Low);
    }
}
