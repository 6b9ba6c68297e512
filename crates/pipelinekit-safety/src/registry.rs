//! The bounded LRU registry backing every confirmed reservation.
//!
//! Acts as the safety monitor's source of truth: [`crate::monitor::SafetyMonitor::check_consistency`]
//! trusts the registry's per-kind counts over the `allocated` atomic counters
//! when asked to repair drift between them.

use pipelinekit_config::ResourceKind;
use std::collections::{HashMap, VecDeque};
use std::time::Instant;

#[derive(Debug, Clone, Copy)]
struct Entry {
    kind: ResourceKind,
    count: u64,
    inserted_at: Instant,
}

/// An entry evicted to make room for a new one.
#[derive(Debug, Clone, Copy)]
pub struct Eviction {
    /// The evicted registration's id.
    pub id: u64,
    /// The evicted registration's resource kind.
    pub kind: ResourceKind,
    /// The number of units the evicted registration held.
    pub count: u64,
    /// How long the entry had been registered before eviction.
    pub age: std::time::Duration,
}

/// A live registration older than the configured leak threshold.
#[derive(Debug, Clone, Copy)]
pub struct ResourceLeak {
    /// The suspected-leaked registration's id.
    pub id: u64,
    /// Its resource kind.
    pub kind: ResourceKind,
    /// How long it has been registered.
    pub age: std::time::Duration,
}

/// A bounded registry of live (confirmed) reservations, in insertion order.
///
/// Eviction on overflow removes the oldest entry — an approximation of LRU
/// appropriate here since registrations are never "touched" again after
/// being confirmed, only released.
pub struct LruRegistry {
    capacity: usize,
    order: VecDeque<u64>,
    entries: HashMap<u64, Entry>,
}

impl LruRegistry {
    /// Creates an empty registry bounded at `capacity` entries.
    #[must_use]
    pub fn new(capacity: usize) -> Self {
        Self {
            capacity,
            order: VecDeque::new(),
            entries: HashMap::new(),
        }
    }

    /// Inserts a new registration, evicting the oldest entry first if the
    /// registry is already at capacity.
    pub fn insert(&mut self, id: u64, kind: ResourceKind, count: u64) -> Option<Eviction> {
        let evicted = if self.entries.len() >= self.capacity {
            self.evict_oldest()
        } else {
            None
        };
        self.entries.insert(
            id,
            Entry {
                kind,
                count,
                inserted_at: Instant::now(),
            },
        );
        self.order.push_back(id);
        evicted
    }

    fn evict_oldest(&mut self) -> Option<Eviction> {
        while let Some(id) = self.order.pop_front() {
            if let Some(entry) = self.entries.remove(&id) {
                return Some(Eviction {
                    id,
                    kind: entry.kind,
                    count: entry.count,
                    age: entry.inserted_at.elapsed(),
                });
            }
        }
        None
    }

    /// Removes a registration by id, returning its (kind, count) if present.
    pub fn remove(&mut self, id: u64) -> Option<(ResourceKind, u64)> {
        self.entries.remove(&id).map(|entry| {
            self.order.retain(|queued| *queued != id);
            (entry.kind, entry.count)
        })
    }

    /// Sums the reserved unit counts of currently-registered entries of `kind`.
    #[must_use]
    pub fn units_by_kind(&self, kind: ResourceKind) -> u64 {
        self.entries
            .values()
            .filter(|e| e.kind == kind)
            .map(|e| e.count)
            .sum()
    }

    /// Total number of registered entries.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether the registry holds no entries.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Entries whose age exceeds `threshold`.
    #[must_use]
    pub fn leaks_older_than(&self, threshold: std::time::Duration) -> Vec<ResourceLeak> {
        self.entries
            .iter()
            .filter_map(|(&id, entry)| {
                let age = entry.inserted_at.elapsed();
                (age >= threshold).then_some(ResourceLeak {
                    id,
                    kind: entry.kind,
                    age,
                })
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn eviction_removes_oldest_entry_and_reports_its_age() {
        let mut registry = LruRegistry::new(2);
        assert!(registry.insert(1, ResourceKind::Actor, 1).is_none());
        assert!(registry.insert(2, ResourceKind::Actor, 1).is_none());
        let evicted = registry
            .insert(3, ResourceKind::Task, 1)
            .expect("should evict");
        assert_eq!(evicted.id, 1);
        assert_eq!(registry.len(), 2);
    }

    #[test]
    fn leaks_are_reported_past_the_threshold() {
        let mut registry = LruRegistry::new(10);
        registry.insert(1, ResourceKind::Lock, 1);
        let leaks = registry.leaks_older_than(std::time::Duration::from_secs(0));
        assert_eq!(leaks.len(), 1);
        assert_eq!(leaks[0].id, 1);
        let none = registry.leaks_older_than(std::time::Duration::from_secs(3600));
        assert!(none.is_empty());
    }
}
