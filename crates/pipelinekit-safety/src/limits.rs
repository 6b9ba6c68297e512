//! Per-kind admission policies evaluated by [`crate::monitor::SafetyMonitor::check`].

use crate::error::SafetyError;
use crate::probe::SystemProbe;
use pipelinekit_config::ResourceKind;
use serde::{Deserialize, Serialize};

const BYTES_PER_MIB: u64 = 1024 * 1024;

/// Tunable thresholds for the resource-limit policies. Defaults match the
/// numbers named for each kind.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Limits {
    /// Fraction of system memory projected usage may not exceed.
    pub max_memory_usage: f64,
    /// Hard ceiling on concurrent actors, before the `system_memory/1MiB`
    /// cap is applied.
    pub actor_hard_cap: u64,
    /// Hard ceiling on concurrent tasks (and, by policy sharing, threads).
    pub task_hard_cap: u64,
    /// Hard ceiling on concurrent locks.
    pub lock_hard_cap: u64,
    /// Hard ceiling on concurrent processes.
    pub process_hard_cap: u64,
    /// Hard ceiling on concurrent memory mappings.
    pub memory_mapping_hard_cap: u64,
    /// Hard ceiling on concurrent disk-space reservations.
    pub disk_space_hard_cap: u64,
    /// Fraction of `rlimit_nofile` that file descriptors and sockets
    /// combined may not exceed.
    pub fd_socket_usage_fraction: f64,
}

impl Default for Limits {
    fn default() -> Self {
        Self {
            max_memory_usage: 0.8,
            actor_hard_cap: 10_000,
            task_hard_cap: 100_000,
            lock_hard_cap: 1_000,
            process_hard_cap: 100,
            memory_mapping_hard_cap: 10_000,
            disk_space_hard_cap: 10_000,
            fd_socket_usage_fraction: 0.8,
        }
    }
}

impl Limits {
    /// Evaluates whether reserving `count` more units of `kind` would stay
    /// within policy, given `current` (confirmed/allocated) and `pending`
    /// (reserved-but-unconfirmed) counts already outstanding for that kind.
    pub fn check(
        &self,
        kind: ResourceKind,
        current: u64,
        pending: u64,
        count: u64,
        probe: &dyn SystemProbe,
    ) -> Result<(), SafetyError> {
        let projected = current + pending + count;
        match kind {
            ResourceKind::Actor => {
                let cap = self
                    .actor_hard_cap
                    .min(probe.system_memory_bytes() / BYTES_PER_MIB);
                let ratio = self.memory_ratio(projected, probe);
                self.require(projected <= cap, kind, cap as f64)?;
                self.require(ratio <= 0.9 * self.max_memory_usage, kind, 0.9 * self.max_memory_usage)
            }
            ResourceKind::Task | ResourceKind::Thread => {
                let ratio = self.memory_ratio(projected, probe);
                self.require(projected <= self.task_hard_cap, kind, self.task_hard_cap as f64)?;
                self.require(ratio <= 0.85 * self.max_memory_usage, kind, 0.85 * self.max_memory_usage)
            }
            ResourceKind::Lock => {
                self.require(projected <= self.lock_hard_cap, kind, self.lock_hard_cap as f64)
            }
            ResourceKind::FileDescriptor | ResourceKind::Socket => {
                let budget = (self.fd_socket_usage_fraction * probe.rlimit_nofile() as f64).floor();
                let used = probe.system_fd_usage() + projected;
                self.require(used as f64 <= budget, kind, budget)
            }
            ResourceKind::Process => {
                self.require(projected <= self.process_hard_cap, kind, self.process_hard_cap as f64)
            }
            ResourceKind::MemoryMapping => {
                let ratio = self.memory_ratio(projected, probe);
                self.require(
                    projected <= self.memory_mapping_hard_cap,
                    kind,
                    self.memory_mapping_hard_cap as f64,
                )?;
                self.require(ratio <= self.max_memory_usage, kind, self.max_memory_usage)
            }
            ResourceKind::DiskSpace => {
                let ratio = self.memory_ratio(projected, probe);
                self.require(
                    projected <= self.disk_space_hard_cap,
                    kind,
                    self.disk_space_hard_cap as f64,
                )?;
                self.require(ratio <= self.max_memory_usage, kind, self.max_memory_usage)
            }
        }
    }

    fn memory_ratio(&self, projected_units: u64, probe: &dyn SystemProbe) -> f64 {
        let system = probe.system_memory_bytes().max(1);
        let projected_bytes = probe.process_memory_bytes() + projected_units;
        projected_bytes as f64 / system as f64
    }

    fn require(&self, ok: bool, kind: ResourceKind, limit: f64) -> Result<(), SafetyError> {
        if ok {
            Ok(())
        } else {
            Err(SafetyError::ResourceExhausted { kind, limit })
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::probe::FixedProbe;

    fn probe() -> FixedProbe {
        FixedProbe {
            system_memory_bytes: 16 * 1024 * 1024 * 1024,
            process_memory_bytes: 1024 * 1024 * 1024,
            rlimit_nofile: 1024,
            system_fd_usage: 0,
        }
    }

    #[test]
    fn lock_policy_is_a_flat_count_cap() {
        let limits = Limits::default();
        assert!(limits.check(ResourceKind::Lock, 999, 0, 1, &probe()).is_ok());
        assert!(limits
            .check(ResourceKind::Lock, 1000, 0, 1, &probe())
            .is_err());
    }

    #[test]
    fn fd_and_socket_share_the_rlimit_budget() {
        let limits = Limits::default();
        // 0.8 * 1024 = 819.2 -> floor 819
        assert!(limits
            .check(ResourceKind::FileDescriptor, 818, 0, 1, &probe())
            .is_ok());
        assert!(limits
            .check(ResourceKind::Socket, 819, 0, 1, &probe())
            .is_err());
    }

    #[test]
    fn memory_mapping_policy_uses_projected_usage_ratio() {
        let limits = Limits::default();
        let tight_probe = FixedProbe {
            system_memory_bytes: 1000,
            process_memory_bytes: 750,
            rlimit_nofile: 1024,
            system_fd_usage: 0,
        };
        assert!(limits
            .check(ResourceKind::MemoryMapping, 0, 0, 40, &tight_probe)
            .is_ok());
        assert!(limits
            .check(ResourceKind::MemoryMapping, 0, 0, 100, &tight_probe)
            .is_err());
    }
}
