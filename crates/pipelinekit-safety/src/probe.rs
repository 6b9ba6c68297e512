//! Host introspection needed to evaluate per-kind resource limits.
//!
//! Grounded on the teacher's thread-level sampling of `getrusage` (see
//! `pipeline_metrics.rs`, which calls `getrusage(UsageWho::RUSAGE_THREAD)` on
//! a timer) and its `sysinfo`-based heartbeat (`heartbeat.rs`), generalized
//! here into one trait so the safety monitor can be driven by a deterministic
//! test double instead of the real host.

use nix::sys::resource::{getrlimit, Resource};

/// Host facts the safety monitor needs but cannot itself observe atomically
/// (they come from the OS, not from the monitor's own counters).
pub trait SystemProbe: Send + Sync {
    /// Total physical memory visible to the system, in bytes.
    fn system_memory_bytes(&self) -> u64;

    /// The process's current resident memory usage, in bytes.
    fn process_memory_bytes(&self) -> u64;

    /// The soft `RLIMIT_NOFILE` limit for this process.
    fn rlimit_nofile(&self) -> u64;

    /// The number of file descriptors currently open system-wide for this
    /// process (used as the "external" contribution to FD/socket accounting
    /// the monitor doesn't itself track).
    fn system_fd_usage(&self) -> u64;
}

/// The real host probe, backed by `sysinfo` for memory and `nix` for rlimits.
pub struct HostProbe {
    system: parking_lot::Mutex<sysinfo::System>,
    pid: sysinfo::Pid,
}

impl HostProbe {
    /// Builds a probe bound to the current process.
    #[must_use]
    pub fn new() -> Self {
        let mut system = sysinfo::System::new();
        system.refresh_memory();
        let pid = sysinfo::Pid::from_u32(std::process::id());
        system.refresh_processes(sysinfo::ProcessesToUpdate::Some(&[pid]), true);
        Self {
            system: parking_lot::Mutex::new(system),
            pid,
        }
    }
}

impl Default for HostProbe {
    fn default() -> Self {
        Self::new()
    }
}

impl SystemProbe for HostProbe {
    fn system_memory_bytes(&self) -> u64 {
        let mut system = self.system.lock();
        system.refresh_memory();
        system.total_memory()
    }

    fn process_memory_bytes(&self) -> u64 {
        let mut system = self.system.lock();
        system.refresh_processes(sysinfo::ProcessesToUpdate::Some(&[self.pid]), true);
        system
            .process(self.pid)
            .map(sysinfo::Process::memory)
            .unwrap_or(0)
    }

    fn rlimit_nofile(&self) -> u64 {
        getrlimit(Resource::RLIMIT_NOFILE)
            .map(|(soft, _hard)| soft)
            .unwrap_or(1024)
    }

    fn system_fd_usage(&self) -> u64 {
        // `sysinfo` doesn't expose per-process FD counts portably; the
        // monitor's own `held + pending` counters are the primary signal and
        // this contributes zero unless a platform-specific probe replaces it.
        0
    }
}

/// A deterministic probe for tests, returning fixed values.
#[derive(Debug, Clone, Copy)]
pub struct FixedProbe {
    /// See [`SystemProbe::system_memory_bytes`].
    pub system_memory_bytes: u64,
    /// See [`SystemProbe::process_memory_bytes`].
    pub process_memory_bytes: u64,
    /// See [`SystemProbe::rlimit_nofile`].
    pub rlimit_nofile: u64,
    /// See [`SystemProbe::system_fd_usage`].
    pub system_fd_usage: u64,
}

impl SystemProbe for FixedProbe {
    fn system_memory_bytes(&self) -> u64 {
        self.system_memory_bytes
    }

    fn process_memory_bytes(&self) -> u64 {
        self.process_memory_bytes
    }

    fn rlimit_nofile(&self) -> u64 {
        self.rlimit_nofile
    }

    fn system_fd_usage(&self) -> u64 {
        self.system_fd_usage
    }
}
