//! Resource kinds tracked by the safety monitor.

use serde::{Deserialize, Serialize};

/// The nine resource kinds the safety monitor reserves and tracks.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ResourceKind {
    /// A logical actor / supervised unit of concurrency.
    Actor,
    /// A spawned async task.
    Task,
    /// A held lock (mutex/rwlock guard).
    Lock,
    /// An open file descriptor.
    FileDescriptor,
    /// An `mmap`-style memory mapping.
    MemoryMapping,
    /// An open network socket.
    Socket,
    /// Reserved disk space, in bytes.
    DiskSpace,
    /// An OS thread.
    Thread,
    /// A spawned OS process.
    Process,
}

impl ResourceKind {
    /// All nine kinds, in a stable order. Used by the consistency audit and by
    /// tests that need to iterate every kind.
    pub const ALL: [ResourceKind; 9] = [
        ResourceKind::Actor,
        ResourceKind::Task,
        ResourceKind::Lock,
        ResourceKind::FileDescriptor,
        ResourceKind::MemoryMapping,
        ResourceKind::Socket,
        ResourceKind::DiskSpace,
        ResourceKind::Thread,
        ResourceKind::Process,
    ];

    /// A short machine-readable label, suitable for metric tags and log fields.
    #[must_use]
    pub const fn label(self) -> &'static str {
        match self {
            ResourceKind::Actor => "actor",
            ResourceKind::Task => "task",
            ResourceKind::Lock => "lock",
            ResourceKind::FileDescriptor => "file_descriptor",
            ResourceKind::MemoryMapping => "memory_mapping",
            ResourceKind::Socket => "socket",
            ResourceKind::DiskSpace => "disk_space",
            ResourceKind::Thread => "thread",
            ResourceKind::Process => "process",
        }
    }
}

impl std::fmt::Display for ResourceKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.label())
    }
}
