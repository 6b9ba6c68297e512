//! Memory-pressure levels governing the pool-shrink policy.

use serde::{Deserialize, Serialize};

/// Coarse classification of system memory pressure, fed into
/// [`pipelinekit_pool`]'s intelligent shrinker.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum MemoryPressureLevel {
    /// Normal operating conditions.
    #[default]
    Normal,
    /// Elevated pressure; shrink pools moderately.
    Warning,
    /// Severe pressure; shrink pools aggressively.
    Critical,
}

impl MemoryPressureLevel {
    /// The multiplier applied to a pool's shrink target at this pressure level.
    #[must_use]
    pub const fn shrink_multiplier(self) -> f64 {
        match self {
            MemoryPressureLevel::Normal => 1.0,
            MemoryPressureLevel::Warning => 0.5,
            MemoryPressureLevel::Critical => 0.2,
        }
    }
}
