//! PipelineKit: pooling, back-pressure, resource safety, metrics, and
//! pluggable exporters for long-running data-pipeline processes.
//!
//! This crate is a thin facade: it re-exports the pieces that live in the
//! `pipelinekit-*` crates so a caller can depend on one crate and wire them
//! together, the way `otap-dataflow` re-exports its own subsystems from its
//! root crate.

pub use pipelinekit_backpressure as backpressure;
pub use pipelinekit_config as config;
pub use pipelinekit_export as export;
pub use pipelinekit_metrics as metrics;
pub use pipelinekit_pool as pool;
pub use pipelinekit_safety as safety;

pub use pipelinekit_backpressure::{BackpressureError, HealthCheck, Semaphore, SemaphoreStats, Token};
pub use pipelinekit_config::{
    AggregationWindow, BackpressureStrategy, ConfigurationError, ExporterDateFormat,
    MemoryPressureLevel, Priority, ResourceKind,
};
pub use pipelinekit_export::{
    Aggregated, AggregationConfig, AggregationWrapper, BatchingConfig, BatchingWrapper,
    BreakerConfig, BreakerState, CircuitBreaker, ExportError, Exporter, ExporterStatus,
    FanOutError, MultiExporter, OverflowPolicy, RotationPolicy, SamplingWrapper,
};
pub use pipelinekit_metrics::{
    AccumulatorTemplate, AtomicCounter, AtomicGauge, BasicStatsSnapshot, CounterSnapshot,
    DecaySnapshot, HistogramSnapshot, MetricKind, MetricSample, Percentiles, Snapshot, Tags,
    Window,
};
pub use pipelinekit_pool::{Handle, IntelligentShrinker, Pool, PoolStatistics, UsageAnalysis, UsagePattern};
pub use pipelinekit_safety::{
    ConsistencyReport, FixedProbe, HostProbe, Limits, LruRegistry, Mismatch, MonitorConfig,
    Reservation, ResourceHandle, SafetyError, SafetyMonitor, ShutdownHandler, SystemProbe,
    Watchdog,
};
