//! Lock-free atomic primitives, windowed accumulators, and the structured
//! [`Value`] type shared across the observability substrate.

pub mod accumulator;
pub mod atomic;
pub mod sample;
pub mod value;
pub mod window;

pub use accumulator::{
    AccumulatorState, BasicStatsAccumulator, BasicStatsSnapshot, CounterAccumulator,
    CounterSnapshot, DecayAccumulator, DecaySnapshot, HistogramAccumulator, HistogramSnapshot,
    Percentiles, Snapshot,
};
pub use atomic::{AtomicCounter, AtomicGauge};
pub use sample::{MetricKind, MetricSample, Tags};
pub use value::Value;
pub use window::{
    decay_to_basic_stats, decay_to_counter, decay_to_histogram, AccumulatorTemplate, Window,
};
