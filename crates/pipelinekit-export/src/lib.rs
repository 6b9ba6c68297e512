//! Pluggable metric exporters: sampling, aggregation, and batching wrappers
//! over StatsD/DogStatsD, Prometheus, JSON/CSV file, console, and multi/fan-out
//! backends.

pub mod aggregated;
pub mod aggregation;
pub mod backends;
pub mod batching;
pub mod circuit_breaker;
pub mod error;
pub mod exporter;
pub mod multi;
pub mod rotation;
pub mod sampling;
pub mod status;

pub use aggregated::Aggregated;
pub use aggregation::{AggregationConfig, AggregationWrapper};
pub use batching::{BatchingConfig, BatchingWrapper, OverflowPolicy};
pub use circuit_breaker::{BreakerConfig, BreakerState, CircuitBreaker};
pub use error::{ExportError, FanOutError};
pub use exporter::Exporter;
pub use multi::MultiExporter;
pub use rotation::RotationPolicy;
pub use sampling::SamplingWrapper;
pub use status::ExporterStatus;
