//! Shared configuration types for the PipelineKit observability substrate.
//!
//! These types are consumed by `pipelinekit-pool`, `pipelinekit-backpressure`,
//! `pipelinekit-safety`, and `pipelinekit-export`. Keeping them in one crate avoids
//! every downstream crate re-declaring the same enums with slightly different
//! `serde` representations.

pub mod byte_size;
pub mod date_format;
pub mod error;
pub mod pressure;
pub mod priority;
pub mod resource;
pub mod strategy;
pub mod window;

pub use date_format::ExporterDateFormat;
pub use error::ConfigurationError;
pub use pressure::MemoryPressureLevel;
pub use priority::Priority;
pub use resource::ResourceKind;
pub use strategy::BackpressureStrategy;
pub use window::AggregationWindow;
