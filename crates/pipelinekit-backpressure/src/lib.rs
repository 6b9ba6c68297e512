//! Priority-aware admission control: a semaphore enforcing both concurrency
//! and outstanding-request caps, with configurable overflow behavior.

pub mod error;
pub mod semaphore;
pub mod token;

pub use error::BackpressureError;
pub use semaphore::{HealthCheck, Semaphore, SemaphoreStats};
pub use token::Token;
