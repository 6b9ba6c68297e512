//! Concrete exporter backends.

pub mod console;
pub mod csv_file;
pub mod json_file;
pub mod null;
pub mod prometheus;
pub mod statsd;
pub mod transport;

pub use console::{ConsoleExporter, ConsoleFormat};
pub use csv_file::{CsvFileConfig, CsvFileExporter};
pub use json_file::{JsonFileConfig, JsonFileExporter};
pub use null::NullExporter;
pub use prometheus::PrometheusExporter;
pub use statsd::{StatsdConfig, StatsdExporter, StatsdFormat};
pub use transport::{MockTransport, Transport, UdpTransport};
