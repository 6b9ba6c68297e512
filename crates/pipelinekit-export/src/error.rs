//! Export failure taxonomy.

/// Why an export, flush, or shutdown failed. I/O errors never propagate past
/// the exporter they occurred in; they are counted in [`crate::status::ExporterStatus`]
/// and surfaced to the caller as a value, not a panic.
#[derive(Debug, Clone, thiserror::Error)]
pub enum ExportError {
    /// The transport could not establish or re-establish a connection.
    #[error("connection failed: {0}")]
    ConnectionFailed(String),
    /// A send to an already-connected transport failed.
    #[error("send failed: {0}")]
    SendFailed(String),
    /// The sample or snapshot could not be encoded by this backend.
    #[error("invalid data: {0}")]
    InvalidData(String),
    /// The exporter was built with an invalid configuration.
    #[error("configuration error: {0}")]
    ConfigurationError(String),
    /// The exporter has been shut down and rejects further calls.
    #[error("exporter is shut down")]
    ExporterClosed,
    /// A filesystem operation failed.
    #[error("io error: {0}")]
    IoError(String),
    /// The requested operation isn't meaningful for this backend (e.g.
    /// exporting an `Aggregated` histogram to a backend with no bucket
    /// representation).
    #[error("format not supported: {0}")]
    FormatNotSupported(String),
}

impl From<std::io::Error> for ExportError {
    fn from(err: std::io::Error) -> Self {
        Self::IoError(err.to_string())
    }
}

/// A [`crate::multi::MultiExporter`] fan-out failure: one entry per
/// underlying exporter that failed, identified by its configured label.
#[derive(Debug, Clone, thiserror::Error)]
#[error("{} of {} exporters failed: {}", failures.len(), total, Self::join(failures))]
pub struct FanOutError {
    /// Total number of underlying exporters the batch was sent to.
    pub total: usize,
    /// `(label, error)` pairs for every exporter that failed.
    pub failures: Vec<(String, ExportError)>,
}

impl FanOutError {
    fn join(failures: &[(String, ExportError)]) -> String {
        failures
            .iter()
            .map(|(label, err)| format!("{label}: {err}"))
            .collect::<Vec<_>>()
            .join(", ")
    }
}
