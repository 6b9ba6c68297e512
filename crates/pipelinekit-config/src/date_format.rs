//! Date encoding choices for file exporters.

use serde::{Deserialize, Serialize};

/// How timestamps are rendered by the JSON and CSV file exporters.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ExporterDateFormat {
    /// RFC 3339 / ISO 8601, e.g. `2026-07-28T12:00:00Z`.
    Iso8601,
    /// Unix seconds since the epoch.
    Unix,
    /// Unix milliseconds since the epoch.
    UnixMillis,
    /// A `chrono` strftime-style format string.
    Custom(String),
}

impl Default for ExporterDateFormat {
    fn default() -> Self {
        Self::Iso8601
    }
}

impl ExporterDateFormat {
    /// Renders a timestamp according to this format.
    #[must_use]
    pub fn format(&self, ts: chrono::DateTime<chrono::Utc>) -> String {
        match self {
            Self::Iso8601 => ts.to_rfc3339(),
            Self::Unix => ts.timestamp().to_string(),
            Self::UnixMillis => ts.timestamp_millis().to_string(),
            Self::Custom(fmt) => ts.format(fmt).to_string(),
        }
    }
}
