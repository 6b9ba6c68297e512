//! Errors for the config crate.

/// Errors raised while parsing or validating configuration.
///
/// Per the error taxonomy, configuration errors fail fast at construction time
/// and are never retried.
#[derive(thiserror::Error, Debug, Clone)]
pub enum ConfigurationError {
    /// A field value was outside its accepted range.
    #[error("invalid value for `{field}`: {reason}")]
    InvalidValue {
        /// The offending field's name.
        field: &'static str,
        /// Human-readable explanation.
        reason: String,
    },

    /// A required field was missing.
    #[error("missing required field `{field}`")]
    MissingField {
        /// The missing field's name.
        field: &'static str,
    },

    /// The configuration could not be deserialized from its source format.
    #[error("failed to parse configuration: {0}")]
    ParseError(String),
}
