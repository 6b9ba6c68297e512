//! A small structured value enum for tag values and log fields.
//!
//! Grounded on the design note about "recursive value unwrapping of a boxed any"
//! (the logger emitter pattern): rather than a type-erased `dyn Any`, we carry a
//! closed, matchable enum populated at the source and consumed at the sink
//! (console exporter pretty printer, structured log fields).

use std::fmt;

/// A structured value that can be attached to a metric tag or emitted as a log
/// field.
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    /// A UTF-8 string.
    Str(String),
    /// A signed integer, stored at full width.
    Int(i64),
    /// An unsigned 64-bit integer.
    U64(u64),
    /// A signed 64-bit integer (kept distinct from `Int` for sources that
    /// already distinguish signedness, e.g. decoded wire formats).
    I64(i64),
    /// A 64-bit float.
    F64(f64),
    /// A boolean.
    Bool(bool),
    /// A timestamp.
    Date(chrono::DateTime<chrono::Utc>),
    /// A UUID.
    Uuid(uuid::Uuid),
    /// A value nested one level deep (e.g. a single-element collection).
    Nested(Box<Value>),
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Str(s) => f.write_str(s),
            Value::Int(v) | Value::I64(v) => write!(f, "{v}"),
            Value::U64(v) => write!(f, "{v}"),
            Value::F64(v) => write!(f, "{v}"),
            Value::Bool(v) => write!(f, "{v}"),
            Value::Date(v) => write!(f, "{}", v.to_rfc3339()),
            Value::Uuid(v) => write!(f, "{v}"),
            Value::Nested(inner) => write!(f, "{inner}"),
        }
    }
}

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Value::Str(s.to_owned())
    }
}

impl From<String> for Value {
    fn from(s: String) -> Self {
        Value::Str(s)
    }
}

impl From<f64> for Value {
    fn from(v: f64) -> Self {
        Value::F64(v)
    }
}

impl From<bool> for Value {
    fn from(v: bool) -> Self {
        Value::Bool(v)
    }
}
