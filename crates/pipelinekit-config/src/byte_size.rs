//! Support for byte units like "KB / KiB", "MB / MiB" in configuration files.
//!
//! Used for exporter knobs such as `max_packet_size`, `max_file_size`, and
//! `max_queue_memory` that are naturally specified as either a raw integer or a
//! human-friendly string.

use byte_unit::Byte;
use serde::de::Error as DeError;
use serde::{Deserialize, Deserializer};

#[derive(Deserialize)]
#[serde(untagged)]
enum Value {
    Number(u64),
    String(String),
}

/// Deserialize a byte size that can be specified either as a number (in bytes)
/// or as a string with units (e.g. "1 KB", "2 MiB").
pub fn deserialize<'de, D>(deserializer: D) -> Result<u64, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Value::deserialize(deserializer)?;
    match value {
        Value::Number(n) => Ok(n),
        Value::String(text) => {
            let parsed: Byte = text.parse().map_err(DeError::custom)?;
            Ok(parsed.as_u64())
        }
    }
}

/// Deserialize an optional byte size; see [`deserialize`].
pub fn deserialize_option<'de, D>(deserializer: D) -> Result<Option<u64>, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Option::<Value>::deserialize(deserializer)?;
    let Some(value) = value else {
        return Ok(None);
    };
    match value {
        Value::Number(n) => Ok(Some(n)),
        Value::String(text) => {
            let parsed: Byte = text.parse().map_err(DeError::custom)?;
            Ok(Some(parsed.as_u64()))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Debug, Deserialize)]
    struct Holder {
        #[serde(deserialize_with = "deserialize")]
        value: u64,
    }

    #[test]
    fn parses_plain_number() {
        let h: Holder = serde_json::from_str(r#"{"value": 1432}"#).unwrap();
        assert_eq!(h.value, 1432);
    }

    #[test]
    fn parses_unit_string() {
        let h: Holder = serde_json::from_str(r#"{"value": "2 KiB"}"#).unwrap();
        assert_eq!(h.value, 2048);
    }
}
