//! A wire value that may arrive either as an integer or as a string.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Integer-or-string value, used for fields such as `finish_reason` whose
/// wire type differs between upstream versions and compatible servers.
///
/// Decoding tries the integer form first, then the string form. Any other
/// JSON type fails to decode; response records wrap such fields so that the
/// failure resolves to `None` instead of aborting the whole envelope.
///
/// # Example
/// ```
/// use openai_service::scalar::IntOrStringValue;
///
/// let reason: IntOrStringValue = serde_json::from_str("\"stop\"").unwrap();
/// assert_eq!(reason, IntOrStringValue::String("stop".to_string()));
/// assert_eq!(reason.to_string(), "stop");
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(untagged)]
pub enum IntOrStringValue {
    Int(i64),
    String(String),
}

impl IntOrStringValue {
    /// The integer payload, if this value arrived as an integer.
    pub fn as_int(&self) -> Option<i64> {
        match self {
            IntOrStringValue::Int(value) => Some(*value),
            IntOrStringValue::String(_) => None,
        }
    }

    /// The string payload, if this value arrived as a string.
    pub fn as_str(&self) -> Option<&str> {
        match self {
            IntOrStringValue::Int(_) => None,
            IntOrStringValue::String(value) => Some(value),
        }
    }
}

impl fmt::Display for IntOrStringValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            IntOrStringValue::Int(value) => write!(f, "{value}"),
            IntOrStringValue::String(value) => f.write_str(value),
        }
    }
}

impl From<i64> for IntOrStringValue {
    fn from(value: i64) -> Self {
        IntOrStringValue::Int(value)
    }
}

impl From<String> for IntOrStringValue {
    fn from(value: String) -> Self {
        IntOrStringValue::String(value)
    }
}

impl From<&str> for IntOrStringValue {
    fn from(value: &str) -> Self {
        IntOrStringValue::String(value.to_string())
    }
}
