//! Scalar field values and their comparable string form.
//!
//! Request payloads and stub expectations are flat maps of field name to
//! scalar value. Anything that is not a scalar is kept as [`FieldValue::Unsupported`]
//! so it can still be loaded and compared, but it never converts to a string.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use thiserror::Error;

/// Field name to value map, ordered by key.
pub type Fields = BTreeMap<String, FieldValue>;

/// A single value inside a request payload or an expectation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum FieldValue {
    /// Text value
    String(String),
    /// Integer value (numbers without a fractional part)
    Int(i64),
    /// Floating-point value
    Float(f64),
    /// Boolean value
    Bool(bool),
    /// Nested object, array or null
    Unsupported(serde_json::Value),
}

/// A value has no comparable string form.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("was not possible to infer a string representation for {kind} value")]
pub struct ConversionError {
    /// Kind of the rejected value
    pub kind: &'static str,
}

impl FieldValue {
    /// Short name of the value kind, used in logs and errors.
    pub fn kind(&self) -> &'static str {
        match self {
            FieldValue::String(_) => "string",
            FieldValue::Int(_) => "integer",
            FieldValue::Float(_) => "float",
            FieldValue::Bool(_) => "boolean",
            FieldValue::Unsupported(serde_json::Value::Null) => "null",
            FieldValue::Unsupported(serde_json::Value::Array(_)) => "array",
            FieldValue::Unsupported(serde_json::Value::Object(_)) => "object",
            FieldValue::Unsupported(_) => "unsupported",
        }
    }
}

/// Render a value as the text a regex is run against.
///
/// Floats use fixed 5-decimal precision; non-scalars are rejected.
pub fn to_comparable_string(value: &FieldValue) -> Result<String, ConversionError> {
    match value {
        FieldValue::String(s) => Ok(s.clone()),
        FieldValue::Int(i) => Ok(i.to_string()),
        FieldValue::Float(f) => Ok(format!("{:.5}", f)),
        FieldValue::Bool(b) => Ok(b.to_string()),
        other => Err(ConversionError { kind: other.kind() }),
    }
}

impl fmt::Display for FieldValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FieldValue::String(s) => f.write_str(s),
            FieldValue::Int(i) => write!(f, "{}", i),
            FieldValue::Float(v) => write!(f, "{}", v),
            FieldValue::Bool(b) => write!(f, "{}", b),
            FieldValue::Unsupported(v) => write!(f, "{}", v),
        }
    }
}

impl From<&str> for FieldValue {
    fn from(s: &str) -> Self {
        FieldValue::String(s.to_string())
    }
}

impl From<String> for FieldValue {
    fn from(s: String) -> Self {
        FieldValue::String(s)
    }
}

impl From<i64> for FieldValue {
    fn from(i: i64) -> Self {
        FieldValue::Int(i)
    }
}

impl From<i32> for FieldValue {
    fn from(i: i32) -> Self {
        FieldValue::Int(i64::from(i))
    }
}

impl From<f64> for FieldValue {
    fn from(f: f64) -> Self {
        FieldValue::Float(f)
    }
}

impl From<f32> for FieldValue {
    fn from(f: f32) -> Self {
        FieldValue::Float(f64::from(f))
    }
}

impl From<bool> for FieldValue {
    fn from(b: bool) -> Self {
        FieldValue::Bool(b)
    }
}
