//! Compute-graph IR for the calibr calibration importer.
//!
//! A [`Module`] holds functions whose ops are kept in program order. Values are
//! addressed by name, which is unique module-wide; an op is named after its
//! first result. The importer only needs use-def queries, op tags and a side
//! channel of attributes, so that is all this crate models.

pub mod graph;

pub use graph::*;

use serde::{Deserialize, Serialize};

/// Structural problems found in a loaded module.
#[derive(Debug, thiserror::Error)]
pub enum GraphError {
    #[error("value `{0}` is defined more than once")]
    DuplicateValue(String),

    #[error("operand `{operand}` of `{op}` is used before it is defined")]
    UndefinedOperand { operand: String, op: String },

    #[error("unknown value `{0}`")]
    UnknownValue(String),

    #[error("malformed module JSON: {0}")]
    Json(#[from] serde_json::Error),
}

/// Serializes a module (or any IR node) to pretty JSON.
///
/// # Example
///
/// ```
/// use calibr_graph::{to_json, Module};
///
/// let json = to_json(&Module::new("net")).unwrap();
/// assert!(json.contains(r#""state": "TOP_F32""#));
/// ```
pub fn to_json<T: Serialize>(value: &T) -> Result<String, GraphError> {
    Ok(serde_json::to_string_pretty(value)?)
}

/// Deserializes an IR node from JSON.
pub fn from_json<T: for<'de> Deserialize<'de>>(json: &str) -> Result<T, GraphError> {
    Ok(serde_json::from_str(json)?)
}
