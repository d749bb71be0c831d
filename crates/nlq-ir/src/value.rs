//! Bind-parameter values

use serde::Serialize;
use uuid::Uuid;

/// Scalar value bound to a statement placeholder.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum ParamValue {
    Null,
    Bool(bool),
    Int(i64),
    Float(f64),
    Text(String),
}

impl From<&serde_json::Value> for ParamValue {
    fn from(value: &serde_json::Value) -> Self {
        match value {
            serde_json::Value::Null => ParamValue::Null,
            serde_json::Value::Bool(b) => ParamValue::Bool(*b),
            serde_json::Value::Number(n) => match n.as_i64() {
                Some(i) => ParamValue::Int(i),
                None => ParamValue::Float(n.as_f64().unwrap_or_default()),
            },
            serde_json::Value::String(s) => ParamValue::Text(s.clone()),
            // Composite values have no scalar binding; pass them through as JSON text
            other => ParamValue::Text(other.to_string()),
        }
    }
}

impl From<Uuid> for ParamValue {
    fn from(id: Uuid) -> Self {
        ParamValue::Text(id.to_string())
    }
}

impl From<&str> for ParamValue {
    fn from(s: &str) -> Self {
        ParamValue::Text(s.to_string())
    }
}

impl From<i64> for ParamValue {
    fn from(i: i64) -> Self {
        ParamValue::Int(i)
    }
}
