//! Closed tagged value for loosely typed model output.
//!
//! Function arguments and structured payloads arrive as arbitrary JSON. They are
//! narrowed to [`ArgValue`] at the decoder boundary so downstream code can match
//! exhaustively. JSON `null` has no counterpart: a null entry is treated as absent.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;

pub type ArgMap = BTreeMap<String, ArgValue>;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ArgValue {
    Bool(bool),
    Number(f64),
    String(String),
    Array(Vec<ArgValue>),
    Map(ArgMap),
}

impl ArgValue {
    /// Narrow a JSON value. Returns `None` for `null`; nulls nested in arrays are dropped.
    pub fn from_json(value: &Value) -> Option<ArgValue> {
        match value {
            Value::Null => None,
            Value::Bool(b) => Some(ArgValue::Bool(*b)),
            Value::Number(n) => n.as_f64().map(ArgValue::Number),
            Value::String(s) => Some(ArgValue::String(s.clone())),
            Value::Array(items) => Some(ArgValue::Array(
                items.iter().filter_map(ArgValue::from_json).collect(),
            )),
            Value::Object(map) => Some(ArgValue::Map(
                map.iter()
                    .filter_map(|(k, v)| ArgValue::from_json(v).map(|v| (k.clone(), v)))
                    .collect(),
            )),
        }
    }

    /// Narrow a JSON object into an argument map.
    pub fn map_from_json(value: &Value) -> Option<ArgMap> {
        match ArgValue::from_json(value)? {
            ArgValue::Map(map) => Some(map),
            _ => None,
        }
    }

    pub fn to_json(&self) -> Value {
        match self {
            ArgValue::Bool(b) => Value::Bool(*b),
            ArgValue::Number(n) => number_to_json(*n),
            ArgValue::String(s) => Value::String(s.clone()),
            ArgValue::Array(items) => Value::Array(items.iter().map(ArgValue::to_json).collect()),
            ArgValue::Map(map) => Value::Object(
                map.iter().map(|(k, v)| (k.clone(), v.to_json())).collect(),
            ),
        }
    }

    pub fn type_name(&self) -> &'static str {
        match self {
            ArgValue::Bool(_) => "boolean",
            ArgValue::Number(_) => "number",
            ArgValue::String(_) => "string",
            ArgValue::Array(_) => "array",
            ArgValue::Map(_) => "object",
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            ArgValue::String(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_f64(&self) -> Option<f64> {
        match self {
            ArgValue::Number(n) => Some(*n),
            _ => None,
        }
    }

    pub fn as_i64(&self) -> Option<i64> {
        match self {
            ArgValue::Number(n) if is_integral(*n) => Some(*n as i64),
            _ => None,
        }
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            ArgValue::Bool(b) => Some(*b),
            _ => None,
        }
    }
}

impl From<&str> for ArgValue {
    fn from(s: &str) -> Self {
        ArgValue::String(s.to_string())
    }
}

impl From<String> for ArgValue {
    fn from(s: String) -> Self {
        ArgValue::String(s)
    }
}

impl From<f64> for ArgValue {
    fn from(n: f64) -> Self {
        ArgValue::Number(n)
    }
}

impl From<i64> for ArgValue {
    fn from(n: i64) -> Self {
        ArgValue::Number(n as f64)
    }
}

impl From<bool> for ArgValue {
    fn from(b: bool) -> Self {
        ArgValue::Bool(b)
    }
}

/// Whole number that survives a round trip through `i64`.
pub(crate) fn is_integral(n: f64) -> bool {
    n.is_finite() && n.fract() == 0.0 && n.abs() < 9.007_199_254_740_992e15
}

fn number_to_json(n: f64) -> Value {
    if is_integral(n) {
        Value::from(n as i64)
    } else {
        serde_json::Number::from_f64(n)
            .map(Value::Number)
            .unwrap_or(Value::Null)
    }
}

/// Render an argument map as a JSON object.
pub fn map_to_json(map: &ArgMap) -> Value {
    Value::Object(map.iter().map(|(k, v)| (k.clone(), v.to_json())).collect())
}
