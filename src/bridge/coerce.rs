//! Argument coercion.
//!
//! | declared  | accepted as-is | coerced from                          |
//! |-----------|----------------|---------------------------------------|
//! | string    | string         | integral number (`12` → `"12"`)       |
//! | number    | number         | numeric string (`" 2.5 "` → `2.5`)    |
//! | integer   | integral number| integral numeric string (`"12"`, `"12.0"`) |
//! | boolean   | bool           | `"true"` / `"false"`, any case        |
//! | array     | array          | nothing                               |
//! | object    | map            | nothing                               |
//!
//! Anything else is rejected rather than guessed.

use super::signature::{ParamSpec, ParamType};
use crate::types::value::is_integral;
use crate::types::ArgValue;

pub fn coerce(value: &ArgValue, target: ParamType) -> Result<ArgValue, String> {
    let coerced = match (target, value) {
        (ParamType::String, ArgValue::String(_))
        | (ParamType::Number, ArgValue::Number(_))
        | (ParamType::Boolean, ArgValue::Bool(_))
        | (ParamType::Array, ArgValue::Array(_))
        | (ParamType::Object, ArgValue::Map(_)) => Some(value.clone()),

        (ParamType::String, ArgValue::Number(n)) if is_integral(*n) => {
            Some(ArgValue::String((*n as i64).to_string()))
        }
        (ParamType::Number, ArgValue::String(s)) => parse_number(s).map(ArgValue::Number),
        (ParamType::Integer, ArgValue::Number(n)) if is_integral(*n) => Some(value.clone()),
        (ParamType::Integer, ArgValue::String(s)) => parse_number(s)
            .filter(|n| is_integral(*n))
            .map(ArgValue::Number),
        (ParamType::Boolean, ArgValue::String(s)) => match s.trim().to_ascii_lowercase().as_str() {
            "true" => Some(ArgValue::Bool(true)),
            "false" => Some(ArgValue::Bool(false)),
            _ => None,
        },
        _ => None,
    };
    coerced.ok_or_else(|| format!("expected {}, got {}", target, describe(value)))
}

fn parse_number(s: &str) -> Option<f64> {
    s.trim().parse::<f64>().ok().filter(|n| n.is_finite())
}

fn describe(value: &ArgValue) -> String {
    match value {
        ArgValue::String(s) => format!("string {:?}", s),
        ArgValue::Number(n) => format!("number {}", n),
        ArgValue::Bool(b) => format!("boolean {}", b),
        other => other.type_name().to_string(),
    }
}

/// Coerce and check enum and range constraints.
pub fn check(spec: &ParamSpec, value: &ArgValue) -> Result<ArgValue, String> {
    let value = coerce(value, spec.param_type)?;
    if !spec.allowed.is_empty() {
        if let Some(s) = value.as_str() {
            if !spec.allowed.iter().any(|a| a == s) {
                return Err(format!("{:?} is not one of [{}]", s, spec.allowed.join(", ")));
            }
        }
    }
    if let Some(n) = value.as_f64() {
        if let Some(min) = spec.minimum.filter(|min| n < *min) {
            return Err(format!("{} is below the minimum {}", n, min));
        }
        if let Some(max) = spec.maximum.filter(|max| n > *max) {
            return Err(format!("{} is above the maximum {}", n, max));
        }
    }
    Ok(value)
}
