//! Function calling types: declared tools, model proposals and dispatch results.

use crate::types::value::{ArgMap, ArgValue};
use serde::{Deserialize, Serialize};

/// Tool advertised to the provider in a request.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolDefinition {
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    /// JSON Schema of the argument object.
    pub parameters: serde_json::Value,
}

/// Model-declared invocation. Immutable once decoded.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FunctionCall {
    /// Provider-assigned call id, when the wire format has one.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    pub name: String,
    #[serde(default)]
    pub arguments: ArgMap,
}

impl FunctionCall {
    pub fn new(name: impl Into<String>, arguments: ArgMap) -> Self {
        Self {
            id: None,
            name: name.into(),
            arguments,
        }
    }

    pub fn with_id(mut self, id: impl Into<String>) -> Self {
        self.id = Some(id.into());
        self
    }
}

/// Why an execution ended the way it did.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum Outcome {
    Completed,
    /// Arguments were missing or could not be coerced unambiguously.
    InvalidArguments { issues: Vec<String> },
    UnknownFunction,
    HandlerFailed,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExecutionResult {
    pub success: bool,
    pub function_name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<ArgMap>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    pub outcome: Outcome,
}

impl ExecutionResult {
    pub fn completed(function_name: impl Into<String>, data: ArgMap) -> Self {
        Self {
            success: true,
            function_name: function_name.into(),
            data: Some(data),
            error: None,
            outcome: Outcome::Completed,
        }
    }

    pub fn failed(function_name: impl Into<String>, outcome: Outcome, error: impl Into<String>) -> Self {
        Self {
            success: false,
            function_name: function_name.into(),
            data: None,
            error: Some(error.into()),
            outcome,
        }
    }

    /// Readable rendering for feeding the result back into a conversation.
    pub fn to_context_string(&self) -> String {
        if !self.success {
            return format!(
                "Tool error: {}",
                self.error.as_deref().unwrap_or("unknown failure")
            );
        }
        match &self.data {
            Some(data) => {
                let mut lines = Vec::new();
                format_map(data, 0, &mut lines);
                lines.join("\n")
            }
            None => String::new(),
        }
    }
}

fn format_map(map: &ArgMap, indent: usize, lines: &mut Vec<String>) {
    let prefix = "  ".repeat(indent);
    for (key, value) in map {
        match value {
            ArgValue::Map(inner) => {
                lines.push(format!("{prefix}{key}:"));
                format_map(inner, indent + 1, lines);
            }
            // Long lists are clipped to keep the context compact.
            ArgValue::Array(items) => {
                let shown: Vec<String> = items.iter().take(5).map(scalar_text).collect();
                lines.push(format!("{prefix}{key}: {}", shown.join(", ")));
            }
            other => lines.push(format!("{prefix}{key}: {}", scalar_text(other))),
        }
    }
}

fn scalar_text(value: &ArgValue) -> String {
    match value {
        ArgValue::String(s) => s.clone(),
        ArgValue::Bool(b) => b.to_string(),
        ArgValue::Number(n) => match value.as_i64() {
            Some(i) => i.to_string(),
            None => n.to_string(),
        },
        other => other.to_json().to_string(),
    }
}
