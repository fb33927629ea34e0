use crate::types::{ArgValue, FunctionCall};
use serde_json::Value;
use std::collections::BTreeMap;

#[derive(Debug, Default)]
struct PendingCall {
    id: Option<String>,
    name: String,
    arguments: String,
    decoded: Option<Value>,
}

/// Collects tool call frames (started + argument fragments, or whole calls) into
/// final [`FunctionCall`]s, in provider index order.
#[derive(Debug, Default)]
pub struct ToolCallAssembler {
    calls: BTreeMap<u32, PendingCall>,
}

impl ToolCallAssembler {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_empty(&self) -> bool {
        self.calls.is_empty()
    }

    pub fn on_started(&mut self, index: u32, id: Option<String>, name: String) {
        let call = self.calls.entry(index).or_default();
        if call.id.is_none() {
            call.id = id;
        }
        if call.name.is_empty() {
            call.name = name;
        }
    }

    pub fn on_partial(&mut self, index: u32, fragment: &str) {
        self.calls
            .entry(index)
            .or_default()
            .arguments
            .push_str(fragment);
    }

    pub fn on_complete(&mut self, id: Option<String>, name: String, arguments: Value) {
        let index = self.calls.keys().next_back().map(|i| i + 1).unwrap_or(0);
        self.calls.insert(
            index,
            PendingCall {
                id,
                name,
                arguments: String::new(),
                decoded: Some(arguments),
            },
        );
    }

    /// Decode every call. Arguments must form a JSON object (empty means `{}`).
    pub fn finalize(self) -> Result<Vec<FunctionCall>, String> {
        let mut out = Vec::with_capacity(self.calls.len());
        for (index, call) in self.calls {
            if call.name.is_empty() {
                return Err(format!("tool call #{index} has no function name"));
            }
            let value = match call.decoded {
                Some(v) => v,
                None => {
                    let raw = call.arguments.trim();
                    if raw.is_empty() {
                        Value::Object(Default::default())
                    } else {
                        serde_json::from_str(raw).map_err(|e| {
                            format!("arguments for `{}` are not valid JSON: {}", call.name, e)
                        })?
                    }
                }
            };
            let arguments = match &value {
                // Some providers send arguments as a JSON-encoded string.
                Value::String(s) => serde_json::from_str::<Value>(s)
                    .ok()
                    .and_then(|v| ArgValue::map_from_json(&v)),
                other => ArgValue::map_from_json(other),
            }
            .ok_or_else(|| format!("arguments for `{}` are not a JSON object", call.name))?;
            out.push(FunctionCall {
                id: call.id,
                name: call.name,
                arguments,
            });
        }
        Ok(out)
    }
}
