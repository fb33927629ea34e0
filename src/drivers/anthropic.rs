//! Anthropic Messages API 驱动 — 实现 Anthropic 特有的请求/响应格式转换
//!
//! Anthropic Messages API driver. Handles the key differences from OpenAI:
//! - System text is a top-level `system` parameter, not part of `messages`.
//! - Content uses typed blocks: `[{"type": "text", "text": "..."}]`.
//! - Streaming uses typed events (`content_block_delta`, `message_stop`, ...).
//! - Authentication uses `x-api-key` plus an `anthropic-version` header.
//! - `max_tokens` is required.

use serde_json::{json, Value};

use crate::error::Error;
use crate::pipeline::{Frame, Framing};
use crate::transport::Method;
use crate::types::{MessageRole, Request, Usage};

use super::{failure_frame, string_list, ApiStyle, DriverRequest, ProviderDriver};

const ANTHROPIC_VERSION: &str = "2023-06-01";

/// Anthropic Messages API driver.
#[derive(Debug)]
pub struct AnthropicDriver {
    provider_id: String,
}

impl AnthropicDriver {
    pub fn new(provider_id: impl Into<String>) -> Self {
        Self {
            provider_id: provider_id.into(),
        }
    }

    fn content_blocks(request: &Request) -> Vec<Value> {
        request
            .messages
            .iter()
            .filter(|m| m.role != MessageRole::System)
            .map(|m| {
                json!({
                    "role": m.role.as_str(),
                    "content": [{ "type": "text", "text": m.content }],
                })
            })
            .collect()
    }
}

fn normalize_stop_reason(reason: &str) -> String {
    match reason {
        "end_turn" | "stop_sequence" => "stop".to_string(),
        "max_tokens" => "length".to_string(),
        "tool_use" => "tool_calls".to_string(),
        other => other.to_string(),
    }
}

impl ProviderDriver for AnthropicDriver {
    fn provider_id(&self) -> &str {
        &self.provider_id
    }

    fn api_style(&self) -> ApiStyle {
        ApiStyle::Anthropic
    }

    fn framing(&self, stream: bool) -> Framing {
        if stream {
            Framing::Sse
        } else {
            Framing::Document
        }
    }

    fn build_request(&self, request: &Request, model: &str) -> Result<DriverRequest, Error> {
        let mut body = json!({
            "model": model,
            "messages": Self::content_blocks(request),
            "max_tokens": request.max_tokens,
            "temperature": request.temperature,
            "stream": request.stream,
        });
        if let Some(system) = request.system_text() {
            body["system"] = Value::String(system);
        }
        if !request.tools.is_empty() {
            body["tools"] = Value::Array(
                request
                    .tools
                    .iter()
                    .map(|t| {
                        json!({
                            "name": t.name,
                            "description": t.description.clone().unwrap_or_default(),
                            "input_schema": t.parameters,
                        })
                    })
                    .collect(),
            );
        }

        Ok(DriverRequest {
            path: "/messages".into(),
            method: Method::Post,
            headers: vec![("anthropic-version".into(), ANTHROPIC_VERSION.into())],
            body,
            stream: request.stream,
        })
    }

    fn auth_headers(&self, api_key: &str) -> Vec<(String, String)> {
        vec![
            ("x-api-key".into(), api_key.to_string()),
            ("anthropic-version".into(), ANTHROPIC_VERSION.into()),
        ]
    }

    fn models_path(&self) -> &str {
        "/models"
    }

    fn parse_models(&self, body: &Value) -> Vec<String> {
        string_list(body.get("data"), "id")
    }

    fn parse_response(&self, body: &Value) -> Result<Vec<Frame>, Error> {
        if body.get("type").and_then(|t| t.as_str()) == Some("error") {
            let err = body.get("error").cloned().unwrap_or(Value::Null);
            return Ok(vec![failure_frame(&err)]);
        }
        let blocks = body
            .get("content")
            .and_then(|c| c.as_array())
            .ok_or_else(|| {
                Error::malformed(format!("{}: response has no content array", self.provider_id))
            })?;

        let mut frames = Vec::new();
        for block in blocks {
            match block.get("type").and_then(|t| t.as_str()) {
                Some("text") => {
                    if let Some(text) = block.get("text").and_then(|t| t.as_str()) {
                        frames.push(Frame::TextDelta(text.to_string()));
                    }
                }
                Some("tool_use") => frames.push(Frame::ToolCall {
                    id: block.get("id").and_then(|v| v.as_str()).map(String::from),
                    name: block
                        .get("name")
                        .and_then(|v| v.as_str())
                        .unwrap_or_default()
                        .to_string(),
                    arguments: block.get("input").cloned().unwrap_or(json!({})),
                }),
                _ => {}
            }
        }

        // Normalize stop_reason → finish_reason
        if let Some(reason) = body.get("stop_reason").and_then(|v| v.as_str()) {
            frames.push(Frame::Finish(normalize_stop_reason(reason)));
        }
        if let Some(u) = body.get("usage") {
            frames.push(Frame::Usage(Usage::new(
                u["input_tokens"].as_u64().unwrap_or(0),
                u["output_tokens"].as_u64().unwrap_or(0),
            )));
        }
        frames.push(Frame::Done);
        Ok(frames)
    }

    fn parse_stream_event(&self, v: &Value) -> Vec<Frame> {
        let event_type = v.get("type").and_then(|t| t.as_str()).unwrap_or("");
        let index = v.get("index").and_then(|i| i.as_u64()).unwrap_or(0) as u32;

        match event_type {
            "message_start" => v
                .pointer("/message/usage/input_tokens")
                .and_then(|n| n.as_u64())
                .map(|n| vec![Frame::Usage(Usage::new(n, 0))])
                .unwrap_or_default(),
            "content_block_start" => {
                let block = v.get("content_block").cloned().unwrap_or(Value::Null);
                match block.get("type").and_then(|t| t.as_str()) {
                    Some("tool_use") => vec![Frame::ToolCallStart {
                        index,
                        id: block.get("id").and_then(|v| v.as_str()).map(String::from),
                        name: block
                            .get("name")
                            .and_then(|v| v.as_str())
                            .unwrap_or_default()
                            .to_string(),
                    }],
                    Some("text") => block
                        .get("text")
                        .and_then(|t| t.as_str())
                        .filter(|t| !t.is_empty())
                        .map(|t| vec![Frame::TextDelta(t.to_string())])
                        .unwrap_or_default(),
                    _ => Vec::new(),
                }
            }
            "content_block_delta" => {
                if let Some(text) = v.pointer("/delta/text").and_then(|t| t.as_str()) {
                    return vec![Frame::TextDelta(text.to_string())];
                }
                if let Some(partial) = v.pointer("/delta/partial_json").and_then(|t| t.as_str()) {
                    return vec![Frame::ToolCallArgs {
                        index,
                        fragment: partial.to_string(),
                    }];
                }
                Vec::new()
            }
            "message_delta" => {
                let mut frames = Vec::new();
                if let Some(r) = v.pointer("/delta/stop_reason").and_then(|r| r.as_str()) {
                    frames.push(Frame::Finish(normalize_stop_reason(r)));
                }
                if let Some(n) = v.pointer("/usage/output_tokens").and_then(|n| n.as_u64()) {
                    frames.push(Frame::Usage(Usage::new(0, n)));
                }
                frames
            }
            "message_stop" => vec![Frame::Done],
            "error" => {
                let error = v.get("error").cloned().unwrap_or(Value::Null);
                vec![failure_frame(&error)]
            }
            _ => Vec::new(),
        }
    }

    fn is_stream_done(&self, _data: &str) -> bool {
        // Anthropic signals completion with a `message_stop` event, not a sentinel.
        false
    }
}
