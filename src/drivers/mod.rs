//! Provider 驱动抽象层 — 通过 trait 隔离各厂商的线路格式
//!
//! Provider driver abstraction layer. A driver translates a canonical [`Request`] into
//! one provider's wire schema and reduces that provider's payloads to [`Frame`]s.
//! Nothing outside this module knows what a provider's JSON looks like.
//!
//! | Driver | API style | Streaming framing |
//! |--------|-----------|-------------------|
//! | [`OpenAiDriver`] | OpenAI chat completions (and compatibles) | SSE |
//! | [`AnthropicDriver`] | Anthropic messages | SSE |
//! | [`OllamaDriver`] | Ollama chat | NDJSON |

pub mod anthropic;
pub mod ollama;

use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::sync::Arc;

use crate::error::{Error, ErrorKind};
use crate::pipeline::{Frame, Framing};
use crate::transport::Method;
use crate::types::{MessageRole, Request, ResponseFormat, ToolDefinition, Usage};

pub use anthropic::AnthropicDriver;
pub use ollama::OllamaDriver;

/// Wire schema family spoken by a provider.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ApiStyle {
    #[serde(alias = "openai_compatible")]
    OpenAi,
    Anthropic,
    Ollama,
}

/// Provider-specific HTTP request, relative to the provider base URL.
#[derive(Debug, Clone)]
pub struct DriverRequest {
    /// Path appended to the base URL, e.g. `/chat/completions`.
    pub path: String,
    pub method: Method,
    pub headers: Vec<(String, String)>,
    pub body: Value,
    pub stream: bool,
}

/// Core trait for provider-specific API adaptation.
///
/// Each API style has a concrete implementation; the live adapter selects one
/// from [`ApiStyle`] and holds it as `Arc<dyn ProviderDriver>`.
pub trait ProviderDriver: Send + Sync + std::fmt::Debug {
    /// Unique provider identifier (matches the config `id`).
    fn provider_id(&self) -> &str;

    fn api_style(&self) -> ApiStyle;

    /// Body framing for a streaming or non-streaming call.
    fn framing(&self, stream: bool) -> Framing;

    fn build_request(&self, request: &Request, model: &str) -> Result<DriverRequest, Error>;

    fn auth_headers(&self, api_key: &str) -> Vec<(String, String)> {
        vec![("authorization".into(), format!("Bearer {}", api_key))]
    }

    fn requires_api_key(&self) -> bool {
        true
    }

    /// Read-only endpoint listing models; doubles as the health probe.
    fn models_path(&self) -> &str;

    fn parse_models(&self, body: &Value) -> Vec<String>;

    /// Reduce a complete (non-streaming) response document.
    fn parse_response(&self, body: &Value) -> Result<Vec<Frame>, Error>;

    /// Reduce one streaming payload.
    fn parse_stream_event(&self, payload: &Value) -> Vec<Frame>;

    /// Sentinel payload that ends a stream (e.g. `[DONE]`).
    fn is_stream_done(&self, data: &str) -> bool;
}

/// OpenAI-compatible driver — OpenAI, DeepSeek, Groq, OpenRouter and friends.
#[derive(Debug)]
pub struct OpenAiDriver {
    provider_id: String,
}

impl OpenAiDriver {
    pub fn new(provider_id: impl Into<String>) -> Self {
        Self {
            provider_id: provider_id.into(),
        }
    }
}

impl ProviderDriver for OpenAiDriver {
    fn provider_id(&self) -> &str {
        &self.provider_id
    }

    fn api_style(&self) -> ApiStyle {
        ApiStyle::OpenAi
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
            "messages": chat_messages(request),
            "stream": request.stream,
            "temperature": request.temperature,
            "max_tokens": request.max_tokens,
        });
        if request.stream {
            body["stream_options"] = json!({ "include_usage": true });
        }
        if !request.tools.is_empty() {
            body["tools"] = function_tools(&request.tools);
        }
        if request.response_format == ResponseFormat::Json {
            body["response_format"] = json!({ "type": "json_object" });
        }

        Ok(DriverRequest {
            path: "/chat/completions".into(),
            method: Method::Post,
            headers: Vec::new(),
            body,
            stream: request.stream,
        })
    }

    fn models_path(&self) -> &str {
        "/models"
    }

    fn parse_models(&self, body: &Value) -> Vec<String> {
        string_list(body.get("data"), "id")
    }

    fn parse_response(&self, body: &Value) -> Result<Vec<Frame>, Error> {
        if let Some(err) = body.get("error") {
            return Ok(vec![failure_frame(err)]);
        }
        let message = body.pointer("/choices/0/message").ok_or_else(|| {
            Error::malformed(format!(
                "{}: response has no choices[0].message",
                self.provider_id
            ))
        })?;

        let mut frames = Vec::new();
        if let Some(content) = message.get("content").and_then(|c| c.as_str()) {
            frames.push(Frame::TextDelta(content.to_string()));
        }
        if let Some(calls) = message.get("tool_calls").and_then(|v| v.as_array()) {
            for (i, tc) in calls.iter().enumerate() {
                let index = i as u32;
                frames.push(Frame::ToolCallStart {
                    index,
                    id: tc.get("id").and_then(|v| v.as_str()).map(String::from),
                    name: tc
                        .pointer("/function/name")
                        .and_then(|v| v.as_str())
                        .unwrap_or_default()
                        .to_string(),
                });
                if let Some(args) = tc.pointer("/function/arguments").and_then(|v| v.as_str()) {
                    frames.push(Frame::ToolCallArgs {
                        index,
                        fragment: args.to_string(),
                    });
                }
            }
        }
        if let Some(reason) = body.pointer("/choices/0/finish_reason").and_then(|r| r.as_str()) {
            frames.push(Frame::Finish(reason.to_string()));
        }
        if let Some(usage) = openai_usage(body) {
            frames.push(Frame::Usage(usage));
        }
        frames.push(Frame::Done);
        Ok(frames)
    }

    fn parse_stream_event(&self, payload: &Value) -> Vec<Frame> {
        if let Some(err) = payload.get("error") {
            return vec![failure_frame(err)];
        }
        let mut frames = Vec::new();

        // Content delta
        if let Some(content) = payload
            .pointer("/choices/0/delta/content")
            .and_then(|c| c.as_str())
        {
            if !content.is_empty() {
                frames.push(Frame::TextDelta(content.to_string()));
            }
        }

        if let Some(calls) = payload
            .pointer("/choices/0/delta/tool_calls")
            .and_then(|v| v.as_array())
        {
            for (pos, tc) in calls.iter().enumerate() {
                let index = tc
                    .get("index")
                    .and_then(|i| i.as_u64())
                    .unwrap_or(pos as u64) as u32;
                let id = tc.get("id").and_then(|v| v.as_str()).map(String::from);
                let name = tc.pointer("/function/name").and_then(|v| v.as_str());
                if id.is_some() || name.is_some() {
                    frames.push(Frame::ToolCallStart {
                        index,
                        id,
                        name: name.unwrap_or_default().to_string(),
                    });
                }
                if let Some(args) = tc.pointer("/function/arguments").and_then(|v| v.as_str()) {
                    if !args.is_empty() {
                        frames.push(Frame::ToolCallArgs {
                            index,
                            fragment: args.to_string(),
                        });
                    }
                }
            }
        }

        // Finish reason
        if let Some(reason) = payload
            .pointer("/choices/0/finish_reason")
            .and_then(|r| r.as_str())
        {
            frames.push(Frame::Finish(reason.to_string()));
        }

        if let Some(usage) = openai_usage(payload) {
            frames.push(Frame::Usage(usage));
        }
        frames
    }

    fn is_stream_done(&self, data: &str) -> bool {
        data.trim() == "[DONE]"
    }
}

/// Factory function to create the driver for an API style.
pub fn create_driver(api_style: ApiStyle, provider_id: &str) -> Arc<dyn ProviderDriver> {
    match api_style {
        ApiStyle::OpenAi => Arc::new(OpenAiDriver::new(provider_id)),
        ApiStyle::Anthropic => Arc::new(AnthropicDriver::new(provider_id)),
        ApiStyle::Ollama => Arc::new(OllamaDriver::new(provider_id)),
    }
}

/// OpenAI-shaped message list: system text first, then the history without system turns.
pub(crate) fn chat_messages(request: &Request) -> Vec<Value> {
    let mut out = Vec::with_capacity(request.messages.len() + 1);
    if let Some(system) = request.system_text() {
        out.push(json!({ "role": "system", "content": system }));
    }
    out.extend(
        request
            .messages
            .iter()
            .filter(|m| m.role != MessageRole::System)
            .map(|m| json!({ "role": m.role.as_str(), "content": m.content })),
    );
    out
}

pub(crate) fn function_tools(tools: &[ToolDefinition]) -> Value {
    Value::Array(
        tools
            .iter()
            .map(|t| {
                json!({
                    "type": "function",
                    "function": {
                        "name": t.name,
                        "description": t.description.clone().unwrap_or_default(),
                        "parameters": t.parameters,
                    }
                })
            })
            .collect(),
    )
}

fn openai_usage(v: &Value) -> Option<Usage> {
    let u = v.get("usage").filter(|u| u.is_object())?;
    let prompt = u["prompt_tokens"].as_u64().unwrap_or(0);
    let completion = u["completion_tokens"].as_u64().unwrap_or(0);
    Some(Usage {
        prompt_tokens: prompt,
        completion_tokens: completion,
        total_tokens: u["total_tokens"].as_u64().unwrap_or(prompt + completion),
    })
}

pub(crate) fn string_list(items: Option<&Value>, field: &str) -> Vec<String> {
    items
        .and_then(|v| v.as_array())
        .map(|arr| {
            arr.iter()
                .filter_map(|m| m.get(field).and_then(|id| id.as_str()).map(String::from))
                .collect()
        })
        .unwrap_or_default()
}

/// Map an in-band provider error object (or string) to a failure frame.
pub(crate) fn failure_frame(err: &Value) -> Frame {
    let message = err
        .get("message")
        .and_then(|m| m.as_str())
        .or_else(|| err.as_str())
        .unwrap_or("provider reported an error")
        .to_string();
    let error_type = err
        .get("type")
        .or_else(|| err.get("code"))
        .and_then(|t| t.as_str())
        .unwrap_or_default();
    Frame::Failure {
        kind: kind_from_error_type(error_type),
        message,
    }
}

/// Classify a provider error type string.
pub fn kind_from_error_type(error_type: &str) -> ErrorKind {
    let t = error_type.to_ascii_lowercase();
    if t.contains("rate_limit") || t.contains("quota") {
        ErrorKind::RateLimited
    } else if t.contains("authentication") || t.contains("api_key") || t.contains("permission") {
        ErrorKind::Unauthorized
    } else if t.contains("invalid_request") || t.contains("not_found") {
        ErrorKind::InvalidRequest
    } else if t.contains("timeout") {
        ErrorKind::Timeout
    } else {
        ErrorKind::TransientNetwork
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::Message;

    #[test]
    fn test_openai_driver_build_request() {
        let driver = OpenAiDriver::new("openai");
        let request = Request::new(vec![Message::user("Hello")])
            .with_system_prompt("Be brief.")
            .with_stream(true)
            .with_response_format(ResponseFormat::Json);
        let req = driver.build_request(&request, "gpt-4o-mini").unwrap();
        assert!(req.stream);
        assert_eq!(req.path, "/chat/completions");
        assert_eq!(req.body["model"], "gpt-4o-mini");
        assert_eq!(req.body["temperature"], 0.7);
        assert_eq!(req.body["messages"][0]["role"], "system");
        assert_eq!(req.body["messages"][1]["content"], "Hello");
        assert_eq!(req.body["stream_options"]["include_usage"], true);
        assert_eq!(req.body["response_format"]["type"], "json_object");
    }

    #[test]
    fn test_openai_tools_serialized() {
        let driver = OpenAiDriver::new("openai");
        let request = Request::user("log my lunch").with_tools(vec![ToolDefinition {
            name: "log_food".into(),
            description: Some("Record a food entry".into()),
            parameters: json!({"type": "object", "properties": {}}),
        }]);
        let req = driver.build_request(&request, "gpt-4o").unwrap();
        assert_eq!(req.body["tools"][0]["type"], "function");
        assert_eq!(req.body["tools"][0]["function"]["name"], "log_food");
    }

    #[test]
    fn test_openai_driver_parse_response() {
        let driver = OpenAiDriver::new("openai");
        let body = json!({
            "choices": [{"message": {"content": "Hi there!"}, "finish_reason": "stop"}],
            "usage": {"prompt_tokens": 10, "completion_tokens": 5, "total_tokens": 15}
        });
        let frames = driver.parse_response(&body).unwrap();
        assert_eq!(frames[0], Frame::TextDelta("Hi there!".into()));
        assert_eq!(frames[1], Frame::Finish("stop".into()));
        assert_eq!(frames[2], Frame::Usage(Usage::new(10, 5)));
        assert_eq!(frames[3], Frame::Done);
    }

    #[test]
    fn test_openai_driver_parse_stream() {
        let driver = OpenAiDriver::new("openai");
        let data = json!({"choices":[{"delta":{"content":"Hello"},"index":0}]});
        assert_eq!(
            driver.parse_stream_event(&data),
            vec![Frame::TextDelta("Hello".into())]
        );
    }

    #[test]
    fn test_openai_stream_tool_call_frames() {
        let driver = OpenAiDriver::new("openai");
        let start = json!({"choices":[{"delta":{"tool_calls":[{"index":0,"id":"call_1","type":"function","function":{"name":"log_food","arguments":""}}]}}]});
        let args = json!({"choices":[{"delta":{"tool_calls":[{"index":0,"function":{"arguments":"{\"food\""}}]}}]});
        assert_eq!(
            driver.parse_stream_event(&start),
            vec![Frame::ToolCallStart {
                index: 0,
                id: Some("call_1".into()),
                name: "log_food".into()
            }]
        );
        assert_eq!(
            driver.parse_stream_event(&args),
            vec![Frame::ToolCallArgs {
                index: 0,
                fragment: "{\"food\"".into()
            }]
        );
    }

    #[test]
    fn test_stream_done_detection() {
        let driver = OpenAiDriver::new("openai");
        assert!(driver.is_stream_done("[DONE]"));
        assert!(!driver.is_stream_done(r#"{"choices":[]}"#));
    }

    #[test]
    fn in_band_errors_are_classified() {
        let driver = OpenAiDriver::new("openai");
        let frames = driver.parse_stream_event(
            &json!({"error": {"message": "quota exceeded", "type": "insufficient_quota"}}),
        );
        assert_eq!(
            frames,
            vec![Frame::Failure {
                kind: ErrorKind::RateLimited,
                message: "quota exceeded".into()
            }]
        );
    }

    #[test]
    fn parses_model_listing() {
        let driver = OpenAiDriver::new("openai");
        let body = json!({"data": [{"id": "gpt-4o"}, {"id": "gpt-4o-mini"}]});
        assert_eq!(driver.parse_models(&body), vec!["gpt-4o", "gpt-4o-mini"]);
    }
}
