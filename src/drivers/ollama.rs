//! Ollama chat API driver (local models, NDJSON streaming).
//!
//! Every streamed line is a complete object. The final line carries `done: true`
//! together with the token counts and a `done_reason`.

use serde_json::{json, Value};

use crate::error::Error;
use crate::pipeline::{Frame, Framing};
use crate::transport::Method;
use crate::types::{Request, ResponseFormat, Usage};

use super::{chat_messages, failure_frame, function_tools, string_list, ApiStyle, DriverRequest, ProviderDriver};

#[derive(Debug)]
pub struct OllamaDriver {
    provider_id: String,
}

impl OllamaDriver {
    pub fn new(provider_id: impl Into<String>) -> Self {
        Self {
            provider_id: provider_id.into(),
        }
    }

    fn frames_of(&self, v: &Value) -> Vec<Frame> {
        if let Some(err) = v.get("error") {
            return vec![failure_frame(err)];
        }
        let mut frames = Vec::new();
        if let Some(content) = v.pointer("/message/content").and_then(|c| c.as_str()) {
            if !content.is_empty() {
                frames.push(Frame::TextDelta(content.to_string()));
            }
        }
        if let Some(calls) = v.pointer("/message/tool_calls").and_then(|c| c.as_array()) {
            for call in calls {
                frames.push(Frame::ToolCall {
                    id: call.get("id").and_then(|v| v.as_str()).map(String::from),
                    name: call
                        .pointer("/function/name")
                        .and_then(|v| v.as_str())
                        .unwrap_or_default()
                        .to_string(),
                    arguments: call
                        .pointer("/function/arguments")
                        .cloned()
                        .unwrap_or(json!({})),
                });
            }
        }
        if v.get("done").and_then(|d| d.as_bool()) == Some(true) {
            let prompt = v.get("prompt_eval_count").and_then(|n| n.as_u64());
            let completion = v.get("eval_count").and_then(|n| n.as_u64());
            if prompt.is_some() || completion.is_some() {
                frames.push(Frame::Usage(Usage::new(
                    prompt.unwrap_or(0),
                    completion.unwrap_or(0),
                )));
            }
            let reason = v
                .get("done_reason")
                .and_then(|r| r.as_str())
                .unwrap_or("stop");
            frames.push(Frame::Finish(reason.to_string()));
            frames.push(Frame::Done);
        }
        frames
    }
}

impl ProviderDriver for OllamaDriver {
    fn provider_id(&self) -> &str {
        &self.provider_id
    }

    fn api_style(&self) -> ApiStyle {
        ApiStyle::Ollama
    }

    fn framing(&self, stream: bool) -> Framing {
        if stream {
            Framing::Ndjson
        } else {
            Framing::Document
        }
    }

    fn build_request(&self, request: &Request, model: &str) -> Result<DriverRequest, Error> {
        let mut body = json!({
            "model": model,
            "messages": chat_messages(request),
            "stream": request.stream,
            "options": {
                "temperature": request.temperature,
                "num_predict": request.max_tokens,
            },
        });
        if request.response_format == ResponseFormat::Json {
            body["format"] = json!("json");
        }
        if !request.tools.is_empty() {
            body["tools"] = function_tools(&request.tools);
        }
        Ok(DriverRequest {
            path: "/api/chat".into(),
            method: Method::Post,
            headers: Vec::new(),
            body,
            stream: request.stream,
        })
    }

    fn requires_api_key(&self) -> bool {
        false
    }

    fn models_path(&self) -> &str {
        "/api/tags"
    }

    fn parse_models(&self, body: &Value) -> Vec<String> {
        string_list(body.get("models"), "name")
    }

    fn parse_response(&self, body: &Value) -> Result<Vec<Frame>, Error> {
        if !body.is_object() {
            return Err(Error::malformed(format!(
                "{}: response is not a JSON object",
                self.provider_id
            )));
        }
        let mut frames = self.frames_of(body);
        if !frames.contains(&Frame::Done) {
            frames.push(Frame::Done);
        }
        Ok(frames)
    }

    fn parse_stream_event(&self, payload: &Value) -> Vec<Frame> {
        self.frames_of(payload)
    }

    fn is_stream_done(&self, _data: &str) -> bool {
        false
    }
}
