//! Per-call request parameters and local validation.

use crate::error::ErrorContext;
use crate::types::message::{Message, MessageRole};
use crate::types::tool::ToolDefinition;
use crate::{Error, Result};
use serde::{Deserialize, Serialize};
use std::time::Duration;

pub const DEFAULT_TEMPERATURE: f64 = 0.7;
pub const DEFAULT_MAX_TOKENS: u32 = 1024;
pub const MAX_TEMPERATURE: f64 = 2.0;

/// How the final reply should be surfaced.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ResponseFormat {
    #[default]
    Text,
    /// Ask the provider for a JSON object and emit it as a `StructuredPayload`.
    Json,
}

/// One call's parameters. Built once, handed to the gateway by value and
/// shared read-only with the adapter for the lifetime of the call.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Request {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub system_prompt: Option<String>,
    pub messages: Vec<Message>,
    #[serde(default = "default_temperature")]
    pub temperature: f64,
    #[serde(default = "default_max_tokens")]
    pub max_tokens: u32,
    #[serde(default)]
    pub stream: bool,
    /// Identity of the calling subsystem (coaching, nutrition parsing, ...).
    #[serde(default)]
    pub caller: String,
    #[serde(default)]
    pub response_format: ResponseFormat,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub tools: Vec<ToolDefinition>,
    /// Model override; the provider default applies when absent.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub model: Option<String>,
    /// Deadline for the whole call, measured from `send`.
    #[serde(skip)]
    pub timeout: Option<Duration>,
}

fn default_temperature() -> f64 {
    DEFAULT_TEMPERATURE
}

fn default_max_tokens() -> u32 {
    DEFAULT_MAX_TOKENS
}

impl Request {
    pub fn new(messages: Vec<Message>) -> Self {
        Self {
            system_prompt: None,
            messages,
            temperature: DEFAULT_TEMPERATURE,
            max_tokens: DEFAULT_MAX_TOKENS,
            stream: false,
            caller: String::new(),
            response_format: ResponseFormat::Text,
            tools: Vec::new(),
            model: None,
            timeout: None,
        }
    }

    /// Single user turn.
    pub fn user(text: impl Into<String>) -> Self {
        Self::new(vec![Message::user(text)])
    }

    pub fn with_system_prompt(mut self, prompt: impl Into<String>) -> Self {
        self.system_prompt = Some(prompt.into());
        self
    }

    pub fn with_temperature(mut self, temperature: f64) -> Self {
        self.temperature = temperature;
        self
    }

    pub fn with_max_tokens(mut self, max_tokens: u32) -> Self {
        self.max_tokens = max_tokens;
        self
    }

    pub fn with_stream(mut self, stream: bool) -> Self {
        self.stream = stream;
        self
    }

    pub fn with_caller(mut self, caller: impl Into<String>) -> Self {
        self.caller = caller.into();
        self
    }

    pub fn with_response_format(mut self, format: ResponseFormat) -> Self {
        self.response_format = format;
        self
    }

    pub fn with_tools(mut self, tools: Vec<ToolDefinition>) -> Self {
        self.tools = tools;
        self
    }

    pub fn with_model(mut self, model: impl Into<String>) -> Self {
        self.model = Some(model.into());
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    /// Text of the most recent user turn, if any.
    pub fn last_user_text(&self) -> Option<&str> {
        self.messages
            .iter()
            .rev()
            .find(|m| m.role == MessageRole::User)
            .map(|m| m.content.as_str())
    }

    /// System prompt followed by any system turns embedded in the history.
    pub fn system_text(&self) -> Option<String> {
        let parts: Vec<&str> = self
            .system_prompt
            .as_deref()
            .into_iter()
            .chain(
                self.messages
                    .iter()
                    .filter(|m| m.role == MessageRole::System)
                    .map(|m| m.content.as_str()),
            )
            .filter(|s| !s.trim().is_empty())
            .collect();
        if parts.is_empty() {
            None
        } else {
            Some(parts.join("\n\n"))
        }
    }

    pub fn validate(&self) -> Result<()> {
        validate(self)
    }
}

/// Local validation; a request failing here is never sent over the wire.
pub fn validate(request: &Request) -> Result<()> {
    if !request.temperature.is_finite()
        || request.temperature < 0.0
        || request.temperature > MAX_TEMPERATURE
    {
        return Err(Error::invalid_request_with_context(
            "temperature must be within [0, 2]",
            ErrorContext::new()
                .with_field_path("request.temperature")
                .with_details(format!("got {}", request.temperature))
                .with_source("request_validator"),
        ));
    }
    if request.messages.is_empty() {
        return Err(Error::invalid_request_with_context(
            "at least one message is required",
            ErrorContext::new()
                .with_field_path("request.messages")
                .with_source("request_validator"),
        ));
    }
    if request.max_tokens == 0 {
        return Err(Error::invalid_request_with_context(
            "max_tokens must be positive",
            ErrorContext::new()
                .with_field_path("request.max_tokens")
                .with_source("request_validator"),
        ));
    }
    Ok(())
}
