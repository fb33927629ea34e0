//! Canonical response events.
//!
//! One call yields a finite, ordered, non-restartable sequence of [`ResponseEvent`]s
//! that ends with exactly one `Done` or `Error`. Nothing follows the terminal event.

use crate::error::ErrorKind;
use crate::types::tool::FunctionCall;
use crate::types::value::ArgMap;
use futures::{Stream, StreamExt};
use serde::{Deserialize, Serialize};
use std::pin::Pin;

/// Token accounting reported by the provider (or estimated by local backends).
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Usage {
    pub prompt_tokens: u64,
    pub completion_tokens: u64,
    pub total_tokens: u64,
}

impl Usage {
    pub fn new(prompt_tokens: u64, completion_tokens: u64) -> Self {
        Self {
            prompt_tokens,
            completion_tokens,
            total_tokens: prompt_tokens + completion_tokens,
        }
    }

    /// Fold in a partial report. Providers such as Anthropic send prompt and
    /// completion counts in separate frames.
    pub fn absorb(&mut self, other: Usage) {
        if other.prompt_tokens > 0 {
            self.prompt_tokens = other.prompt_tokens;
        }
        if other.completion_tokens > 0 {
            self.completion_tokens = other.completion_tokens;
        }
        self.total_tokens = if other.total_tokens > 0 {
            other.total_tokens.max(self.prompt_tokens + self.completion_tokens)
        } else {
            self.prompt_tokens + self.completion_tokens
        };
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "event_type")]
pub enum ResponseEvent {
    /// Full text of the reply.
    #[serde(rename = "TextChunk")]
    TextChunk { text: String },

    /// Incremental fragment of a streamed reply.
    #[serde(rename = "TextDelta")]
    TextDelta { delta: String },

    #[serde(rename = "StructuredPayload")]
    StructuredPayload { payload: ArgMap },

    #[serde(rename = "FunctionCallProposal")]
    FunctionCallProposal { call: FunctionCall },

    #[serde(rename = "Error")]
    Error { kind: ErrorKind, message: String },

    #[serde(rename = "Done")]
    Done {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        usage: Option<Usage>,
    },
}

impl ResponseEvent {
    pub fn error(kind: ErrorKind, message: impl Into<String>) -> Self {
        ResponseEvent::Error {
            kind,
            message: message.into(),
        }
    }

    pub fn done() -> Self {
        ResponseEvent::Done { usage: None }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, ResponseEvent::Done { .. } | ResponseEvent::Error { .. })
    }

    pub fn error_kind(&self) -> Option<ErrorKind> {
        match self {
            ResponseEvent::Error { kind, .. } => Some(*kind),
            _ => None,
        }
    }
}

/// Lazy event sequence returned by every backend.
pub type EventStream = Pin<Box<dyn Stream<Item = ResponseEvent> + Send + 'static>>;

/// Everything a finished call produced, gathered for callers that do not stream.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Transcript {
    pub events: Vec<ResponseEvent>,
}

impl Transcript {
    /// Drain a stream to its terminal event.
    pub async fn collect(mut stream: EventStream) -> Self {
        let mut events = Vec::new();
        while let Some(event) = stream.next().await {
            let terminal = event.is_terminal();
            events.push(event);
            if terminal {
                break;
            }
        }
        Self { events }
    }

    pub fn deltas(&self) -> Vec<&str> {
        self.events
            .iter()
            .filter_map(|e| match e {
                ResponseEvent::TextDelta { delta } => Some(delta.as_str()),
                _ => None,
            })
            .collect()
    }

    /// The final `TextChunk`, or the concatenated deltas when there is none.
    pub fn text(&self) -> String {
        self.events
            .iter()
            .rev()
            .find_map(|e| match e {
                ResponseEvent::TextChunk { text } => Some(text.clone()),
                _ => None,
            })
            .unwrap_or_else(|| self.deltas().concat())
    }

    pub fn payload(&self) -> Option<&ArgMap> {
        self.events.iter().find_map(|e| match e {
            ResponseEvent::StructuredPayload { payload } => Some(payload),
            _ => None,
        })
    }

    pub fn function_calls(&self) -> Vec<&FunctionCall> {
        self.events
            .iter()
            .filter_map(|e| match e {
                ResponseEvent::FunctionCallProposal { call } => Some(call),
                _ => None,
            })
            .collect()
    }

    pub fn terminal(&self) -> Option<&ResponseEvent> {
        self.events.last().filter(|e| e.is_terminal())
    }

    pub fn error(&self) -> Option<(ErrorKind, &str)> {
        match self.terminal() {
            Some(ResponseEvent::Error { kind, message }) => Some((*kind, message.as_str())),
            _ => None,
        }
    }

    pub fn is_done(&self) -> bool {
        matches!(self.terminal(), Some(ResponseEvent::Done { .. }))
    }

    pub fn usage(&self) -> Option<Usage> {
        match self.terminal() {
            Some(ResponseEvent::Done { usage }) => *usage,
            _ => None,
        }
    }

    pub fn terminal_count(&self) -> usize {
        self.events.iter().filter(|e| e.is_terminal()).count()
    }
}
