//! 流式解码模块：把厂商字节流转换为规范事件序列。
//!
//! # Streaming Decoder
//!
//! Turns provider bytes into the canonical [`ResponseEvent`](crate::types::ResponseEvent)
//! sequence without leaking provider framing into the rest of the crate.
//!
//! ```text
//! Raw Bytes → LineBuffer → payload → FragmentJoiner → Driver → Frame → StreamDecoder → Events
//!               │            │            │                                  │
//!            SSE/NDJSON   data: / line  joins split        text, tool calls, usage,
//!            framing                    JSON (bounded)     terminal signal
//! ```
//!
//! | Component | Description |
//! |-----------|-------------|
//! | [`Framing`] | Wire framing of a response body |
//! | [`Frame`] | Provider-neutral unit produced by a driver |
//! | [`StreamDecoder`] | Byte stream to event stream |
//! | [`terminated`] | Deadline, cancellation and single-terminal enforcement |
//! | [`extract_json_object`] | Locates a JSON object in free-form model text |
//!
//! The decoder holds no more state than the bytes that do not yet form a complete line
//! (plus the reply accumulated so far), so it resumes cleanly across arbitrary reads.

pub mod decode;
pub mod framing;
pub mod guard;
pub mod json_extract;
pub mod tool_calls;

#[cfg(test)]
mod tests;

pub use decode::StreamDecoder;
pub use guard::terminated;
pub use json_extract::extract_json_object;
pub use tool_calls::ToolCallAssembler;

use crate::error::ErrorKind;
use crate::types::Usage;

/// How a response body is framed on the wire.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Framing {
    /// Server-Sent Events: `data: {...}` lines.
    Sse,
    /// One JSON object per line.
    Ndjson,
    /// A single JSON document (non-streaming calls).
    Document,
}

/// Provider-neutral unit parsed out of one wire payload.
#[derive(Debug, Clone, PartialEq)]
pub enum Frame {
    TextDelta(String),
    ToolCallStart {
        index: u32,
        id: Option<String>,
        name: String,
    },
    ToolCallArgs {
        index: u32,
        fragment: String,
    },
    /// A tool call delivered whole, arguments already decoded.
    ToolCall {
        id: Option<String>,
        name: String,
        arguments: serde_json::Value,
    },
    Usage(Usage),
    /// Finish reason; the reply is complete even if no explicit terminal follows.
    Finish(String),
    /// Provider terminal signal.
    Done,
    Failure {
        kind: ErrorKind,
        message: String,
    },
}
