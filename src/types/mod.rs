//! 类型系统模块：定义网关在所有后端之间共享的规范数据类型。
//!
//! # Types Module
//!
//! Canonical message model shared by every provider adapter. Nothing in here performs
//! I/O; the only behavior is request validation and a few conversions.
//!
//! ## Key Types
//!
//! | Type | Description |
//! |------|-------------|
//! | [`Message`] | Chat message with role and text content |
//! | [`Request`] | One call's immutable parameters |
//! | [`ResponseEvent`] | Canonical event emitted by every backend |
//! | [`ArgValue`] | Closed tagged value for function arguments |
//! | [`FunctionCall`] | Model-declared function invocation |
//! | [`ExecutionResult`] | Outcome of a validated function dispatch |
//!
//! ## Example
//!
//! ```rust
//! use ai_gateway::types::{Message, Request};
//!
//! let request = Request::new(vec![Message::user("help me plan a workout")])
//!     .with_system_prompt("You are a concise fitness coach.")
//!     .with_stream(true);
//! assert!(request.validate().is_ok());
//! ```

pub mod events;
pub mod message;
pub mod request;
pub mod tool;
pub mod value;

pub use events::{EventStream, ResponseEvent, Transcript, Usage};
pub use message::{Message, MessageRole};
pub use request::{validate, Request, ResponseFormat};
pub use tool::{ExecutionResult, FunctionCall, Outcome, ToolDefinition};
pub use value::{ArgMap, ArgValue};
