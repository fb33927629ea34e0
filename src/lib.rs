//! # ai-gateway
//!
//! 面向健身应用的 AI 请求网关：把调用方的请求转换为可靠、与厂商无关的事件流。
//!
//! Provider-agnostic AI request gateway. It turns a caller's request into an ordered
//! stream of canonical [`ResponseEvent`]s while absorbing the unreliability of
//! third-party AI HTTP APIs and of free-form model output.
//!
//! ## Overview
//!
//! ```text
//! caller → Gateway (mode → adapter) → ProviderAdapter → Optimizer → HTTP
//!                                                  ↓
//! caller ← terminal guard ← StreamDecoder ← byte stream
//! ```
//!
//! - **Mode-switchable backends**: demo, scripted, offline and live adapters behind one
//!   [`providers::ProviderAdapter`] trait.
//! - **Streaming decoder**: SSE, NDJSON and whole-document bodies become one event
//!   vocabulary; every call ends with exactly one `Done` or `Error`.
//! - **Request optimizer**: deduplication, batching, backoff with jitter, an offline
//!   gate and deadline racing.
//! - **Function-call bridge**: validates and coerces model-proposed function calls
//!   before domain code sees them.
//!
//! ## Quick Start
//!
//! ```rust
//! use ai_gateway::{Gateway, GatewayConfig, Mode, Request};
//!
//! # tokio_test::block_on(async {
//! let gateway = Gateway::new(GatewayConfig::default())?;
//! gateway.configure(Mode::Demo, None).await?;
//!
//! let transcript = gateway
//!     .send_and_collect(Request::user("help me plan a workout"))
//!     .await;
//! assert!(transcript.is_done());
//! assert!(!transcript.text().is_empty());
//! # Ok::<(), ai_gateway::Error>(())
//! # });
//! ```
//!
//! ## Module Organization
//!
//! | Module | Description |
//! |--------|-------------|
//! | [`types`] | Canonical message model, events and function-call types |
//! | [`gateway`] | Public entry point and mode router |
//! | [`providers`] | Provider adapters and credentials |
//! | [`drivers`] | Wire formats of the live providers |
//! | [`pipeline`] | Streaming decoder and terminal guard |
//! | [`optimizer`] | Dedup, batching, retry and connectivity |
//! | [`bridge`] | Function-call validation and dispatch |
//! | [`transport`] | HTTP seam |
//! | [`tokens`] | Local token estimation |
//! | [`config`] | YAML and environment configuration |

pub mod bridge;
pub mod config;
pub mod drivers;
pub mod gateway;
pub mod optimizer;
pub mod pipeline;
pub mod providers;
pub mod tokens;
pub mod transport;
pub mod types;

pub use bridge::{FunctionBridge, FunctionSignature, ParamSpec, ParamType};
pub use config::{GatewayConfig, ProviderConfig};
pub use gateway::{CancelHandle, Gateway, GatewayBuilder, HealthStatus, Mode, ProviderHealth};
pub use providers::Credentials;
pub use tokens::estimate_token_count;
pub use types::{
    ArgMap, ArgValue, EventStream, ExecutionResult, FunctionCall, Message, MessageRole, Request,
    ResponseEvent, ResponseFormat, Transcript, Usage,
};

use futures::Stream;
use std::pin::Pin;

/// Result type alias for the library
pub type Result<T> = std::result::Result<T, Error>;

/// A specialized Result for stream items
pub type PipeResult<T> = std::result::Result<T, Error>;

/// A pinned, boxed stream that emits `PipeResult<T>`
pub type BoxStream<'a, T> = Pin<Box<dyn Stream<Item = PipeResult<T>> + Send + 'a>>;

/// Error type for the library
pub mod error;
pub use error::{Error, ErrorContext, ErrorKind};
