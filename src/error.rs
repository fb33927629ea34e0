use crate::transport::TransportError;
use crate::types::events::ResponseEvent;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::Duration;
use thiserror::Error;

/// Structured error context for better error handling and debugging.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ErrorContext {
    /// Field path or configuration key that caused the error (e.g., "request.temperature", "providers[0].base_url")
    pub field_path: Option<String>,
    /// Additional context about the error (e.g., expected range, actual value)
    pub details: Option<String>,
    /// Component that raised the error (e.g., "request_validator", "live_adapter")
    pub source: Option<String>,
}

impl ErrorContext {
    pub fn new() -> Self {
        Self {
            field_path: None,
            details: None,
            source: None,
        }
    }

    pub fn with_field_path(mut self, path: impl Into<String>) -> Self {
        self.field_path = Some(path.into());
        self
    }

    pub fn with_details(mut self, details: impl Into<String>) -> Self {
        self.details = Some(details.into());
        self
    }

    pub fn with_source(mut self, source: impl Into<String>) -> Self {
        self.source = Some(source.into());
        self
    }
}

impl Default for ErrorContext {
    fn default() -> Self {
        Self::new()
    }
}

/// Caller-facing error taxonomy carried by [`ResponseEvent::Error`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    /// Bad or missing credentials, or an adapter used before `configure`.
    Configuration,
    /// Offline mode or revoked credentials.
    Unauthorized,
    Timeout,
    RateLimited,
    /// Connection loss or a 5xx response.
    TransientNetwork,
    /// Provider output could not be decoded.
    Malformed,
    /// An identical request is already in flight.
    Duplicate,
    /// Rejected locally; never sent over the wire.
    InvalidRequest,
    /// The connectivity signal reports the device offline.
    Offline,
    Cancelled,
}

impl ErrorKind {
    /// Kinds the optimizer retries with backoff.
    pub fn is_retryable(self) -> bool {
        matches!(
            self,
            ErrorKind::Timeout | ErrorKind::RateLimited | ErrorKind::TransientNetwork
        )
    }

    /// Kinds that justify trying the next provider in priority order.
    pub fn is_fallbackable(self) -> bool {
        self.is_retryable() || matches!(self, ErrorKind::Unauthorized | ErrorKind::Configuration)
    }

    /// Classify an HTTP status code.
    pub fn from_status(status: u16) -> Self {
        match status {
            401 | 403 => ErrorKind::Unauthorized,
            408 => ErrorKind::Timeout,
            429 => ErrorKind::RateLimited,
            500..=599 => ErrorKind::TransientNetwork,
            _ => ErrorKind::InvalidRequest,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            ErrorKind::Configuration => "configuration",
            ErrorKind::Unauthorized => "unauthorized",
            ErrorKind::Timeout => "timeout",
            ErrorKind::RateLimited => "rate_limited",
            ErrorKind::TransientNetwork => "transient_network",
            ErrorKind::Malformed => "malformed",
            ErrorKind::Duplicate => "duplicate",
            ErrorKind::InvalidRequest => "invalid_request",
            ErrorKind::Offline => "offline",
            ErrorKind::Cancelled => "cancelled",
        }
    }
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Unified error type for the gateway.
/// Every variant maps onto exactly one [`ErrorKind`] via [`Error::kind`].
#[derive(Debug, Error)]
pub enum Error {
    #[error("Configuration error: {message}{}", format_context(.context))]
    Configuration {
        message: String,
        context: ErrorContext,
    },

    #[error("Invalid request: {message}{}", format_context(.context))]
    InvalidRequest {
        message: String,
        context: ErrorContext,
    },

    #[error("Unauthorized: {message}")]
    Unauthorized { message: String },

    #[error("Timeout: {message}")]
    Timeout { message: String },

    #[error("Malformed provider output: {message}{}", format_context(.context))]
    Malformed {
        message: String,
        context: ErrorContext,
    },

    #[error("Duplicate request already in flight (key {key})")]
    Duplicate { key: String },

    #[error("Offline: the network is unreachable")]
    Offline,

    #[error("Cancelled by caller")]
    Cancelled,

    #[error("Remote error: HTTP {status} ({kind}): {message}")]
    Remote {
        status: u16,
        kind: ErrorKind,
        message: String,
        retry_after: Option<Duration>,
    },

    #[error("Network transport error: {0}")]
    Transport(#[from] TransportError),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Config file error: {0}")]
    Yaml(#[from] serde_yaml::Error),
}

// Helper function to format error context for display
fn format_context(ctx: &ErrorContext) -> String {
    let mut parts = Vec::new();
    if let Some(ref field) = ctx.field_path {
        parts.push(format!("field: {}", field));
    }
    if let Some(ref details) = ctx.details {
        parts.push(format!("details: {}", details));
    }
    if let Some(ref source) = ctx.source {
        parts.push(format!("source: {}", source));
    }
    if parts.is_empty() {
        String::new()
    } else {
        format!(" ({})", parts.join(", "))
    }
}

impl Error {
    pub fn configuration(msg: impl Into<String>) -> Self {
        Self::configuration_with_context(msg, ErrorContext::new())
    }

    /// Create a new configuration error with structured context
    pub fn configuration_with_context(msg: impl Into<String>, context: ErrorContext) -> Self {
        Error::Configuration {
            message: msg.into(),
            context,
        }
    }

    pub fn invalid_request(msg: impl Into<String>) -> Self {
        Self::invalid_request_with_context(msg, ErrorContext::new())
    }

    /// Create a new validation error with structured context
    pub fn invalid_request_with_context(msg: impl Into<String>, context: ErrorContext) -> Self {
        Error::InvalidRequest {
            message: msg.into(),
            context,
        }
    }

    pub fn malformed(msg: impl Into<String>) -> Self {
        Self::malformed_with_context(msg, ErrorContext::new())
    }

    pub fn malformed_with_context(msg: impl Into<String>, context: ErrorContext) -> Self {
        Error::Malformed {
            message: msg.into(),
            context,
        }
    }

    pub fn unauthorized(msg: impl Into<String>) -> Self {
        Error::Unauthorized {
            message: msg.into(),
        }
    }

    pub fn timeout(msg: impl Into<String>) -> Self {
        Error::Timeout {
            message: msg.into(),
        }
    }

    /// A non-success HTTP response, classified by status.
    pub fn remote(status: u16, message: impl Into<String>, retry_after: Option<Duration>) -> Self {
        Error::Remote {
            status,
            kind: ErrorKind::from_status(status),
            message: message.into(),
            retry_after,
        }
    }

    pub fn transport(msg: impl Into<String>) -> Self {
        Error::Transport(TransportError::Other(msg.into()))
    }

    pub fn kind(&self) -> ErrorKind {
        match self {
            Error::Configuration { .. } | Error::Yaml(_) => ErrorKind::Configuration,
            Error::InvalidRequest { .. } => ErrorKind::InvalidRequest,
            Error::Unauthorized { .. } => ErrorKind::Unauthorized,
            Error::Timeout { .. } => ErrorKind::Timeout,
            Error::Malformed { .. } | Error::Serialization(_) => ErrorKind::Malformed,
            Error::Duplicate { .. } => ErrorKind::Duplicate,
            Error::Offline => ErrorKind::Offline,
            Error::Cancelled => ErrorKind::Cancelled,
            Error::Remote { kind, .. } => *kind,
            Error::Transport(e) => e.kind(),
            Error::Io(_) => ErrorKind::TransientNetwork,
        }
    }

    /// Server-provided wait hint, if any.
    pub fn retry_after(&self) -> Option<Duration> {
        match self {
            Error::Remote { retry_after, .. } => *retry_after,
            _ => None,
        }
    }

    /// Extract error context if available
    pub fn context(&self) -> Option<&ErrorContext> {
        match self {
            Error::Configuration { context, .. }
            | Error::InvalidRequest { context, .. }
            | Error::Malformed { context, .. } => Some(context),
            _ => None,
        }
    }

    /// Convert into the terminal event of a response sequence.
    pub fn into_event(self) -> ResponseEvent {
        ResponseEvent::Error {
            kind: self.kind(),
            message: self.to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_classification() {
        assert_eq!(ErrorKind::from_status(401), ErrorKind::Unauthorized);
        assert_eq!(ErrorKind::from_status(403), ErrorKind::Unauthorized);
        assert_eq!(ErrorKind::from_status(408), ErrorKind::Timeout);
        assert_eq!(ErrorKind::from_status(429), ErrorKind::RateLimited);
        assert_eq!(ErrorKind::from_status(503), ErrorKind::TransientNetwork);
        assert_eq!(ErrorKind::from_status(400), ErrorKind::InvalidRequest);
        assert_eq!(ErrorKind::from_status(422), ErrorKind::InvalidRequest);
    }

    #[test]
    fn retryable_kinds() {
        assert!(ErrorKind::Timeout.is_retryable());
        assert!(ErrorKind::RateLimited.is_retryable());
        assert!(ErrorKind::TransientNetwork.is_retryable());
        assert!(!ErrorKind::Malformed.is_retryable());
        assert!(!ErrorKind::InvalidRequest.is_retryable());
        assert!(!ErrorKind::Offline.is_retryable());
        assert!(ErrorKind::Unauthorized.is_fallbackable());
        assert!(!ErrorKind::Duplicate.is_fallbackable());
    }

    #[test]
    fn context_is_rendered() {
        let err = Error::invalid_request_with_context(
            "temperature out of range",
            ErrorContext::new()
                .with_field_path("request.temperature")
                .with_source("request_validator"),
        );
        let text = err.to_string();
        assert!(text.contains("field: request.temperature"));
        assert!(text.contains("source: request_validator"));
        assert_eq!(err.kind(), ErrorKind::InvalidRequest);
    }

    #[test]
    fn remote_error_carries_retry_hint() {
        let err = Error::remote(429, "slow down", Some(Duration::from_secs(2)));
        assert_eq!(err.kind(), ErrorKind::RateLimited);
        assert_eq!(err.retry_after(), Some(Duration::from_secs(2)));
        match err.into_event() {
            ResponseEvent::Error { kind, message } => {
                assert_eq!(kind, ErrorKind::RateLimited);
                assert!(message.contains("slow down"));
            }
            other => panic!("unexpected event {:?}", other),
        }
    }
}
