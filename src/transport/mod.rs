//! 传输层：将线路请求发送到厂商 HTTP 端点。
//!
//! # Transport Layer
//!
//! The [`Transport`] trait is the only seam through which bytes leave the process.
//! [`HttpTransport`] is the production implementation; tests plug in fakes.

pub mod http;

pub use http::HttpTransport;

use crate::{BoxStream, Error, ErrorKind, Result};
use async_trait::async_trait;
use bytes::Bytes;
use futures::StreamExt;
use std::collections::HashMap;
use std::fmt;
use std::time::Duration;

/// Error bodies larger than this are truncated before being reported.
const ERROR_BODY_LIMIT: usize = 4 * 1024;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Method {
    Get,
    Post,
}

impl Method {
    pub fn as_str(self) -> &'static str {
        match self {
            Method::Get => "GET",
            Method::Post => "POST",
        }
    }
}

/// A fully serialized provider call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WireRequest {
    pub method: Method,
    pub url: String,
    pub headers: Vec<(String, String)>,
    pub body: Option<Bytes>,
    /// Safe to coalesce and replay.
    pub read_only: bool,
    /// Logical endpoint class used to group batchable requests.
    pub batch_class: Option<String>,
}

impl WireRequest {
    pub fn get(url: impl Into<String>) -> Self {
        Self {
            method: Method::Get,
            url: url.into(),
            headers: Vec::new(),
            body: None,
            read_only: true,
            batch_class: None,
        }
    }

    pub fn post_json(url: impl Into<String>, body: &serde_json::Value) -> Result<Self> {
        Ok(Self {
            method: Method::Post,
            url: url.into(),
            headers: vec![("content-type".into(), "application/json".into())],
            body: Some(Bytes::from(serde_json::to_vec(body)?)),
            read_only: false,
            batch_class: None,
        })
    }

    pub fn with_header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.push((name.into(), value.into()));
        self
    }

    pub fn with_batch_class(mut self, class: impl Into<String>) -> Self {
        self.batch_class = Some(class.into());
        self
    }

    /// Only read-only requests that name a class are ever coalesced.
    pub fn is_batchable(&self) -> bool {
        self.read_only && self.batch_class.is_some()
    }
}

/// Response head plus a lazily read body.
pub struct WireResponse {
    pub status: u16,
    /// Header names are lowercase.
    pub headers: HashMap<String, String>,
    pub body: BoxStream<'static, Bytes>,
}

impl fmt::Debug for WireResponse {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("WireResponse")
            .field("status", &self.status)
            .field("headers", &self.headers)
            .finish_non_exhaustive()
    }
}

impl WireResponse {
    /// Buffered response, mostly for fakes and tests.
    pub fn from_bytes(status: u16, body: impl Into<Bytes>) -> Self {
        let body: Bytes = body.into();
        Self {
            status,
            headers: HashMap::new(),
            body: Box::pin(futures::stream::once(async move { Ok(body) })),
        }
    }

    /// Response whose body arrives in the given pieces.
    pub fn from_chunks(status: u16, chunks: Vec<Bytes>) -> Self {
        Self {
            status,
            headers: HashMap::new(),
            body: Box::pin(futures::stream::iter(chunks.into_iter().map(Ok))),
        }
    }

    pub fn with_header(mut self, name: &str, value: impl Into<String>) -> Self {
        self.headers.insert(name.to_ascii_lowercase(), value.into());
        self
    }

    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .get(&name.to_ascii_lowercase())
            .map(String::as_str)
    }

    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }

    /// Read the whole body.
    pub async fn bytes(mut self) -> Result<Bytes> {
        let mut buf = Vec::new();
        while let Some(chunk) = self.body.next().await {
            buf.extend_from_slice(&chunk?);
        }
        Ok(Bytes::from(buf))
    }

    /// At most `limit` leading bytes of the body; the rest is never read.
    async fn prefix(mut self, limit: usize) -> Result<Bytes> {
        let mut buf = Vec::new();
        while buf.len() < limit {
            match self.body.next().await {
                Some(chunk) => {
                    let chunk = chunk?;
                    let take = chunk.len().min(limit - buf.len());
                    buf.extend_from_slice(&chunk[..take]);
                }
                None => break,
            }
        }
        Ok(Bytes::from(buf))
    }

    /// Turn a non-success response into a classified [`Error::Remote`].
    pub async fn into_error(self) -> Error {
        let status = self.status;
        let retry_after = self.header("retry-after").and_then(parse_retry_after);
        let body = match self.prefix(ERROR_BODY_LIMIT).await {
            Ok(b) => b,
            Err(e) => return e,
        };
        let text = String::from_utf8_lossy(&body).to_string();
        Error::remote(status, remote_message(&text), retry_after)
    }
}

/// `Retry-After` in delta-seconds. HTTP-date values are ignored.
pub fn parse_retry_after(value: &str) -> Option<Duration> {
    let secs: f64 = value.trim().parse().ok()?;
    if secs.is_finite() && secs >= 0.0 {
        Some(Duration::from_millis((secs * 1000.0) as u64))
    } else {
        None
    }
}

/// Pull a human message out of a provider error body.
fn remote_message(body: &str) -> String {
    let parsed: Option<serde_json::Value> = serde_json::from_str(body).ok();
    parsed
        .as_ref()
        .and_then(|v| {
            v.pointer("/error/message")
                .or_else(|| v.get("message"))
                .or_else(|| v.get("error"))
                .and_then(|m| m.as_str())
                .map(str::to_string)
        })
        .unwrap_or_else(|| {
            let trimmed = body.trim();
            if trimmed.is_empty() {
                "empty response body".to_string()
            } else {
                trimmed.to_string()
            }
        })
}

#[async_trait]
pub trait Transport: Send + Sync {
    async fn send(&self, request: &WireRequest) -> Result<WireResponse>;

    /// Dispatch a coalesced batch. Results line up with `requests`.
    async fn send_batch(&self, requests: &[WireRequest]) -> Vec<Result<WireResponse>> {
        futures::future::join_all(requests.iter().map(|r| self.send(r))).await
    }
}

#[derive(Debug, thiserror::Error)]
pub enum TransportError {
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Transport error: {0}")]
    Other(String),
}

impl TransportError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            TransportError::Http(e) if e.is_timeout() => ErrorKind::Timeout,
            _ => ErrorKind::TransientNetwork,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn retry_after_seconds() {
        assert_eq!(parse_retry_after("2"), Some(Duration::from_secs(2)));
        assert_eq!(parse_retry_after(" 0.5 "), Some(Duration::from_millis(500)));
        assert_eq!(parse_retry_after("Wed, 21 Oct 2015 07:28:00 GMT"), None);
        assert_eq!(parse_retry_after("-1"), None);
    }

    #[tokio::test]
    async fn error_response_is_classified() {
        let response = WireResponse::from_bytes(
            429,
            r#"{"error":{"message":"Rate limit reached","type":"rate_limit_exceeded"}}"#,
        )
        .with_header("Retry-After", "3");
        let err = response.into_error().await;
        assert_eq!(err.kind(), ErrorKind::RateLimited);
        assert_eq!(err.retry_after(), Some(Duration::from_secs(3)));
        assert!(err.to_string().contains("Rate limit reached"));
    }

    #[tokio::test]
    async fn plain_text_error_body() {
        let err = WireResponse::from_bytes(502, "bad gateway").into_error().await;
        assert_eq!(err.kind(), ErrorKind::TransientNetwork);
        assert!(err.to_string().contains("bad gateway"));
    }

    #[tokio::test]
    async fn error_body_read_stops_at_the_limit() {
        let chunks: Vec<Result<Bytes>> = vec![
            Ok(Bytes::from(vec![b'x'; ERROR_BODY_LIMIT + 100])),
            Err(Error::Transport(TransportError::Other("connection reset".into()))),
        ];
        let response = WireResponse {
            status: 502,
            headers: HashMap::new(),
            body: Box::pin(futures::stream::iter(chunks)),
        };
        let err = response.into_error().await;
        assert_eq!(err.kind(), ErrorKind::TransientNetwork);
        assert!(!err.to_string().contains("connection reset"));
    }

    #[test]
    fn only_read_only_classified_requests_batch() {
        let get = WireRequest::get("http://localhost/models");
        assert!(!get.is_batchable());
        assert!(get.clone().with_batch_class("models").is_batchable());
        let post = WireRequest::post_json("http://localhost/chat", &serde_json::json!({}))
            .unwrap()
            .with_batch_class("chat");
        assert!(!post.is_batchable());
    }
}
