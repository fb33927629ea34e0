//! Provider 适配器：每种后端一个实现，统一产出规范事件序列。
//!
//! # Provider Adapters
//!
//! | Adapter | Backend | Network |
//! |---------|---------|---------|
//! | [`LiveAdapter`] | One configured HTTP provider | yes |
//! | [`FallbackAdapter`] | Several live providers in priority order | yes |
//! | [`ScriptedAdapter`] | Replays prescribed event sequences | no |
//! | [`DemoAdapter`] | Canned coaching replies derived from the request | no |
//! | [`OfflineAdapter`] | Always `Unauthorized` | no |
//!
//! Every adapter's `send` is lazy: nothing happens until the returned stream is
//! polled. An unconfigured adapter yields a single configuration error without I/O.

pub mod credentials;
pub mod demo;
pub mod fallback;
pub mod live;
pub mod offline;
pub mod scripted;

pub use credentials::Credentials;
pub use demo::DemoAdapter;
pub use fallback::FallbackAdapter;
pub use live::LiveAdapter;
pub use offline::OfflineAdapter;
pub use scripted::{ScriptedAdapter, ScriptedKnobs};

use crate::error::ErrorKind;
use crate::pipeline::extract_json_object;
use crate::types::{ArgValue, EventStream, Request, ResponseEvent, ResponseFormat, Usage};
use crate::Result;
use async_trait::async_trait;
use futures::stream;
use serde_json::Value;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

/// Per-call data handed to an adapter.
#[derive(Debug, Clone)]
pub struct CallContext {
    pub request_id: String,
    pub deadline: Instant,
    pub cancel: CancellationToken,
}

impl CallContext {
    pub fn new(request_id: impl Into<String>, timeout: Duration) -> Self {
        Self {
            request_id: request_id.into(),
            deadline: Instant::now() + timeout,
            cancel: CancellationToken::new(),
        }
    }
}

#[async_trait]
pub trait ProviderAdapter: Send + Sync {
    fn name(&self) -> &str;

    /// Idempotent. On failure the adapter reports unconfigured.
    async fn configure(&self, credentials: Option<&Credentials>) -> Result<()>;

    fn is_configured(&self) -> bool;

    /// Lazy event sequence for one request.
    fn send(self: Arc<Self>, request: Arc<Request>, ctx: CallContext) -> EventStream;

    /// Cheap round trip used by health checks.
    async fn probe(&self) -> Result<()>;

    async fn available_models(&self) -> Result<Vec<String>>;
}

/// A sequence holding just one event.
pub(crate) fn single(event: ResponseEvent) -> EventStream {
    Box::pin(stream::iter(vec![event]))
}

pub(crate) fn not_configured(adapter: &str) -> ResponseEvent {
    ResponseEvent::error(
        ErrorKind::Configuration,
        format!("{} adapter is not configured", adapter),
    )
}

/// Events for a locally produced reply.
///
/// Streaming requests get one `TextDelta` per word (whitespace kept, so the deltas
/// concatenate to `text`). JSON requests also get a `StructuredPayload`: the object
/// found in `text`, or `{"message": text}` when there is none.
pub(crate) fn canned_events(
    text: &str,
    stream: bool,
    format: ResponseFormat,
    usage: Option<Usage>,
) -> Vec<ResponseEvent> {
    let mut events = Vec::new();
    if stream {
        events.extend(text.split_inclusive(' ').map(|word| ResponseEvent::TextDelta {
            delta: word.to_string(),
        }));
    }
    events.push(ResponseEvent::TextChunk {
        text: text.to_string(),
    });
    if format == ResponseFormat::Json {
        let payload = extract_json_object(text)
            .and_then(|obj| ArgValue::map_from_json(&Value::Object(obj)))
            .unwrap_or_else(|| {
                let mut map = crate::types::ArgMap::new();
                map.insert("message".into(), ArgValue::from(text));
                map
            });
        events.push(ResponseEvent::StructuredPayload { payload });
    }
    events.push(ResponseEvent::Done { usage });
    events
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn streaming_canned_reply_splits_on_words() {
        let events = canned_events("keep it up", true, ResponseFormat::Text, None);
        assert_eq!(events.len(), 5);
        let deltas: String = events
            .iter()
            .filter_map(|e| match e {
                ResponseEvent::TextDelta { delta } => Some(delta.as_str()),
                _ => None,
            })
            .collect();
        assert_eq!(deltas, "keep it up");
        assert!(events.last().unwrap().is_terminal());
    }

    #[test]
    fn json_canned_reply_always_has_payload() {
        let events = canned_events("plain words", false, ResponseFormat::Json, None);
        assert!(matches!(
            &events[1],
            ResponseEvent::StructuredPayload { payload } if payload["message"] == ArgValue::from("plain words")
        ));

        let events = canned_events(r#"{"sets": 3}"#, false, ResponseFormat::Json, None);
        assert!(matches!(
            &events[1],
            ResponseEvent::StructuredPayload { payload } if payload["sets"].as_i64() == Some(3)
        ));
    }
}
