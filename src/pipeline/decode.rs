//! Streaming decoder (Bytes -> ResponseEvent)
//!
//! Framing is handled here; payload shapes are delegated to the provider driver,
//! which reduces every payload to [`Frame`]s.

use crate::drivers::ProviderDriver;
use crate::error::ErrorKind;
use crate::pipeline::framing::{payload_of, FragmentJoiner, Joined, LineBuffer};
use crate::pipeline::json_extract::extract_json_object;
use crate::pipeline::tool_calls::ToolCallAssembler;
use crate::pipeline::{Frame, Framing};
use crate::types::{ArgValue, EventStream, ResponseEvent, ResponseFormat, Usage};
use crate::BoxStream;
use bytes::Bytes;
use futures::{stream, StreamExt};
use serde_json::Value;
use std::collections::VecDeque;
use std::sync::Arc;
use tracing::{debug, warn};

pub const DEFAULT_MAX_JOINS: usize = 3;

/// Decodes one response body into the canonical event sequence.
///
/// Streaming bodies yield a `TextDelta` per fragment followed by one `TextChunk`
/// holding their concatenation. Document bodies yield only the `TextChunk`.
#[derive(Clone)]
pub struct StreamDecoder {
    driver: Arc<dyn ProviderDriver>,
    framing: Framing,
    format: ResponseFormat,
    max_joins: usize,
}

impl StreamDecoder {
    pub fn new(driver: Arc<dyn ProviderDriver>, framing: Framing) -> Self {
        Self {
            driver,
            framing,
            format: ResponseFormat::Text,
            max_joins: DEFAULT_MAX_JOINS,
        }
    }

    pub fn with_response_format(mut self, format: ResponseFormat) -> Self {
        self.format = format;
        self
    }

    pub fn with_max_joins(mut self, max_joins: usize) -> Self {
        self.max_joins = max_joins;
        self
    }

    pub fn decode(self, input: BoxStream<'static, Bytes>) -> EventStream {
        let state = DecodeState::new(self, input);
        Box::pin(stream::unfold(state, |mut st| async move {
            let event = st.next_event().await?;
            Some((event, st))
        }))
    }
}

struct DecodeState {
    cfg: StreamDecoder,
    input: Option<BoxStream<'static, Bytes>>,
    lines: LineBuffer,
    joiner: FragmentJoiner,
    document: Vec<u8>,
    text: String,
    tools: ToolCallAssembler,
    usage: Option<Usage>,
    finish_reason: Option<String>,
    queue: VecDeque<ResponseEvent>,
    finished: bool,
}

impl DecodeState {
    fn new(cfg: StreamDecoder, input: BoxStream<'static, Bytes>) -> Self {
        let joiner = FragmentJoiner::new(cfg.max_joins);
        Self {
            cfg,
            input: Some(input),
            lines: LineBuffer::new(),
            joiner,
            document: Vec::new(),
            text: String::new(),
            tools: ToolCallAssembler::new(),
            usage: None,
            finish_reason: None,
            queue: VecDeque::new(),
            finished: false,
        }
    }

    fn streaming(&self) -> bool {
        self.cfg.framing != Framing::Document
    }

    async fn next_event(&mut self) -> Option<ResponseEvent> {
        loop {
            if let Some(event) = self.queue.pop_front() {
                return Some(event);
            }
            if self.finished {
                // Release the body (and anything it holds) as soon as the terminal is out.
                self.input = None;
                return None;
            }
            if self.streaming() {
                if let Some(line) = self.lines.next_line() {
                    self.on_line(&line);
                    continue;
                }
            }
            let next = match self.input.as_mut() {
                Some(input) => input.next().await,
                None => None,
            };
            match next {
                Some(Ok(bytes)) => {
                    if self.streaming() {
                        self.lines.push(&bytes);
                    } else {
                        self.document.extend_from_slice(&bytes);
                    }
                }
                Some(Err(e)) => self.fail(e.kind(), e.to_string()),
                None => {
                    self.input = None;
                    self.on_eof();
                }
            }
        }
    }

    fn on_line(&mut self, line: &str) {
        if self.finished {
            return;
        }
        let Some(payload) = payload_of(self.cfg.framing, line) else {
            return;
        };
        if self.cfg.driver.is_stream_done(payload) {
            if self.joiner.is_pending() {
                let message = format!(
                    "stream finished inside a JSON fragment: {}",
                    self.joiner.pending_preview()
                );
                self.fail(ErrorKind::Malformed, message);
            } else {
                self.complete();
            }
            return;
        }
        match self.joiner.feed(payload) {
            Joined::Complete(value) => {
                let frames = self.cfg.driver.parse_stream_event(&value);
                self.apply_all(frames);
            }
            Joined::Pending => {
                debug!(provider = self.cfg.driver.provider_id(), "holding partial JSON fragment");
            }
            Joined::Malformed(message) => self.fail(ErrorKind::Malformed, message),
        }
    }

    fn on_eof(&mut self) {
        if self.finished {
            return;
        }
        if !self.streaming() {
            let body = std::mem::take(&mut self.document);
            match serde_json::from_slice::<Value>(&body) {
                Ok(value) => match self.cfg.driver.parse_response(&value) {
                    Ok(frames) => self.apply_all(frames),
                    Err(e) => self.fail(e.kind(), e.to_string()),
                },
                Err(e) => self.fail(
                    ErrorKind::Malformed,
                    format!("response body is not a JSON document: {}", e),
                ),
            }
            self.complete();
            return;
        }

        if let Some(rest) = self.lines.take_remainder() {
            self.on_line(&rest);
        }
        if self.finished {
            return;
        }
        if self.joiner.is_pending() {
            let message = format!(
                "stream ended inside a JSON fragment: {}",
                self.joiner.pending_preview()
            );
            self.fail(ErrorKind::Malformed, message);
        } else if self.finish_reason.is_some() {
            self.complete();
        } else {
            self.fail(
                ErrorKind::TransientNetwork,
                "stream closed before the provider signalled completion",
            );
        }
    }

    fn apply_all(&mut self, frames: Vec<Frame>) {
        for frame in frames {
            if self.finished {
                break;
            }
            self.apply(frame);
        }
    }

    fn apply(&mut self, frame: Frame) {
        match frame {
            Frame::TextDelta(delta) => {
                if delta.is_empty() {
                    return;
                }
                self.text.push_str(&delta);
                if self.streaming() {
                    self.queue.push_back(ResponseEvent::TextDelta { delta });
                }
            }
            Frame::ToolCallStart { index, id, name } => self.tools.on_started(index, id, name),
            Frame::ToolCallArgs { index, fragment } => self.tools.on_partial(index, &fragment),
            Frame::ToolCall {
                id,
                name,
                arguments,
            } => self.tools.on_complete(id, name, arguments),
            Frame::Usage(usage) => self.usage.get_or_insert_with(Usage::default).absorb(usage),
            Frame::Finish(reason) => self.finish_reason = Some(reason),
            Frame::Done => self.complete(),
            Frame::Failure { kind, message } => self.fail(kind, message),
        }
    }

    /// Emit the closing events and the `Done` terminal.
    fn complete(&mut self) {
        if self.finished {
            return;
        }
        if !self.text.is_empty() {
            self.queue.push_back(ResponseEvent::TextChunk {
                text: self.text.clone(),
            });
        }

        let tools = std::mem::take(&mut self.tools);
        let has_tools = !tools.is_empty();

        if self.cfg.format == ResponseFormat::Json && (!self.text.is_empty() || !has_tools) {
            let payload = extract_json_object(&self.text)
                .and_then(|obj| ArgValue::map_from_json(&Value::Object(obj)));
            match payload {
                Some(payload) => self
                    .queue
                    .push_back(ResponseEvent::StructuredPayload { payload }),
                None => {
                    self.fail(ErrorKind::Malformed, "reply did not contain a JSON object");
                    return;
                }
            }
        }

        match tools.finalize() {
            Ok(calls) => {
                for call in calls {
                    self.queue
                        .push_back(ResponseEvent::FunctionCallProposal { call });
                }
            }
            Err(message) => {
                self.fail(ErrorKind::Malformed, message);
                return;
            }
        }

        debug!(
            provider = self.cfg.driver.provider_id(),
            finish_reason = self.finish_reason.as_deref().unwrap_or("none"),
            chars = self.text.len(),
            "response decoded"
        );
        self.queue.push_back(ResponseEvent::Done { usage: self.usage });
        self.finished = true;
    }

    fn fail(&mut self, kind: ErrorKind, message: impl Into<String>) {
        if self.finished {
            return;
        }
        let message = message.into();
        warn!(provider = self.cfg.driver.provider_id(), %kind, %message, "decoder terminated with error");
        self.queue.push_back(ResponseEvent::Error { kind, message });
        self.finished = true;
    }
}
