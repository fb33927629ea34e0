use super::*;
use crate::drivers::{AnthropicDriver, OllamaDriver, OpenAiDriver, ProviderDriver};
use crate::error::{Error, ErrorKind};
use crate::types::{ArgValue, EventStream, ResponseEvent, ResponseFormat, Transcript};
use crate::BoxStream;
use bytes::Bytes;
use futures::stream;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

fn body(chunks: &[&str]) -> BoxStream<'static, Bytes> {
    let owned: Vec<crate::Result<Bytes>> = chunks
        .iter()
        .map(|c| Ok(Bytes::from(c.to_string())))
        .collect();
    Box::pin(stream::iter(owned))
}

fn openai() -> Arc<dyn ProviderDriver> {
    Arc::new(OpenAiDriver::new("openai"))
}

async fn decode(driver: Arc<dyn ProviderDriver>, framing: Framing, chunks: &[&str]) -> Transcript {
    let events = StreamDecoder::new(driver, framing).decode(body(chunks));
    Transcript::collect(events).await
}

fn sse_delta(text: &str) -> String {
    format!(
        "data: {}\n\n",
        serde_json::json!({"choices": [{"delta": {"content": text}, "index": 0}]})
    )
}

#[tokio::test]
async fn sse_deltas_concatenate_into_text_chunk() {
    let a = sse_delta("Great ");
    let b = sse_delta("workout!");
    let finish = r#"data: {"choices":[{"delta":{},"finish_reason":"stop"}]}"#.to_string() + "\n\n";
    // Split the first event mid-line to exercise resumption across reads.
    let (a1, a2) = a.split_at(12);
    let chunks = [a1, a2, b.as_str(), finish.as_str(), "data: [DONE]\n\n"];
    let transcript = decode(openai(), Framing::Sse, &chunks).await;

    assert_eq!(transcript.deltas(), vec!["Great ", "workout!"]);
    assert_eq!(transcript.text(), "Great workout!");
    assert!(transcript.is_done());
    assert_eq!(transcript.terminal_count(), 1);
}

#[tokio::test]
async fn split_json_payload_is_joined() {
    let chunks = [
        "data: {\"choices\":[{\"delta\":{\"content\":\"Hel\n",
        "data: lo\"}}]}\n",
        "data: [DONE]\n",
    ];
    let transcript = decode(openai(), Framing::Sse, &chunks).await;
    assert_eq!(transcript.text(), "Hello");
    assert!(transcript.is_done());
}

#[tokio::test]
async fn fragment_join_is_bounded() {
    let chunks = [
        "data: {\"choices\":[\n",
        "data: {\"delta\":\n",
        "data: {\"content\":\n",
        "data: \"x\"\n",
        "data: [DONE]\n",
    ];
    let events = StreamDecoder::new(openai(), Framing::Sse)
        .with_max_joins(2)
        .decode(body(&chunks));
    let transcript = Transcript::collect(events).await;
    assert_eq!(transcript.error().map(|(k, _)| k), Some(ErrorKind::Malformed));
    assert_eq!(transcript.terminal_count(), 1);
}

#[tokio::test]
async fn syntax_error_is_malformed() {
    let transcript = decode(openai(), Framing::Sse, &["data: {not json}\n\n"]).await;
    assert_eq!(transcript.error().map(|(k, _)| k), Some(ErrorKind::Malformed));
}

#[tokio::test]
async fn eof_without_terminal_is_transient() {
    let first = sse_delta("partial");
    let transcript = decode(openai(), Framing::Sse, &[first.as_str()]).await;
    assert_eq!(transcript.deltas(), vec!["partial"]);
    assert_eq!(
        transcript.error().map(|(k, _)| k),
        Some(ErrorKind::TransientNetwork)
    );
}

#[tokio::test]
async fn finish_reason_without_done_sentinel_completes() {
    let chunks = [
        sse_delta("ok"),
        r#"data: {"choices":[{"delta":{},"finish_reason":"stop"}],"usage":{"prompt_tokens":3,"completion_tokens":1,"total_tokens":4}}"#.to_string(),
    ];
    let refs: Vec<&str> = chunks.iter().map(String::as_str).collect();
    let transcript = decode(openai(), Framing::Sse, &refs).await;
    assert!(transcript.is_done());
    assert_eq!(transcript.usage().map(|u| u.total_tokens), Some(4));
}

#[tokio::test]
async fn body_read_error_terminates_with_its_kind() {
    let items: Vec<crate::Result<Bytes>> = vec![
        Ok(Bytes::from(sse_delta("a"))),
        Err(Error::timeout("read timed out")),
    ];
    let events = StreamDecoder::new(openai(), Framing::Sse).decode(Box::pin(stream::iter(items)));
    let transcript = Transcript::collect(events).await;
    assert_eq!(transcript.error().map(|(k, _)| k), Some(ErrorKind::Timeout));
}

#[tokio::test]
async fn document_body_yields_single_chunk() {
    let doc = r#"{"choices":[{"message":{"role":"assistant","content":"Drink water."},"finish_reason":"stop"}]}"#;
    let (left, right) = doc.split_at(20);
    let transcript = decode(openai(), Framing::Document, &[left, right]).await;
    assert!(transcript.deltas().is_empty());
    assert_eq!(
        transcript.events[0],
        ResponseEvent::TextChunk {
            text: "Drink water.".into()
        }
    );
    assert!(transcript.is_done());
}

#[tokio::test]
async fn document_that_is_not_json_is_malformed() {
    let transcript = decode(openai(), Framing::Document, &["<html>bad gateway</html>"]).await;
    assert_eq!(transcript.error().map(|(k, _)| k), Some(ErrorKind::Malformed));
}

#[tokio::test]
async fn json_format_emits_structured_payload() {
    let doc = r#"{"choices":[{"message":{"content":"Here:\n```json\n{\"calories\": 420, \"meal\": \"lunch\"}\n```"},"finish_reason":"stop"}]}"#;
    let events = StreamDecoder::new(openai(), Framing::Document)
        .with_response_format(ResponseFormat::Json)
        .decode(body(&[doc]));
    let transcript = Transcript::collect(events).await;
    let payload = transcript.payload().expect("payload");
    assert_eq!(payload.get("calories").and_then(ArgValue::as_i64), Some(420));
    assert_eq!(payload.get("meal").and_then(ArgValue::as_str), Some("lunch"));
    assert!(transcript.is_done());
}

#[tokio::test]
async fn json_format_without_object_is_malformed() {
    let doc = r#"{"choices":[{"message":{"content":"no structure"},"finish_reason":"stop"}]}"#;
    let events = StreamDecoder::new(openai(), Framing::Document)
        .with_response_format(ResponseFormat::Json)
        .decode(body(&[doc]));
    let transcript = Transcript::collect(events).await;
    assert_eq!(transcript.error().map(|(k, _)| k), Some(ErrorKind::Malformed));
    // The text itself is still delivered before the failure.
    assert_eq!(transcript.text(), "no structure");
}

#[tokio::test]
async fn streamed_tool_call_becomes_proposal() {
    let chunks = [
        "data: {\"choices\":[{\"delta\":{\"tool_calls\":[{\"index\":0,\"id\":\"call_1\",\"function\":{\"name\":\"log_water\",\"arguments\":\"\"}}]}}]}\n\n",
        "data: {\"choices\":[{\"delta\":{\"tool_calls\":[{\"index\":0,\"function\":{\"arguments\":\"{\\\"ml\\\":\"}}]}}]}\n\n",
        "data: {\"choices\":[{\"delta\":{\"tool_calls\":[{\"index\":0,\"function\":{\"arguments\":\"250}\"}}]}}]}\n\n",
        "data: {\"choices\":[{\"delta\":{},\"finish_reason\":\"tool_calls\"}]}\n\n",
        "data: [DONE]\n\n",
    ];
    let transcript = decode(openai(), Framing::Sse, &chunks).await;
    let calls = transcript.function_calls();
    assert_eq!(calls.len(), 1);
    assert_eq!(calls[0].name, "log_water");
    assert_eq!(calls[0].id.as_deref(), Some("call_1"));
    assert_eq!(calls[0].arguments.get("ml").and_then(ArgValue::as_i64), Some(250));
    assert!(transcript.is_done());
}

#[tokio::test]
async fn anthropic_event_stream() {
    let chunks = [
        "event: message_start\ndata: {\"type\":\"message_start\",\"message\":{\"usage\":{\"input_tokens\":9}}}\n\n",
        "event: content_block_delta\ndata: {\"type\":\"content_block_delta\",\"index\":0,\"delta\":{\"type\":\"text_delta\",\"text\":\"Rest \"}}\n\n",
        "event: content_block_delta\ndata: {\"type\":\"content_block_delta\",\"index\":0,\"delta\":{\"type\":\"text_delta\",\"text\":\"today.\"}}\n\n",
        "event: message_delta\ndata: {\"type\":\"message_delta\",\"delta\":{\"stop_reason\":\"end_turn\"},\"usage\":{\"output_tokens\":4}}\n\n",
        "event: message_stop\ndata: {\"type\":\"message_stop\"}\n\n",
    ];
    let transcript = decode(Arc::new(AnthropicDriver::new("anthropic")), Framing::Sse, &chunks).await;
    assert_eq!(transcript.text(), "Rest today.");
    let usage = transcript.usage().expect("usage");
    assert_eq!((usage.prompt_tokens, usage.completion_tokens), (9, 4));
}

#[tokio::test]
async fn ndjson_stream_from_ollama() {
    let chunks = [
        "{\"message\":{\"content\":\"Stretch\"},\"done\":false}\n",
        "{\"message\":{\"content\":\" first.\"},\"done\":false}\n{\"message\":{\"content\":\"\"},",
        "\"done\":true,\"done_reason\":\"stop\",\"eval_count\":2}",
    ];
    let transcript = decode(Arc::new(OllamaDriver::new("local")), Framing::Ndjson, &chunks).await;
    assert_eq!(transcript.deltas(), vec!["Stretch", " first."]);
    assert!(transcript.is_done());
}

#[tokio::test]
async fn provider_error_mid_stream_is_terminal() {
    let chunks = [
        sse_delta("Hi"),
        "data: {\"error\":{\"message\":\"rate limit reached\",\"type\":\"rate_limit_exceeded\"}}\n\n".to_string(),
        sse_delta("ignored"),
    ];
    let refs: Vec<&str> = chunks.iter().map(String::as_str).collect();
    let transcript = decode(openai(), Framing::Sse, &refs).await;
    assert_eq!(transcript.deltas(), vec!["Hi"]);
    assert_eq!(transcript.error(), Some((ErrorKind::RateLimited, "rate limit reached")));
}

fn pending_stream() -> EventStream {
    Box::pin(stream::pending())
}

#[tokio::test(start_paused = true)]
async fn guard_times_out_silent_stream() {
    let deadline = Instant::now() + Duration::from_secs(5);
    let guarded = terminated(pending_stream(), deadline, CancellationToken::new(), ());
    let transcript = Transcript::collect(guarded).await;
    assert_eq!(transcript.error().map(|(k, _)| k), Some(ErrorKind::Timeout));
}

#[tokio::test]
async fn guard_reports_cancellation() {
    let cancel = CancellationToken::new();
    let guarded = terminated(
        pending_stream(),
        Instant::now() + Duration::from_secs(60),
        cancel.clone(),
        (),
    );
    cancel.cancel();
    let transcript = Transcript::collect(guarded).await;
    assert_eq!(transcript.error().map(|(k, _)| k), Some(ErrorKind::Cancelled));
}

#[tokio::test]
async fn guard_supplies_missing_terminal_and_drops_trailing_events() {
    use futures::StreamExt;

    let deadline = Instant::now() + Duration::from_secs(60);
    let open: EventStream = Box::pin(stream::iter(vec![ResponseEvent::TextDelta {
        delta: "a".into(),
    }]));
    let events: Vec<_> = terminated(open, deadline, CancellationToken::new(), ())
        .collect()
        .await;
    assert_eq!(events.len(), 2);
    assert_eq!(events[1].error_kind(), Some(ErrorKind::Malformed));

    let chatty: EventStream = Box::pin(stream::iter(vec![
        ResponseEvent::done(),
        ResponseEvent::TextDelta { delta: "late".into() },
    ]));
    let events: Vec<_> = terminated(chatty, deadline, CancellationToken::new(), ())
        .collect()
        .await;
    assert_eq!(events, vec![ResponseEvent::done()]);
}

#[tokio::test]
async fn guard_releases_hold_after_terminal() {
    use futures::StreamExt;
    use std::sync::atomic::{AtomicBool, Ordering};

    struct Flag(Arc<AtomicBool>);
    impl Drop for Flag {
        fn drop(&mut self) {
            self.0.store(true, Ordering::SeqCst);
        }
    }

    let released = Arc::new(AtomicBool::new(false));
    let inner: EventStream = Box::pin(stream::iter(vec![ResponseEvent::done()]));
    let mut guarded = terminated(
        inner,
        Instant::now() + Duration::from_secs(60),
        CancellationToken::new(),
        Flag(released.clone()),
    );
    assert!(guarded.next().await.is_some());
    assert!(released.load(Ordering::SeqCst));
}
