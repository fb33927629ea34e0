//! Benchmarks for the streaming decoder
//!
//! This benchmark measures:
//! - SSE decoding with one network read per frame
//! - SSE decoding with frames split across small reads
//! - Tool-call argument assembly

use ai_gateway::drivers::{create_driver, ApiStyle};
use ai_gateway::pipeline::{Framing, StreamDecoder};
use ai_gateway::types::Transcript;
use ai_gateway::BoxStream;
use bytes::Bytes;
use criterion::{black_box, criterion_group, criterion_main, Criterion, Throughput};

/// Sample SSE frames (OpenAI format)
const SSE_FRAMES: &[&str] = &[
    r#"data: {"id":"chatcmpl-123","object":"chat.completion.chunk","model":"gpt-4o-mini","choices":[{"index":0,"delta":{"role":"assistant","content":""},"finish_reason":null}]}"#,
    r#"data: {"id":"chatcmpl-123","object":"chat.completion.chunk","model":"gpt-4o-mini","choices":[{"index":0,"delta":{"content":"Warm up"},"finish_reason":null}]}"#,
    r#"data: {"id":"chatcmpl-123","object":"chat.completion.chunk","model":"gpt-4o-mini","choices":[{"index":0,"delta":{"content":" for five"},"finish_reason":null}]}"#,
    r#"data: {"id":"chatcmpl-123","object":"chat.completion.chunk","model":"gpt-4o-mini","choices":[{"index":0,"delta":{"content":" minutes."},"finish_reason":null}]}"#,
    r#"data: {"id":"chatcmpl-123","object":"chat.completion.chunk","model":"gpt-4o-mini","choices":[{"index":0,"delta":{},"finish_reason":"stop"}]}"#,
    "data: [DONE]",
];

/// Sample SSE frames with a streamed tool call
const SSE_TOOL_CALL_FRAMES: &[&str] = &[
    r#"data: {"choices":[{"index":0,"delta":{"tool_calls":[{"index":0,"id":"call_1","type":"function","function":{"name":"log_food","arguments":""}}]},"finish_reason":null}]}"#,
    r#"data: {"choices":[{"index":0,"delta":{"tool_calls":[{"index":0,"function":{"arguments":"{\"fo"}}]},"finish_reason":null}]}"#,
    r#"data: {"choices":[{"index":0,"delta":{"tool_calls":[{"index":0,"function":{"arguments":"od\": \"oat"}}]},"finish_reason":null}]}"#,
    r#"data: {"choices":[{"index":0,"delta":{"tool_calls":[{"index":0,"function":{"arguments":"meal\", \"grams\": 80}"}}]},"finish_reason":null}]}"#,
    r#"data: {"choices":[{"index":0,"delta":{},"finish_reason":"tool_calls"}]}"#,
    "data: [DONE]",
];

fn body(chunks: Vec<Bytes>) -> BoxStream<'static, Bytes> {
    Box::pin(futures::stream::iter(chunks.into_iter().map(Ok)))
}

fn per_frame(frames: &[&str]) -> Vec<Bytes> {
    frames
        .iter()
        .map(|f| Bytes::from(format!("{f}\n\n")))
        .collect()
}

fn split_every(frames: &[&str], size: usize) -> Vec<Bytes> {
    let joined = frames.join("\n\n") + "\n\n";
    joined
        .as_bytes()
        .chunks(size)
        .map(Bytes::copy_from_slice)
        .collect()
}

fn decoder() -> StreamDecoder {
    StreamDecoder::new(create_driver(ApiStyle::OpenAi, "openai"), Framing::Sse)
}

fn bench_decoder(c: &mut Criterion) {
    let rt = tokio::runtime::Runtime::new().unwrap();
    let mut group = c.benchmark_group("streaming_decoder");
    let total: usize = SSE_FRAMES.iter().map(|f| f.len() + 2).sum();
    group.throughput(Throughput::Bytes(total as u64));

    group.bench_function("sse_one_read_per_frame", |b| {
        b.to_async(&rt).iter(|| async {
            let chunks = per_frame(SSE_FRAMES);
            let events = decoder().decode(body(chunks));
            black_box(Transcript::collect(events).await)
        })
    });

    group.bench_function("sse_split_into_16_byte_reads", |b| {
        b.to_async(&rt).iter(|| async {
            let chunks = split_every(SSE_FRAMES, 16);
            let events = decoder().decode(body(chunks));
            black_box(Transcript::collect(events).await)
        })
    });

    group.bench_function("sse_tool_call_assembly", |b| {
        b.to_async(&rt).iter(|| async {
            let chunks = per_frame(SSE_TOOL_CALL_FRAMES);
            let events = decoder().decode(body(chunks));
            black_box(Transcript::collect(events).await)
        })
    });

    group.finish();
}

criterion_group!(benches, bench_decoder);
criterion_main!(benches);
