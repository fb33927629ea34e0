//! Shared fixtures for integration tests.

#![allow(dead_code)]

use ai_gateway::transport::{Transport, WireRequest, WireResponse};
use ai_gateway::Result;
use async_trait::async_trait;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;
use std::time::Duration;

type Responder = Box<dyn Fn(usize, &WireRequest) -> Result<WireResponse> + Send + Sync>;

/// In-memory transport. The responder sees the zero-based call index and the request.
pub struct FakeTransport {
    responder: Responder,
    delay: Duration,
    calls: AtomicUsize,
    requests: Mutex<Vec<WireRequest>>,
    batches: Mutex<Vec<usize>>,
}

impl FakeTransport {
    pub fn new(responder: impl Fn(usize, &WireRequest) -> Result<WireResponse> + Send + Sync + 'static) -> Self {
        Self {
            responder: Box::new(responder),
            delay: Duration::ZERO,
            calls: AtomicUsize::new(0),
            requests: Mutex::new(Vec::new()),
            batches: Mutex::new(Vec::new()),
        }
    }

    /// Always answers 200 with `body`.
    pub fn ok(body: &'static str) -> Self {
        Self::new(move |_, _| Ok(WireResponse::from_bytes(200, body)))
    }

    /// Wait this long before every response.
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    pub fn requests(&self) -> Vec<WireRequest> {
        self.requests.lock().unwrap().clone()
    }

    /// Sizes of every `send_batch` call, in order.
    pub fn batch_sizes(&self) -> Vec<usize> {
        self.batches.lock().unwrap().clone()
    }
}

#[async_trait]
impl Transport for FakeTransport {
    async fn send(&self, request: &WireRequest) -> Result<WireResponse> {
        let index = self.calls.fetch_add(1, Ordering::SeqCst);
        self.requests.lock().unwrap().push(request.clone());
        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }
        (self.responder)(index, request)
    }

    async fn send_batch(&self, requests: &[WireRequest]) -> Vec<Result<WireResponse>> {
        self.batches.lock().unwrap().push(requests.len());
        let mut results = Vec::with_capacity(requests.len());
        for request in requests {
            results.push(self.send(request).await);
        }
        results
    }
}

/// SSE body in OpenAI chat-completions shape.
pub fn openai_sse(deltas: &[&str]) -> String {
    let mut body = String::new();
    for delta in deltas {
        let chunk = serde_json::json!({
            "choices": [{"index": 0, "delta": {"content": delta}}]
        });
        body.push_str(&format!("data: {}\n\n", chunk));
    }
    body.push_str("data: {\"choices\":[{\"index\":0,\"delta\":{},\"finish_reason\":\"stop\"}],\"usage\":{\"prompt_tokens\":9,\"completion_tokens\":4,\"total_tokens\":13}}\n\n");
    body.push_str("data: [DONE]\n\n");
    body
}
