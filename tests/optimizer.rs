//! Request optimizer behavior over a fake transport.

mod common;

use ai_gateway::optimizer::{Connectivity, Optimizer, OptimizerConfig};
use ai_gateway::transport::{WireRequest, WireResponse};
use ai_gateway::{Error, ErrorKind};
use common::FakeTransport;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

fn config() -> OptimizerConfig {
    OptimizerConfig {
        max_attempts: 3,
        base_delay_ms: 100,
        max_delay_ms: 10_000,
        jitter: 0.0,
        attempt_timeout_ms: 5_000,
        default_deadline_ms: 60_000,
        batch_window_ms: 50,
        max_batch_size: 8,
    }
}

fn optimizer(transport: &Arc<FakeTransport>, config: OptimizerConfig) -> Optimizer {
    Optimizer::new(config, transport.clone(), Connectivity::new(true))
}

fn chat(prompt: &str) -> WireRequest {
    WireRequest::post_json(
        "https://api.example.com/v1/chat/completions",
        &serde_json::json!({ "messages": [{ "role": "user", "content": prompt }] }),
    )
    .unwrap()
}

fn listing(page: u32) -> WireRequest {
    WireRequest::get(format!("https://api.example.com/v1/models?page={page}")).with_batch_class("models")
}

#[tokio::test(start_paused = true)]
async fn retry_after_is_honoured() {
    let transport = Arc::new(FakeTransport::new(|call, _| match call {
        0 => Ok(WireResponse::from_bytes(429, r#"{"error":{"message":"slow down"}}"#)
            .with_header("Retry-After", "2")),
        _ => Ok(WireResponse::from_bytes(200, "{}")),
    }));
    let opt = optimizer(&transport, config());

    let started = Instant::now();
    let response = opt.execute(chat("hi"), None, &CancellationToken::new()).await.unwrap();
    assert_eq!(response.status, 200);
    assert_eq!(transport.calls(), 2);
    assert!(started.elapsed() >= Duration::from_secs(2));
    assert!(started.elapsed() < Duration::from_secs(3));
}

#[tokio::test(start_paused = true)]
async fn retries_stop_at_max_attempts() {
    let transport = Arc::new(FakeTransport::new(|_, _| {
        Ok(WireResponse::from_bytes(503, "upstream unavailable"))
    }));
    let opt = optimizer(&transport, config());

    let err = opt.execute(chat("hi"), None, &CancellationToken::new()).await.unwrap_err();
    assert_eq!(err.kind(), ErrorKind::TransientNetwork);
    assert_eq!(transport.calls(), 3);
    assert_eq!(opt.snapshot().retrying, 0);
}

#[tokio::test]
async fn non_retryable_status_fails_at_once() {
    let transport = Arc::new(FakeTransport::new(|_, _| {
        Ok(WireResponse::from_bytes(400, r#"{"error":{"message":"bad model"}}"#))
    }));
    let opt = optimizer(&transport, config());

    let err = opt.execute(chat("hi"), None, &CancellationToken::new()).await.unwrap_err();
    assert_eq!(err.kind(), ErrorKind::InvalidRequest);
    assert!(err.to_string().contains("bad model"));
    assert_eq!(transport.calls(), 1);
}

#[tokio::test]
async fn duplicate_is_released_after_body_is_consumed() {
    let transport = Arc::new(FakeTransport::ok("{}"));
    let opt = optimizer(&transport, config());
    let cancel = CancellationToken::new();

    let first = opt.execute(chat("same"), None, &cancel).await.unwrap();
    assert_eq!(opt.snapshot().in_flight, 1);

    let err = opt.execute(chat("same"), None, &cancel).await.unwrap_err();
    assert!(matches!(err, Error::Duplicate { .. }));
    assert_eq!(transport.calls(), 1);

    // A different body is a different request.
    let other = opt.execute(chat("different"), None, &cancel).await.unwrap();
    drop(other);

    first.bytes().await.unwrap();
    assert_eq!(opt.snapshot().in_flight, 0);
    opt.execute(chat("same"), None, &cancel).await.unwrap();
    assert_eq!(transport.calls(), 3);
}

#[tokio::test(start_paused = true)]
async fn batch_window_coalesces_requests() {
    let transport = Arc::new(FakeTransport::ok(r#"{"data":[]}"#));
    let opt = optimizer(&transport, config());
    let cancel = CancellationToken::new();

    let (a, b, c) = tokio::join!(
        opt.execute(listing(1), None, &cancel),
        opt.execute(listing(2), None, &cancel),
        opt.execute(listing(3), None, &cancel),
    );
    assert!(a.is_ok() && b.is_ok() && c.is_ok());
    assert_eq!(transport.batch_sizes(), vec![3]);
    assert_eq!(opt.snapshot().pending_batched, 0);
}

#[tokio::test(start_paused = true)]
async fn full_batch_flushes_before_the_window() {
    let transport = Arc::new(FakeTransport::ok(r#"{"data":[]}"#));
    let opt = optimizer(
        &transport,
        OptimizerConfig {
            batch_window_ms: 10_000,
            max_batch_size: 2,
            ..config()
        },
    );
    let cancel = CancellationToken::new();

    let started = Instant::now();
    let (a, b) = tokio::join!(
        opt.execute(listing(1), None, &cancel),
        opt.execute(listing(2), None, &cancel),
    );
    assert!(a.is_ok() && b.is_ok());
    assert_eq!(transport.batch_sizes(), vec![2]);
    assert!(started.elapsed() < Duration::from_secs(10));
}

#[tokio::test(start_paused = true)]
async fn cancellation_removes_pending_batch_entry() {
    let transport = Arc::new(FakeTransport::ok(r#"{"data":[]}"#));
    let opt = optimizer(
        &transport,
        OptimizerConfig {
            batch_window_ms: 1_000,
            ..config()
        },
    );
    let cancel = CancellationToken::new();

    let task = {
        let opt = opt.clone();
        let cancel = cancel.clone();
        tokio::spawn(async move { opt.execute(listing(1), None, &cancel).await })
    };
    while opt.snapshot().pending_batched == 0 {
        tokio::time::sleep(Duration::from_millis(10)).await;
    }

    cancel.cancel();
    let err = task.await.unwrap().unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Cancelled);
    assert_eq!(opt.snapshot().pending_batched, 0);
    assert_eq!(opt.snapshot().in_flight, 0);

    tokio::time::sleep(Duration::from_secs(2)).await;
    assert_eq!(transport.calls(), 0);
}

#[tokio::test]
async fn offline_gate_blocks_the_network() {
    let transport = Arc::new(FakeTransport::ok("{}"));
    let connectivity = Connectivity::new(false);
    let opt = Optimizer::new(config(), transport.clone(), connectivity.clone());

    let err = opt.execute(chat("hi"), None, &CancellationToken::new()).await.unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Offline);
    assert_eq!(transport.calls(), 0);

    connectivity.set_online(true);
    assert!(opt.execute(chat("hi"), None, &CancellationToken::new()).await.is_ok());
}

#[tokio::test(start_paused = true)]
async fn deadline_beats_a_slow_provider() {
    let transport = Arc::new(FakeTransport::ok("{}").with_delay(Duration::from_secs(30)));
    let opt = optimizer(&transport, config());

    let deadline = Instant::now() + Duration::from_millis(200);
    let err = opt
        .execute(chat("hi"), Some(deadline), &CancellationToken::new())
        .await
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Timeout);
    assert_eq!(opt.snapshot().in_flight, 0);
}

#[tokio::test(start_paused = true)]
async fn cancellation_aborts_backoff_sleep() {
    let transport = Arc::new(FakeTransport::new(|_, _| {
        Ok(WireResponse::from_bytes(503, "upstream unavailable"))
    }));
    let opt = optimizer(
        &transport,
        OptimizerConfig {
            base_delay_ms: 5_000,
            ..config()
        },
    );
    let cancel = CancellationToken::new();

    let task = {
        let opt = opt.clone();
        let cancel = cancel.clone();
        tokio::spawn(async move { opt.execute(chat("hi"), None, &cancel).await })
    };
    tokio::time::sleep(Duration::from_millis(100)).await;
    assert_eq!(transport.calls(), 1);

    cancel.cancel();
    let err = task.await.unwrap().unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Cancelled);

    tokio::time::sleep(Duration::from_secs(20)).await;
    assert_eq!(transport.calls(), 1);
    let snapshot = opt.snapshot();
    assert_eq!(snapshot.retrying, 0);
    assert_eq!(snapshot.in_flight, 0);
}
