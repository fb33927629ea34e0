//! 请求优化器：去重、批处理、带退避的重试、连通性门控与超时竞速。
//!
//! # Request Optimizer
//!
//! Every provider call leaves the process through [`Optimizer::execute`]:
//!
//! 1. **Connectivity gate** - offline fails at once with [`Error::Offline`].
//! 2. **Deduplication** - an identical request already in flight fails fast with
//!    [`Error::Duplicate`]. The key stays claimed until the response body has been
//!    consumed or dropped.
//! 3. **Batching** - read-only requests carrying a batch class are coalesced per class.
//! 4. **Retry** - retryable failures back off exponentially with jitter, honouring
//!    `Retry-After`.
//! 5. **Timeout racing** - each attempt has its own timeout and the whole call races
//!    the caller deadline and cancellation.
//!
//! All cross-call state lives in one [`Mutex`] that is never held across an `.await`.

pub mod batch;
pub mod connectivity;
pub mod key;
pub mod retry;

pub use connectivity::Connectivity;
pub use key::RequestKey;
pub use retry::Backoff;

use crate::transport::{Transport, WireRequest, WireResponse};
use crate::{Error, Result};
use futures::{stream, StreamExt};
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct OptimizerConfig {
    /// Total attempts, including the first.
    pub max_attempts: u32,
    pub base_delay_ms: u64,
    pub max_delay_ms: u64,
    pub jitter: f64,
    pub attempt_timeout_ms: u64,
    /// Deadline applied when the caller supplies none.
    pub default_deadline_ms: u64,
    pub batch_window_ms: u64,
    pub max_batch_size: usize,
}

impl Default for OptimizerConfig {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            base_delay_ms: 500,
            max_delay_ms: 30_000,
            jitter: 0.2,
            attempt_timeout_ms: 60_000,
            default_deadline_ms: 120_000,
            batch_window_ms: 100,
            max_batch_size: 8,
        }
    }
}

impl OptimizerConfig {
    pub fn backoff(&self) -> Backoff {
        Backoff::new(
            Duration::from_millis(self.base_delay_ms),
            Duration::from_millis(self.max_delay_ms),
            self.jitter,
        )
    }

    pub fn attempt_timeout(&self) -> Duration {
        Duration::from_millis(self.attempt_timeout_ms)
    }

    pub fn default_deadline(&self) -> Duration {
        Duration::from_millis(self.default_deadline_ms)
    }

    pub fn batch_window(&self) -> Duration {
        Duration::from_millis(self.batch_window_ms)
    }
}

/// Point-in-time view of the optimizer's shared state.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct OptimizerSnapshot {
    pub in_flight: usize,
    pub pending_batched: usize,
    pub retrying: usize,
    pub online: bool,
}

#[derive(Default)]
pub(crate) struct State {
    in_flight: HashSet<RequestKey>,
    retrying: HashMap<RequestKey, u32>,
    batches: HashMap<String, batch::PendingBatch>,
    counter: u64,
}

pub(crate) struct Inner {
    config: OptimizerConfig,
    backoff: Backoff,
    transport: Arc<dyn Transport>,
    connectivity: Connectivity,
    state: Mutex<State>,
}

impl Inner {
    fn lock(&self) -> MutexGuard<'_, State> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// Releases an in-flight key on drop.
struct InflightGuard {
    inner: Arc<Inner>,
    key: RequestKey,
}

impl InflightGuard {
    fn claim(inner: &Arc<Inner>, key: RequestKey) -> Result<Self> {
        if !inner.lock().in_flight.insert(key) {
            debug!(key = %key, "duplicate request rejected");
            return Err(Error::Duplicate {
                key: key.to_string(),
            });
        }
        Ok(Self {
            inner: inner.clone(),
            key,
        })
    }

    /// Keep the key claimed until the body is exhausted or dropped.
    fn attach(self, mut response: WireResponse) -> WireResponse {
        let body = std::mem::replace(&mut response.body, Box::pin(stream::empty()));
        response.body = Box::pin(stream::unfold((body, self), |(mut body, guard)| async move {
            let item = body.next().await?;
            Some((item, (body, guard)))
        }));
        response
    }
}

impl Drop for InflightGuard {
    fn drop(&mut self) {
        self.inner.lock().in_flight.remove(&self.key);
    }
}

/// Marks a key as waiting out a backoff.
struct RetryMark {
    inner: Arc<Inner>,
    key: RequestKey,
}

impl RetryMark {
    fn enter(inner: &Arc<Inner>, key: RequestKey, attempt: u32) -> Self {
        inner.lock().retrying.insert(key, attempt);
        Self {
            inner: inner.clone(),
            key,
        }
    }
}

impl Drop for RetryMark {
    fn drop(&mut self) {
        self.inner.lock().retrying.remove(&self.key);
    }
}

#[derive(Clone)]
pub struct Optimizer {
    inner: Arc<Inner>,
}

impl std::fmt::Debug for Optimizer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Optimizer")
            .field("config", &self.inner.config)
            .field("snapshot", &self.snapshot())
            .finish()
    }
}

impl Optimizer {
    pub fn new(
        config: OptimizerConfig,
        transport: Arc<dyn Transport>,
        connectivity: Connectivity,
    ) -> Self {
        Self {
            inner: Arc::new(Inner {
                backoff: config.backoff(),
                config,
                transport,
                connectivity,
                state: Mutex::new(State::default()),
            }),
        }
    }

    pub fn config(&self) -> &OptimizerConfig {
        &self.inner.config
    }

    pub fn connectivity(&self) -> &Connectivity {
        &self.inner.connectivity
    }

    pub fn snapshot(&self) -> OptimizerSnapshot {
        let state = self.inner.lock();
        OptimizerSnapshot {
            in_flight: state.in_flight.len(),
            pending_batched: state.batches.values().map(|b| b.len()).sum(),
            retrying: state.retrying.len(),
            online: self.inner.connectivity.is_online(),
        }
    }

    /// Send `request`, returning a successful response whose body is still streaming.
    ///
    /// Non-2xx responses are classified into errors; retryable ones are retried up to
    /// `max_attempts`. The overall `deadline` (or the configured default) and `cancel`
    /// win over any pending network call or backoff sleep.
    pub async fn execute(
        &self,
        request: WireRequest,
        deadline: Option<Instant>,
        cancel: &CancellationToken,
    ) -> Result<WireResponse> {
        if !self.inner.connectivity.is_online() {
            return Err(Error::Offline);
        }
        let key = RequestKey::of(&request);
        let guard = InflightGuard::claim(&self.inner, key)?;
        let deadline =
            deadline.unwrap_or_else(|| Instant::now() + self.inner.config.default_deadline());

        let response = tokio::select! {
            biased;
            _ = cancel.cancelled() => Err(Error::Cancelled),
            _ = tokio::time::sleep_until(deadline) => {
                Err(Error::timeout("deadline exceeded while waiting for the provider"))
            }
            result = self.attempt_loop(&request, key) => result,
        }?;
        Ok(guard.attach(response))
    }

    async fn attempt_loop(&self, request: &WireRequest, key: RequestKey) -> Result<WireResponse> {
        let config = &self.inner.config;
        let mut attempt = 0u32;
        loop {
            attempt += 1;
            if !self.inner.connectivity.is_online() {
                return Err(Error::Offline);
            }

            let outcome =
                match tokio::time::timeout(config.attempt_timeout(), self.dispatch(request)).await {
                    Ok(result) => result,
                    Err(_) => Err(Error::timeout(format!(
                        "attempt {} timed out after {:?}",
                        attempt,
                        config.attempt_timeout()
                    ))),
                };
            let error = match outcome {
                Ok(response) if response.is_success() => return Ok(response),
                Ok(response) => response.into_error().await,
                Err(e) => e,
            };

            if !error.kind().is_retryable() || attempt >= config.max_attempts {
                return Err(error);
            }
            let delay = self.inner.backoff.delay_for(attempt, error.retry_after());
            warn!(
                key = %key,
                attempt,
                max_attempts = config.max_attempts,
                kind = %error.kind(),
                delay_ms = delay.as_millis() as u64,
                error = %error,
                "retrying provider request"
            );
            let _mark = RetryMark::enter(&self.inner, key, attempt);
            tokio::time::sleep(delay).await;
        }
    }

    async fn dispatch(&self, request: &WireRequest) -> Result<WireResponse> {
        if request.is_batchable() {
            batch::submit(&self.inner, request.clone()).await
        } else {
            self.inner.transport.send(request).await
        }
    }
}
