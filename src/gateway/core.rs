use super::health::ProviderHealth;
use super::mode::Mode;
use crate::config::GatewayConfig;
use crate::optimizer::{Connectivity, Optimizer, OptimizerSnapshot};
use crate::pipeline::terminated;
use crate::providers::{
    CallContext, Credentials, DemoAdapter, OfflineAdapter, ProviderAdapter, ScriptedAdapter,
};
use crate::tokens::{CharacterEstimator, TokenCounter};
use crate::types::{EventStream, Request, Transcript};
use crate::{Error, ErrorContext, Result};
use arc_swap::{ArcSwap, ArcSwapOption};
use futures::stream;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, PoisonError, RwLock};
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};
use uuid::Uuid;

/// The adapter currently serving requests.
pub(crate) struct ActiveSlot {
    pub(crate) mode: Mode,
    pub(crate) adapter: Arc<dyn ProviderAdapter>,
}

/// One adapter per mode, built once.
pub(crate) struct Adapters {
    pub(crate) demo: Arc<DemoAdapter>,
    pub(crate) scripted: Arc<ScriptedAdapter>,
    pub(crate) offline: Arc<OfflineAdapter>,
    pub(crate) live: Arc<dyn ProviderAdapter>,
}

impl Adapters {
    pub(crate) fn for_mode(&self, mode: Mode) -> Arc<dyn ProviderAdapter> {
        match mode {
            Mode::Demo => self.demo.clone(),
            Mode::Scripted => self.scripted.clone(),
            Mode::Offline => self.offline.clone(),
            Mode::Live => self.live.clone(),
        }
    }
}

/// Cancels the call it was returned with.
#[derive(Debug, Clone)]
pub struct CancelHandle(CancellationToken);

impl CancelHandle {
    pub fn cancel(&self) {
        self.0.cancel();
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.is_cancelled()
    }
}

/// Counts a call as in flight until its event stream is finished or dropped.
struct InflightTicket {
    counter: Arc<AtomicUsize>,
    request_id: String,
    mode: Mode,
    started: std::time::Instant,
}

impl InflightTicket {
    fn new(counter: Arc<AtomicUsize>, request_id: String, mode: Mode) -> Self {
        counter.fetch_add(1, Ordering::SeqCst);
        Self {
            counter,
            request_id,
            mode,
            started: std::time::Instant::now(),
        }
    }
}

impl Drop for InflightTicket {
    fn drop(&mut self) {
        self.counter.fetch_sub(1, Ordering::SeqCst);
        info!(
            request_id = self.request_id.as_str(),
            mode = %self.mode,
            duration_ms = self.started.elapsed().as_millis() as u64,
            "call finished"
        );
    }
}

/// Public entry point. Routes each request to the adapter of the active mode.
pub struct Gateway {
    pub(crate) config: GatewayConfig,
    pub(crate) adapters: Adapters,
    pub(crate) slot: ArcSwap<ActiveSlot>,
    pub(crate) optimizer: Optimizer,
    pub(crate) inflight: Arc<AtomicUsize>,
    pub(crate) health: ArcSwapOption<ProviderHealth>,
    pub(crate) switch: tokio::sync::Mutex<()>,
    /// Held shared while a call picks its adapter and takes its ticket, exclusive
    /// while a mode switch checks the in-flight count and swaps the slot.
    pub(crate) routing: RwLock<()>,
    pub(crate) counter: CharacterEstimator,
}

impl std::fmt::Debug for Gateway {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Gateway")
            .field("mode", &self.mode())
            .field("configured", &self.is_configured())
            .field("in_flight", &self.in_flight())
            .finish()
    }
}

impl Gateway {
    /// Build from a config with the default HTTP transport.
    pub fn new(config: GatewayConfig) -> Result<Self> {
        super::GatewayBuilder::new().with_config(config).build()
    }

    /// Build from `AI_GATEWAY_*` environment configuration.
    pub fn from_env() -> Result<Self> {
        Self::new(GatewayConfig::load()?)
    }

    pub fn mode(&self) -> Mode {
        self.slot.load().mode
    }

    pub fn is_configured(&self) -> bool {
        self.slot.load().adapter.is_configured()
    }

    /// Calls whose event streams are still alive.
    pub fn in_flight(&self) -> usize {
        self.inflight.load(Ordering::SeqCst)
    }

    pub fn config(&self) -> &GatewayConfig {
        &self.config
    }

    /// Switch to `mode` and configure its adapter.
    ///
    /// A no-op when `mode` is already active and configured. Refused while any call
    /// is in flight if the mode would change. On failure the gateway stays on the
    /// new mode and reports unconfigured.
    pub async fn configure(&self, mode: Mode, credentials: Option<Credentials>) -> Result<()> {
        let _switching = self.switch.lock().await;
        let current = self.slot.load_full();

        if current.mode == mode && current.adapter.is_configured() {
            return Ok(());
        }
        if current.mode != mode {
            self.switch_slot(current.mode, mode)?;
            info!(from = %current.mode, to = %mode, "mode switched");
        }

        let adapter = self.slot.load().adapter.clone();
        match adapter.configure(credentials.as_ref()).await {
            Ok(()) => {
                info!(%mode, adapter = adapter.name(), "gateway configured");
                Ok(())
            }
            Err(e) => {
                warn!(%mode, adapter = adapter.name(), error = %e, "configuration failed");
                Err(e)
            }
        }
    }

    fn switch_slot(&self, from: Mode, to: Mode) -> Result<()> {
        let _routing = self.routing.write().unwrap_or_else(PoisonError::into_inner);
        let in_flight = self.in_flight();
        if in_flight > 0 {
            return Err(Error::configuration_with_context(
                "cannot switch mode while requests are in flight",
                ErrorContext::new()
                    .with_field_path("mode")
                    .with_details(format!("{} -> {} with {} in flight", from, to, in_flight))
                    .with_source("gateway"),
            ));
        }
        self.slot.store(Arc::new(ActiveSlot {
            mode: to,
            adapter: self.adapters.for_mode(to),
        }));
        Ok(())
    }

    /// Lazy event sequence for `request`. Ends with exactly one `Done` or `Error`.
    pub fn send(&self, request: Request) -> EventStream {
        self.send_with_cancel(request).0
    }

    pub fn send_with_cancel(&self, request: Request) -> (EventStream, CancelHandle) {
        let cancel = CancellationToken::new();
        let handle = CancelHandle(cancel.clone());

        if let Err(e) = self.precheck(&request) {
            warn!(caller = request.caller.as_str(), error = %e, "request rejected before sending");
            return (Box::pin(stream::iter(vec![e.into_event()])), handle);
        }

        let request_id = Uuid::new_v4().to_string();
        let (slot, ticket) = {
            let _routing = self.routing.read().unwrap_or_else(PoisonError::into_inner);
            let slot = self.slot.load_full();
            let ticket = InflightTicket::new(self.inflight.clone(), request_id.clone(), slot.mode);
            (slot, ticket)
        };
        let timeout = request.timeout.unwrap_or_else(|| self.config.request_timeout());
        let deadline = Instant::now() + timeout;
        info!(
            request_id = request_id.as_str(),
            caller = request.caller.as_str(),
            mode = %slot.mode,
            adapter = slot.adapter.name(),
            stream = request.stream,
            "call started"
        );

        let ctx = CallContext {
            request_id,
            deadline,
            cancel: cancel.clone(),
        };
        let events = slot.adapter.clone().send(Arc::new(request), ctx);
        (terminated(events, deadline, cancel, ticket), handle)
    }

    fn precheck(&self, request: &Request) -> Result<()> {
        request.validate()?;
        if let Some(budget) = self.config.max_prompt_tokens {
            let estimated = self.counter.count_request(request);
            if estimated > budget {
                return Err(Error::invalid_request_with_context(
                    "prompt exceeds the local token budget",
                    ErrorContext::new()
                        .with_field_path("request.messages")
                        .with_details(format!("~{} tokens > {}", estimated, budget))
                        .with_source("gateway"),
                ));
            }
        }
        Ok(())
    }

    /// Probe the active adapter, bounded by the health timeout. The result replaces
    /// the previous one.
    pub async fn check_health(&self) -> ProviderHealth {
        let adapter = self.slot.load().adapter.clone();
        let limit = self.config.health_timeout();
        let started = std::time::Instant::now();
        let health = match tokio::time::timeout(limit, adapter.probe()).await {
            Ok(Ok(())) => ProviderHealth::from_probe(started.elapsed(), self.config.degraded_threshold()),
            Ok(Err(e)) => ProviderHealth::unhealthy(e.to_string(), Some(started.elapsed())),
            Err(_) => ProviderHealth::unhealthy(
                format!("health check timed out after {:?}", limit),
                Some(limit),
            ),
        };
        info!(adapter = adapter.name(), status = ?health.status, "health checked");
        self.health.store(Some(Arc::new(health.clone())));
        health
    }

    pub fn last_health(&self) -> Option<ProviderHealth> {
        self.health.load_full().map(|h| h.as_ref().clone())
    }

    pub fn estimate_token_count(&self, text: &str) -> usize {
        self.counter.count(text)
    }

    pub async fn available_models(&self) -> Result<Vec<String>> {
        let adapter = self.slot.load().adapter.clone();
        adapter.available_models().await
    }

    pub fn optimizer_snapshot(&self) -> OptimizerSnapshot {
        self.optimizer.snapshot()
    }

    /// Handle for an external reachability monitor.
    pub fn connectivity(&self) -> Connectivity {
        self.optimizer.connectivity().clone()
    }

    /// The scripted adapter, for tests that need its knobs and counters.
    pub fn scripted(&self) -> Arc<ScriptedAdapter> {
        self.adapters.scripted.clone()
    }

    /// Collect a whole call; convenience for callers that do not stream.
    pub async fn send_and_collect(&self, request: Request) -> Transcript {
        Transcript::collect(self.send(request)).await
    }
}
