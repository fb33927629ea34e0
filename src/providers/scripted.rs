//! Deterministic adapter for tests.
//!
//! Replays a prescribed event sequence without touching the network. The script is
//! chosen by the active scenario override, then by the request's `caller`, and
//! otherwise an echo of the last user message is produced. Knobs inject delays and
//! failures; counters record how often `configure` and `send` were called.

use super::{canned_events, not_configured, single, CallContext, Credentials, ProviderAdapter};
use crate::error::ErrorKind;
use crate::types::{EventStream, Request, ResponseEvent};
use crate::{Error, Result};
use arc_swap::ArcSwap;
use async_trait::async_trait;
use futures::{stream, StreamExt};
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tracing::debug;

#[derive(Debug, Clone)]
pub struct ScriptedKnobs {
    /// Time `configure` takes before it resolves.
    pub configuration_delay: Duration,
    pub should_throw_configuration_error: bool,
    /// Every send yields a single `Error` of `request_error_kind`.
    pub should_throw_request_error: bool,
    pub request_error_kind: ErrorKind,
    /// Sends never produce an event (exercises deadline enforcement).
    pub never_respond: bool,
    /// Pause before each scripted event.
    pub chunk_delay: Duration,
    /// Scenario used for every request, regardless of caller.
    pub active_scenario: Option<String>,
}

impl Default for ScriptedKnobs {
    fn default() -> Self {
        Self {
            configuration_delay: Duration::ZERO,
            should_throw_configuration_error: false,
            should_throw_request_error: false,
            request_error_kind: ErrorKind::TransientNetwork,
            never_respond: false,
            chunk_delay: Duration::ZERO,
            active_scenario: None,
        }
    }
}

#[derive(Debug, Default)]
pub struct ScriptedAdapter {
    knobs: ArcSwap<ScriptedKnobs>,
    scripts: ArcSwap<HashMap<String, Vec<ResponseEvent>>>,
    configured: AtomicBool,
    configure_calls: AtomicUsize,
    send_calls: AtomicUsize,
}

impl ScriptedAdapter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_knobs(knobs: ScriptedKnobs) -> Self {
        let adapter = Self::new();
        adapter.knobs.store(Arc::new(knobs));
        adapter
    }

    pub fn knobs(&self) -> ScriptedKnobs {
        self.knobs.load().as_ref().clone()
    }

    /// Atomically edit the knobs.
    pub fn update_knobs(&self, edit: impl Fn(&mut ScriptedKnobs)) {
        self.knobs.rcu(|current| {
            let mut next = ScriptedKnobs::clone(current);
            edit(&mut next);
            next
        });
    }

    pub fn set_configuration_delay(&self, delay: Duration) {
        self.update_knobs(|k| k.configuration_delay = delay);
    }

    pub fn set_should_throw_configuration_error(&self, value: bool) {
        self.update_knobs(|k| k.should_throw_configuration_error = value);
    }

    pub fn set_should_throw_request_error(&self, value: bool) {
        self.update_knobs(|k| k.should_throw_request_error = value);
    }

    pub fn set_never_respond(&self, value: bool) {
        self.update_knobs(|k| k.never_respond = value);
    }

    pub fn set_chunk_delay(&self, delay: Duration) {
        self.update_knobs(|k| k.chunk_delay = delay);
    }

    pub fn set_active_scenario(&self, scenario: Option<&str>) {
        let scenario = scenario.map(str::to_string);
        self.update_knobs(|k| k.active_scenario = scenario.clone());
    }

    /// Register the events replayed for `scenario`.
    pub fn set_script(&self, scenario: impl Into<String>, events: Vec<ResponseEvent>) {
        let scenario = scenario.into();
        self.scripts.rcu(|current| {
            let mut next = HashMap::clone(current);
            next.insert(scenario.clone(), events.clone());
            next
        });
    }

    pub fn configure_calls(&self) -> usize {
        self.configure_calls.load(Ordering::SeqCst)
    }

    pub fn send_calls(&self) -> usize {
        self.send_calls.load(Ordering::SeqCst)
    }

    pub fn reset_counters(&self) {
        self.configure_calls.store(0, Ordering::SeqCst);
        self.send_calls.store(0, Ordering::SeqCst);
    }

    fn script_for(&self, knobs: &ScriptedKnobs, request: &Request) -> Vec<ResponseEvent> {
        let scripts = self.scripts.load();
        let scripted = knobs
            .active_scenario
            .as_ref()
            .and_then(|s| scripts.get(s))
            .or_else(|| scripts.get(&request.caller));
        if let Some(events) = scripted {
            return events.clone();
        }
        let prompt = request.last_user_text().unwrap_or_default();
        let reply = format!("Scripted reply to: {}", prompt.trim());
        canned_events(&reply, request.stream, request.response_format, None)
    }
}

#[async_trait]
impl ProviderAdapter for ScriptedAdapter {
    fn name(&self) -> &str {
        "scripted"
    }

    async fn configure(&self, _credentials: Option<&Credentials>) -> Result<()> {
        self.configure_calls.fetch_add(1, Ordering::SeqCst);
        let knobs = self.knobs();
        if !knobs.configuration_delay.is_zero() {
            tokio::time::sleep(knobs.configuration_delay).await;
        }
        if knobs.should_throw_configuration_error {
            self.configured.store(false, Ordering::SeqCst);
            return Err(Error::configuration("scripted configuration failure"));
        }
        self.configured.store(true, Ordering::SeqCst);
        Ok(())
    }

    fn is_configured(&self) -> bool {
        self.configured.load(Ordering::SeqCst)
    }

    fn send(self: Arc<Self>, request: Arc<Request>, ctx: CallContext) -> EventStream {
        self.send_calls.fetch_add(1, Ordering::SeqCst);
        if !self.is_configured() {
            return single(not_configured(self.name()));
        }
        let knobs = self.knobs();
        debug!(request_id = ctx.request_id.as_str(), caller = request.caller.as_str(), "scripted send");
        if knobs.should_throw_request_error {
            return single(ResponseEvent::error(
                knobs.request_error_kind,
                "scripted request failure",
            ));
        }
        if knobs.never_respond {
            return Box::pin(stream::pending());
        }

        let events = self.script_for(&knobs, &request);
        let delay = knobs.chunk_delay;
        if delay.is_zero() {
            Box::pin(stream::iter(events))
        } else {
            Box::pin(stream::iter(events).then(move |event| async move {
                tokio::time::sleep(delay).await;
                event
            }))
        }
    }

    async fn probe(&self) -> Result<()> {
        if self.is_configured() {
            Ok(())
        } else {
            Err(Error::configuration("scripted adapter is not configured"))
        }
    }

    async fn available_models(&self) -> Result<Vec<String>> {
        Ok(vec!["scripted-model".to_string()])
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::Transcript;

    fn ctx() -> CallContext {
        CallContext::new("test", Duration::from_secs(5))
    }

    #[tokio::test]
    async fn unconfigured_send_fails_without_replaying() {
        let adapter = Arc::new(ScriptedAdapter::new());
        let t = Transcript::collect(adapter.clone().send(Arc::new(Request::user("ping")), ctx())).await;
        assert_eq!(t.error().map(|(k, _)| k), Some(ErrorKind::Configuration));
        assert_eq!(adapter.send_calls(), 1);
    }

    #[tokio::test]
    async fn configure_is_idempotent() {
        let adapter = ScriptedAdapter::new();
        adapter.configure(None).await.unwrap();
        adapter.configure(None).await.unwrap();
        assert!(adapter.is_configured());
        assert_eq!(adapter.configure_calls(), 2);
    }

    #[tokio::test]
    async fn configuration_error_resets_state() {
        let adapter = ScriptedAdapter::new();
        adapter.configure(None).await.unwrap();
        adapter.set_should_throw_configuration_error(true);
        assert!(adapter.configure(None).await.is_err());
        assert!(!adapter.is_configured());
    }

    #[tokio::test]
    async fn default_script_streams_an_echo() {
        let adapter = Arc::new(ScriptedAdapter::new());
        adapter.configure(None).await.unwrap();
        let request = Arc::new(Request::user("ping").with_stream(true));
        let t = Transcript::collect(adapter.send(request, ctx())).await;
        assert!(t.deltas().len() > 1);
        assert_eq!(t.deltas().concat(), t.text());
        assert_eq!(t.text(), "Scripted reply to: ping");
        assert!(t.is_done());
    }

    #[tokio::test]
    async fn scenario_override_beats_caller_script() {
        let adapter = Arc::new(ScriptedAdapter::new());
        adapter.configure(None).await.unwrap();
        adapter.set_script("coach", vec![ResponseEvent::TextChunk { text: "by caller".into() }, ResponseEvent::done()]);
        adapter.set_script("override", vec![ResponseEvent::TextChunk { text: "by scenario".into() }, ResponseEvent::done()]);

        let request = Arc::new(Request::user("x").with_caller("coach"));
        let t = Transcript::collect(adapter.clone().send(request.clone(), ctx())).await;
        assert_eq!(t.text(), "by caller");

        adapter.set_active_scenario(Some("override"));
        let t = Transcript::collect(adapter.send(request, ctx())).await;
        assert_eq!(t.text(), "by scenario");
    }

    #[tokio::test(start_paused = true)]
    async fn configuration_delay_is_observed() {
        let adapter = ScriptedAdapter::new();
        adapter.set_configuration_delay(Duration::from_millis(250));
        let started = tokio::time::Instant::now();
        adapter.configure(None).await.unwrap();
        assert!(started.elapsed() >= Duration::from_millis(250));
    }
}
