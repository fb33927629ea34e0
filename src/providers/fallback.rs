use super::{single, CallContext, Credentials, ProviderAdapter};
use crate::error::ErrorKind;
use crate::types::{EventStream, Request, ResponseEvent};
use crate::{Error, Result};
use async_trait::async_trait;
use futures::{stream, StreamExt};
use std::collections::HashSet;
use std::sync::Arc;
use tracing::{info, warn};

/// Tries live providers in priority order.
///
/// A provider is abandoned only when its *first* event is a fallbackable error;
/// once anything else has been delivered the call is committed to that provider.
pub struct FallbackAdapter {
    name: String,
    adapters: Vec<Arc<dyn ProviderAdapter>>,
}

impl FallbackAdapter {
    pub fn new(adapters: Vec<Arc<dyn ProviderAdapter>>) -> Self {
        let ids: Vec<&str> = adapters.iter().map(|a| a.name()).collect();
        Self {
            name: format!("fallback({})", ids.join(",")),
            adapters,
        }
    }

    pub fn len(&self) -> usize {
        self.adapters.len()
    }

    pub fn is_empty(&self) -> bool {
        self.adapters.is_empty()
    }
}

struct Failure {
    provider: String,
    kind: ErrorKind,
    message: String,
}

fn exhausted(mut failures: Vec<Failure>) -> ResponseEvent {
    if failures.len() > 1 {
        let kind = failures
            .last()
            .map(|f| f.kind)
            .unwrap_or(ErrorKind::TransientNetwork);
        let detail: Vec<String> = failures
            .iter()
            .map(|f| format!("{}: {}", f.provider, f.message))
            .collect();
        return ResponseEvent::error(kind, format!("All providers failed: {}", detail.join("; ")));
    }
    match failures.pop() {
        Some(f) => ResponseEvent::Error {
            kind: f.kind,
            message: f.message,
        },
        None => ResponseEvent::error(ErrorKind::Configuration, "no live providers configured"),
    }
}

#[async_trait]
impl ProviderAdapter for FallbackAdapter {
    fn name(&self) -> &str {
        &self.name
    }

    async fn configure(&self, credentials: Option<&Credentials>) -> Result<()> {
        if self.adapters.is_empty() {
            return Err(Error::configuration("no live providers configured"));
        }
        let mut last_error = None;
        let mut configured = 0usize;
        for adapter in &self.adapters {
            match adapter.configure(credentials).await {
                Ok(()) => configured += 1,
                Err(e) => {
                    warn!(provider = adapter.name(), error = %e, "provider not configured");
                    last_error = Some(e);
                }
            }
        }
        info!(configured, total = self.adapters.len(), "live providers configured");
        match (configured, last_error) {
            (0, Some(e)) => Err(e),
            _ => Ok(()),
        }
    }

    fn is_configured(&self) -> bool {
        self.adapters.iter().any(|a| a.is_configured())
    }

    fn send(self: Arc<Self>, request: Arc<Request>, ctx: CallContext) -> EventStream {
        Box::pin(
            stream::once(async move {
                let mut failures = Vec::new();
                for adapter in &self.adapters {
                    let mut events = adapter.clone().send(request.clone(), ctx.clone());
                    match events.next().await {
                        Some(ResponseEvent::Error { kind, message }) if kind.is_fallbackable() => {
                            warn!(
                                request_id = ctx.request_id.as_str(),
                                provider = adapter.name(),
                                %kind,
                                %message,
                                "provider failed, falling back"
                            );
                            failures.push(Failure {
                                provider: adapter.name().to_string(),
                                kind,
                                message,
                            });
                        }
                        Some(first) => {
                            let committed: EventStream =
                                Box::pin(stream::iter(vec![first]).chain(events));
                            return committed;
                        }
                        None => failures.push(Failure {
                            provider: adapter.name().to_string(),
                            kind: ErrorKind::Malformed,
                            message: "provider produced no events".into(),
                        }),
                    }
                }
                single(exhausted(failures))
            })
            .flatten(),
        )
    }

    async fn probe(&self) -> Result<()> {
        let mut last_error = Error::configuration("no live providers configured");
        for adapter in &self.adapters {
            match adapter.probe().await {
                Ok(()) => return Ok(()),
                Err(e) => last_error = e,
            }
        }
        Err(last_error)
    }

    async fn available_models(&self) -> Result<Vec<String>> {
        let mut models = Vec::new();
        let mut last_error = None;
        for adapter in self.adapters.iter().filter(|a| a.is_configured()) {
            match adapter.available_models().await {
                Ok(list) => models.extend(list),
                Err(e) => last_error = Some(e),
            }
        }
        match (models.is_empty(), last_error) {
            (true, Some(e)) => Err(e),
            _ => {
                let mut seen = HashSet::new();
                models.retain(|m| seen.insert(m.clone()));
                Ok(models)
            }
        }
    }
}
