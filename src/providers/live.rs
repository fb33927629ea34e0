//! Adapter for one live HTTP provider.
//!
//! Request flow: driver builds the provider body, the optimizer sends it (dedup,
//! retry, deadline), the streaming decoder turns the body into events.

use super::credentials::resolve_api_key;
use super::{single, CallContext, Credentials, ProviderAdapter};
use crate::config::ProviderConfig;
use crate::drivers::{create_driver, ProviderDriver};
use crate::optimizer::Optimizer;
use crate::pipeline::decode::DEFAULT_MAX_JOINS;
use crate::pipeline::StreamDecoder;
use crate::transport::{Method, WireRequest};
use crate::types::{EventStream, Request};
use crate::{Error, ErrorContext, Result};
use arc_swap::ArcSwapOption;
use async_trait::async_trait;
use futures::{stream, StreamExt};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

/// Batch class shared by model listings and health probes.
const MODELS_BATCH_CLASS: &str = "models";

pub struct LiveAdapter {
    provider: ProviderConfig,
    driver: Arc<dyn ProviderDriver>,
    optimizer: Optimizer,
    api_key: ArcSwapOption<String>,
    configured: AtomicBool,
    max_joins: usize,
}

impl std::fmt::Debug for LiveAdapter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LiveAdapter")
            .field("provider", &self.provider.id)
            .field("api_style", &self.provider.api_style)
            .field("configured", &self.is_configured())
            .finish()
    }
}

impl LiveAdapter {
    pub fn new(provider: ProviderConfig, optimizer: Optimizer) -> Self {
        let driver = create_driver(provider.api_style, &provider.id);
        Self {
            provider,
            driver,
            optimizer,
            api_key: ArcSwapOption::empty(),
            configured: AtomicBool::new(false),
            max_joins: DEFAULT_MAX_JOINS,
        }
    }

    pub fn with_max_fragment_joins(mut self, max_joins: usize) -> Self {
        self.max_joins = max_joins;
        self
    }

    pub fn provider(&self) -> &ProviderConfig {
        &self.provider
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.provider.base_url.trim_end_matches('/'), path)
    }

    fn with_auth(&self, mut wire: WireRequest, extra: Vec<(String, String)>) -> WireRequest {
        let mut headers = match self.api_key.load_full() {
            Some(key) => self.driver.auth_headers(&key),
            None => Vec::new(),
        };
        headers.extend(extra);
        for (name, value) in headers {
            if !wire.headers.iter().any(|(n, _)| n.eq_ignore_ascii_case(&name)) {
                wire = wire.with_header(name, value);
            }
        }
        wire
    }

    fn chat_request(&self, request: &Request) -> Result<(WireRequest, bool)> {
        let model = request.model.as_deref().unwrap_or(&self.provider.model);
        let built = self.driver.build_request(request, model)?;
        let url = self.url(&built.path);
        let wire = match built.method {
            Method::Post => WireRequest::post_json(url, &built.body)?,
            Method::Get => WireRequest::get(url),
        };
        Ok((self.with_auth(wire, built.headers), built.stream))
    }

    async fn open(&self, request: &Request, ctx: &CallContext) -> Result<EventStream> {
        if !self.is_configured() {
            return Err(Error::configuration(format!(
                "{} adapter is not configured",
                self.provider.id
            )));
        }
        let (wire, stream) = self.chat_request(request)?;
        info!(
            request_id = ctx.request_id.as_str(),
            provider = self.provider.id.as_str(),
            stream,
            "sending provider request"
        );
        let response = self
            .optimizer
            .execute(wire, Some(ctx.deadline), &ctx.cancel)
            .await?;
        debug!(
            request_id = ctx.request_id.as_str(),
            status = response.status,
            "provider response headers received"
        );
        Ok(StreamDecoder::new(self.driver.clone(), self.driver.framing(stream))
            .with_response_format(request.response_format)
            .with_max_joins(self.max_joins)
            .decode(response.body))
    }

    async fn fetch_models(&self) -> Result<Vec<String>> {
        if !self.is_configured() {
            return Err(Error::configuration(format!(
                "{} adapter is not configured",
                self.provider.id
            )));
        }
        let wire = self.with_auth(
            WireRequest::get(self.url(self.driver.models_path()))
                .with_batch_class(MODELS_BATCH_CLASS),
            Vec::new(),
        );
        let response = self
            .optimizer
            .execute(wire, None, &CancellationToken::new())
            .await?;
        let body = response.bytes().await?;
        let value: serde_json::Value = serde_json::from_slice(&body)?;
        Ok(self.driver.parse_models(&value))
    }
}

#[async_trait]
impl ProviderAdapter for LiveAdapter {
    fn name(&self) -> &str {
        &self.provider.id
    }

    async fn configure(&self, credentials: Option<&Credentials>) -> Result<()> {
        if let Err(e) = self.provider.parsed_base_url() {
            self.configured.store(false, Ordering::SeqCst);
            return Err(e);
        }
        let key = resolve_api_key(&self.provider, credentials);
        if key.is_none() && self.driver.requires_api_key() {
            self.configured.store(false, Ordering::SeqCst);
            return Err(Error::configuration_with_context(
                "no API key available for provider",
                ErrorContext::new()
                    .with_field_path(format!("providers.{}", self.provider.id))
                    .with_details(format!(
                        "pass credentials, store one in the keyring or set {}",
                        self.provider.api_key_env()
                    ))
                    .with_source("live_adapter"),
            ));
        }
        self.api_key.store(key.map(Arc::new));
        self.configured.store(true, Ordering::SeqCst);
        info!(provider = self.provider.id.as_str(), "live provider configured");
        Ok(())
    }

    fn is_configured(&self) -> bool {
        self.configured.load(Ordering::SeqCst)
    }

    fn send(self: Arc<Self>, request: Arc<Request>, ctx: CallContext) -> EventStream {
        Box::pin(
            stream::once(async move {
                match self.open(&request, &ctx).await {
                    Ok(events) => events,
                    Err(e) => single(e.into_event()),
                }
            })
            .flatten(),
        )
    }

    async fn probe(&self) -> Result<()> {
        self.fetch_models().await.map(|_| ())
    }

    async fn available_models(&self) -> Result<Vec<String>> {
        if !self.provider.models.is_empty() {
            return Ok(self.provider.models.clone());
        }
        self.fetch_models().await
    }
}
