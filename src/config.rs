//! 配置模块：从 YAML 文件与环境变量加载网关配置。
//!
//! # Configuration
//!
//! [`GatewayConfig`] is deserialized from YAML with a default for every field, then
//! overridden from the environment:
//!
//! | Variable | Effect |
//! |----------|--------|
//! | `AI_GATEWAY_CONFIG` | Path of the YAML file to load |
//! | `AI_GATEWAY_MODE` | `demo`, `scripted`, `offline` or `live` |
//! | `AI_GATEWAY_TIMEOUT_SECS` | Default deadline for a whole call |
//! | `AI_GATEWAY_PROVIDERS` | Comma-separated provider priority, e.g. `anthropic,openai` |
//! | `AI_GATEWAY_PROXY_URL` | Proxy for every provider request |
//! | `AI_GATEWAY_MAX_ATTEMPTS` | Retry ceiling (total attempts) |
//!
//! Durations are stored as integer milliseconds, matching the YAML files.

use crate::drivers::ApiStyle;
use crate::gateway::Mode;
use crate::optimizer::OptimizerConfig;
use crate::{Error, ErrorContext, Result};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::path::Path;
use std::time::Duration;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct GatewayConfig {
    /// Mode the gateway starts in.
    pub mode: Mode,
    /// Deadline for a whole call when the request does not carry one.
    pub request_timeout_ms: u64,
    pub health_timeout_ms: u64,
    /// Probes slower than this report `degraded`.
    pub degraded_threshold_ms: u64,
    /// Local prompt budget; requests estimated above it are rejected before sending.
    pub max_prompt_tokens: Option<usize>,
    /// Bound on how many lines a split JSON fragment may span.
    pub max_fragment_joins: usize,
    pub http: HttpSettings,
    pub optimizer: OptimizerConfig,
    pub providers: Vec<ProviderConfig>,
    /// Provider ids in fallback order. Unlisted providers follow in declaration order.
    pub provider_priority: Vec<String>,
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            mode: Mode::Demo,
            request_timeout_ms: 120_000,
            health_timeout_ms: 10_000,
            degraded_threshold_ms: 3_000,
            max_prompt_tokens: None,
            max_fragment_joins: 3,
            http: HttpSettings::default(),
            optimizer: OptimizerConfig::default(),
            providers: Vec::new(),
            provider_priority: Vec::new(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct HttpSettings {
    pub request_timeout_ms: u64,
    pub connect_timeout_ms: u64,
    pub pool_max_idle_per_host: usize,
    pub pool_idle_timeout_ms: u64,
    pub proxy_url: Option<String>,
}

impl Default for HttpSettings {
    fn default() -> Self {
        Self {
            request_timeout_ms: 120_000,
            connect_timeout_ms: 10_000,
            pool_max_idle_per_host: 32,
            pool_idle_timeout_ms: 90_000,
            proxy_url: None,
        }
    }
}

impl HttpSettings {
    pub fn request_timeout(&self) -> Duration {
        Duration::from_millis(self.request_timeout_ms)
    }

    pub fn connect_timeout(&self) -> Duration {
        Duration::from_millis(self.connect_timeout_ms)
    }

    pub fn pool_idle_timeout(&self) -> Duration {
        Duration::from_millis(self.pool_idle_timeout_ms)
    }
}

/// One live backend.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProviderConfig {
    pub id: String,
    pub api_style: ApiStyle,
    /// e.g. `https://api.openai.com/v1`
    pub base_url: String,
    /// Default model for chat requests.
    pub model: String,
    /// Static model list; when empty the provider is asked.
    #[serde(default)]
    pub models: Vec<String>,
    /// Environment variable holding the key; defaults to `{ID}_API_KEY`.
    #[serde(default)]
    pub api_key_env: Option<String>,
}

impl ProviderConfig {
    pub fn new(
        id: impl Into<String>,
        api_style: ApiStyle,
        base_url: impl Into<String>,
        model: impl Into<String>,
    ) -> Self {
        Self {
            id: id.into(),
            api_style,
            base_url: base_url.into(),
            model: model.into(),
            models: Vec::new(),
            api_key_env: None,
        }
    }

    pub fn api_key_env(&self) -> String {
        self.api_key_env.clone().unwrap_or_else(|| {
            format!("{}_API_KEY", self.id.to_uppercase().replace('-', "_"))
        })
    }

    /// Parsed base URL; only http and https are accepted.
    pub fn parsed_base_url(&self) -> Result<url::Url> {
        let context = || {
            ErrorContext::new()
                .with_field_path(format!("providers.{}.base_url", self.id))
                .with_source("gateway_config")
        };
        let parsed = url::Url::parse(&self.base_url).map_err(|e| {
            Error::configuration_with_context(
                "invalid provider base URL",
                context().with_details(e.to_string()),
            )
        })?;
        if !matches!(parsed.scheme(), "http" | "https") {
            return Err(Error::configuration_with_context(
                "provider base URL must use http or https",
                context().with_details(parsed.scheme().to_string()),
            ));
        }
        Ok(parsed)
    }
}

impl GatewayConfig {
    pub fn from_yaml_str(yaml: &str) -> Result<Self> {
        let config: GatewayConfig = serde_yaml::from_str(yaml)?;
        config.validate()?;
        Ok(config)
    }

    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let text = std::fs::read_to_string(path)?;
        Self::from_yaml_str(&text)
    }

    /// File named by `AI_GATEWAY_CONFIG` (or defaults), then environment overrides.
    pub fn load() -> Result<Self> {
        let mut config = match std::env::var("AI_GATEWAY_CONFIG") {
            Ok(path) => Self::from_file(path)?,
            Err(_) => Self::default(),
        };
        config.apply_overrides(|key| std::env::var(key).ok())?;
        config.validate()?;
        Ok(config)
    }

    /// Apply `AI_GATEWAY_*` overrides from an arbitrary lookup.
    pub fn apply_overrides(&mut self, lookup: impl Fn(&str) -> Option<String>) -> Result<()> {
        if let Some(mode) = lookup("AI_GATEWAY_MODE") {
            self.mode = mode.parse()?;
        }
        if let Some(secs) = lookup("AI_GATEWAY_TIMEOUT_SECS") {
            let secs: u64 = parse_env("AI_GATEWAY_TIMEOUT_SECS", &secs)?;
            self.request_timeout_ms = secs.saturating_mul(1000);
        }
        if let Some(list) = lookup("AI_GATEWAY_PROVIDERS") {
            self.provider_priority = list
                .split(',')
                .map(|s| s.trim().to_string())
                .filter(|s| !s.is_empty())
                .collect();
        }
        if let Some(proxy) = lookup("AI_GATEWAY_PROXY_URL") {
            self.http.proxy_url = Some(proxy);
        }
        if let Some(attempts) = lookup("AI_GATEWAY_MAX_ATTEMPTS") {
            self.optimizer.max_attempts = parse_env("AI_GATEWAY_MAX_ATTEMPTS", &attempts)?;
        }
        Ok(())
    }

    pub fn validate(&self) -> Result<()> {
        if self.optimizer.max_attempts == 0 {
            return Err(Error::configuration_with_context(
                "at least one attempt is required",
                ErrorContext::new()
                    .with_field_path("optimizer.max_attempts")
                    .with_source("gateway_config"),
            ));
        }
        if !self.optimizer.jitter.is_finite() || self.optimizer.jitter < 0.0 {
            return Err(Error::configuration_with_context(
                "jitter must be a finite non-negative fraction",
                ErrorContext::new()
                    .with_field_path("optimizer.jitter")
                    .with_details(self.optimizer.jitter.to_string())
                    .with_source("gateway_config"),
            ));
        }
        if self.request_timeout_ms == 0 || self.health_timeout_ms == 0 {
            return Err(Error::configuration_with_context(
                "timeouts must be positive",
                ErrorContext::new().with_source("gateway_config"),
            ));
        }
        let mut seen = HashSet::new();
        for provider in &self.providers {
            if !seen.insert(provider.id.as_str()) {
                return Err(Error::configuration_with_context(
                    "duplicate provider id",
                    ErrorContext::new()
                        .with_field_path("providers")
                        .with_details(provider.id.clone())
                        .with_source("gateway_config"),
                ));
            }
            provider.parsed_base_url()?;
        }
        Ok(())
    }

    /// Providers in fallback order.
    pub fn ordered_providers(&self) -> Vec<&ProviderConfig> {
        let mut ordered: Vec<&ProviderConfig> = self
            .provider_priority
            .iter()
            .filter_map(|id| self.providers.iter().find(|p| &p.id == id))
            .collect();
        for provider in &self.providers {
            if !ordered.iter().any(|p| p.id == provider.id) {
                ordered.push(provider);
            }
        }
        ordered
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_millis(self.request_timeout_ms)
    }

    pub fn health_timeout(&self) -> Duration {
        Duration::from_millis(self.health_timeout_ms)
    }

    pub fn degraded_threshold(&self) -> Duration {
        Duration::from_millis(self.degraded_threshold_ms)
    }
}

fn parse_env<T: std::str::FromStr>(key: &str, value: &str) -> Result<T> {
    value.trim().parse().map_err(|_| {
        Error::configuration_with_context(
            "invalid environment override",
            ErrorContext::new()
                .with_field_path(key)
                .with_details(value.to_string())
                .with_source("gateway_config"),
        )
    })
}
