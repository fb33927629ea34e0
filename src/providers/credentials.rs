//! API key lookup.
//!
//! Keys are resolved per provider in this order: credentials passed to
//! `configure`, the OS keyring (service `ai-gateway`, read only), then the
//! provider's environment variable. The gateway never stores keys anywhere.

use crate::config::ProviderConfig;
use std::collections::HashMap;
use std::fmt;
use tracing::debug;

pub const KEYRING_SERVICE: &str = "ai-gateway";

/// Key that applies to every provider without its own entry.
const ANY_PROVIDER: &str = "*";

#[derive(Clone, Default, PartialEq, Eq)]
pub struct Credentials {
    keys: HashMap<String, String>,
}

impl Credentials {
    pub fn new() -> Self {
        Self::default()
    }

    /// One key for every provider.
    pub fn api_key(key: impl Into<String>) -> Self {
        Self::new().with_key(ANY_PROVIDER, key)
    }

    pub fn with_key(mut self, provider: impl Into<String>, key: impl Into<String>) -> Self {
        self.keys.insert(provider.into(), key.into());
        self
    }

    pub fn key_for(&self, provider: &str) -> Option<&str> {
        self.keys
            .get(provider)
            .or_else(|| self.keys.get(ANY_PROVIDER))
            .map(String::as_str)
            .filter(|k| !k.trim().is_empty())
    }

    pub fn is_empty(&self) -> bool {
        self.keys.is_empty()
    }
}

impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut providers: Vec<&str> = self.keys.keys().map(String::as_str).collect();
        providers.sort_unstable();
        f.debug_struct("Credentials")
            .field("providers", &providers)
            .field("keys", &"<redacted>")
            .finish()
    }
}

pub fn resolve_api_key(provider: &ProviderConfig, explicit: Option<&Credentials>) -> Option<String> {
    if let Some(key) = explicit.and_then(|c| c.key_for(&provider.id)) {
        return Some(key.to_string());
    }
    if let Some(key) = keyring_lookup(&provider.id) {
        debug!(provider = provider.id.as_str(), "api key loaded from keyring");
        return Some(key);
    }
    let var = provider.api_key_env();
    std::env::var(&var).ok().filter(|k| !k.trim().is_empty())
}

fn keyring_lookup(provider_id: &str) -> Option<String> {
    let entry = keyring::Entry::new(KEYRING_SERVICE, provider_id).ok()?;
    entry.get_password().ok().filter(|k| !k.trim().is_empty())
}
