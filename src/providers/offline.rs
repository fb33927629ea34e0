use super::{single, CallContext, Credentials, ProviderAdapter};
use crate::error::ErrorKind;
use crate::types::{EventStream, Request, ResponseEvent};
use crate::{Error, Result};
use async_trait::async_trait;
use std::sync::Arc;

/// Adapter for offline mode. It refuses to configure and answers every request
/// with `Error(Unauthorized)`, so offline mode can never look functional.
#[derive(Debug, Default)]
pub struct OfflineAdapter;

impl OfflineAdapter {
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl ProviderAdapter for OfflineAdapter {
    fn name(&self) -> &str {
        "offline"
    }

    async fn configure(&self, _credentials: Option<&Credentials>) -> Result<()> {
        Err(Error::configuration("offline mode cannot be configured"))
    }

    fn is_configured(&self) -> bool {
        false
    }

    fn send(self: Arc<Self>, _request: Arc<Request>, _ctx: CallContext) -> EventStream {
        single(ResponseEvent::error(
            ErrorKind::Unauthorized,
            "offline mode: no AI provider is available",
        ))
    }

    async fn probe(&self) -> Result<()> {
        Err(Error::Offline)
    }

    async fn available_models(&self) -> Result<Vec<String>> {
        Ok(Vec::new())
    }
}
