use super::core::{ActiveSlot, Adapters, Gateway};
use super::mode::Mode;
use crate::config::GatewayConfig;
use crate::optimizer::{Connectivity, Optimizer};
use crate::providers::{
    DemoAdapter, FallbackAdapter, LiveAdapter, OfflineAdapter, ProviderAdapter, ScriptedAdapter,
};
use crate::tokens::CharacterEstimator;
use crate::transport::{HttpTransport, Transport};
use crate::Result;
use arc_swap::{ArcSwap, ArcSwapOption};
use std::sync::atomic::AtomicUsize;
use std::sync::Arc;
use tracing::debug;

/// Builder for [`Gateway`].
///
/// Everything defaults from [`GatewayConfig`]; tests swap in a fake transport, a
/// pre-armed scripted adapter or a shared connectivity flag.
#[derive(Default)]
pub struct GatewayBuilder {
    config: GatewayConfig,
    mode: Option<Mode>,
    transport: Option<Arc<dyn Transport>>,
    scripted: Option<Arc<ScriptedAdapter>>,
    connectivity: Option<Connectivity>,
}

impl GatewayBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_config(mut self, config: GatewayConfig) -> Self {
        self.config = config;
        self
    }

    /// Starting mode; overrides `config.mode`.
    pub fn with_mode(mut self, mode: Mode) -> Self {
        self.mode = Some(mode);
        self
    }

    pub fn with_transport(mut self, transport: Arc<dyn Transport>) -> Self {
        self.transport = Some(transport);
        self
    }

    pub fn with_scripted_adapter(mut self, adapter: Arc<ScriptedAdapter>) -> Self {
        self.scripted = Some(adapter);
        self
    }

    pub fn with_connectivity(mut self, connectivity: Connectivity) -> Self {
        self.connectivity = Some(connectivity);
        self
    }

    pub fn build(self) -> Result<Gateway> {
        let config = self.config;
        config.validate()?;

        let transport: Arc<dyn Transport> = match self.transport {
            Some(t) => t,
            None => Arc::new(HttpTransport::new(&config.http)?),
        };
        let optimizer = Optimizer::new(
            config.optimizer.clone(),
            transport,
            self.connectivity.unwrap_or_default(),
        );

        let mut live: Vec<Arc<dyn ProviderAdapter>> = config
            .ordered_providers()
            .into_iter()
            .map(|p| {
                let adapter = LiveAdapter::new(p.clone(), optimizer.clone())
                    .with_max_fragment_joins(config.max_fragment_joins);
                Arc::new(adapter) as Arc<dyn ProviderAdapter>
            })
            .collect();
        let live: Arc<dyn ProviderAdapter> = match live.len() {
            1 => live.remove(0),
            _ => Arc::new(FallbackAdapter::new(live)),
        };
        debug!(live = live.name(), "live adapter assembled");

        let adapters = Adapters {
            demo: Arc::new(DemoAdapter::new()),
            scripted: self.scripted.unwrap_or_default(),
            offline: Arc::new(OfflineAdapter::new()),
            live,
        };
        let mode = self.mode.unwrap_or(config.mode);
        let slot = ActiveSlot {
            mode,
            adapter: adapters.for_mode(mode),
        };

        Ok(Gateway {
            config,
            adapters,
            slot: ArcSwap::from_pointee(slot),
            optimizer,
            inflight: Arc::new(AtomicUsize::new(0)),
            health: ArcSwapOption::empty(),
            switch: tokio::sync::Mutex::new(()),
            routing: std::sync::RwLock::new(()),
            counter: CharacterEstimator::new(),
        })
    }
}
