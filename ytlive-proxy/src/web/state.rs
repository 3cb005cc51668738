//! Web server shared state.

use std::sync::Arc;

use crate::config::AppConfig;
use crate::metrics::Metrics;
use crate::orchestrator::Orchestrator;
use crate::relay::Relay;
use crate::scheduler::RefreshScheduler;

/// Everything a request handler can reach.
pub struct WebState {
    pub orchestrator: Arc<Orchestrator>,
    pub scheduler: Arc<RefreshScheduler>,
    pub relay: Arc<Relay>,
    /// Effective configuration, served by `/config`.
    pub config: Arc<AppConfig>,
    pub metrics: Arc<Metrics>,
}

impl WebState {
    pub fn new(
        orchestrator: Arc<Orchestrator>,
        scheduler: Arc<RefreshScheduler>,
        relay: Arc<Relay>,
        config: Arc<AppConfig>,
        metrics: Arc<Metrics>,
    ) -> Self {
        Self {
            orchestrator,
            scheduler,
            relay,
            config,
            metrics,
        }
    }

    /// Channels the refresher keeps warm.
    pub fn configured_channels(&self) -> &[String] {
        &self.scheduler.config().channels
    }
}
