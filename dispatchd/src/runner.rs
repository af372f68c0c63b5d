//! Top-level glue (spec §4.8): wires the participant list into a [`Coordinator`], exposes
//! `submit`, and optionally polls a config source at a fixed interval.

use std::{sync::Arc, time::Duration};

use dispatch_core::{
    ids::TxId,
    registry::RoutingRegistry,
    snapshot::ConfigSnapshot,
};
use dispatch_services::{
    coordinator::SubmitError,
    fleet::FleetManager,
    participants::{FleetParticipant, RoutingParticipant},
    Coordinator,
};

pub struct Runner {
    coordinator: Coordinator,
    fleet: Arc<FleetManager>,
}

impl Runner {
    pub fn new() -> Self {
        let registry = Arc::new(RoutingRegistry::new());
        let fleet = Arc::new(FleetManager::new(registry.clone()));
        let participants: Vec<Arc<dyn dispatch_core::participant::Participant>> = vec![
            Arc::new(RoutingParticipant::new(registry)),
            Arc::new(FleetParticipant::new(fleet.clone())),
        ];
        Self {
            coordinator: Coordinator::new(participants),
            fleet,
        }
    }

    pub async fn submit(&self, snapshot: ConfigSnapshot) -> Result<TxId, SubmitError> {
        self.coordinator.submit(snapshot).await
    }

    pub fn coordinator(&self) -> &Coordinator {
        &self.coordinator
    }

    pub fn fleet(&self) -> &FleetManager {
        &self.fleet
    }

    /// Stops every running listener, giving each its own drain window (spec §9).
    pub async fn shutdown(&self) {
        self.fleet.stop().await;
    }

    /// Polls `source` at `interval` and submits whatever it returns. A zero interval
    /// disables polling (spec §4.8); polling always goes through `submit`, never a side
    /// channel (spec §9).
    pub async fn poll(&self, source: impl ConfigSource, interval: Duration) {
        if interval.is_zero() {
            return;
        }
        let mut ticker = tokio::time::interval(interval);
        loop {
            ticker.tick().await;
            match source.load().await {
                Ok(snapshot) => {
                    if let Err(e) = self.submit(snapshot).await {
                        tracing::error!(error = %e, "polled submission failed");
                    }
                }
                Err(e) => tracing::error!(error = %e, "polling config source failed"),
            }
        }
    }
}

impl Default for Runner {
    fn default() -> Self {
        Self::new()
    }
}

/// An external collaborator producing configuration snapshots (spec §6: file watcher, RPC
/// receiver, reload signal handler).
#[async_trait::async_trait]
pub trait ConfigSource: Send + Sync + 'static {
    async fn load(&self) -> anyhow::Result<ConfigSnapshot>;
}
