//! The Listener Fleet Manager: a composite supervisor of [`HttpServerWrapper`]s keyed by
//! listener id (spec §4.5), grounded on the teacher's static-file config manager's
//! diff/prepare/commit/abort patch pipeline (`monolake::config::manager`), generalized here
//! from whole services to individual listeners.

use std::{
    collections::HashMap,
    sync::{Arc, Mutex},
};

use dispatch_core::{
    ids::ListenerId,
    registry::RoutingRegistry,
    snapshot::{ConfigSnapshot, ListenerConfig},
};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use crate::http::{DispatchHandler, HttpServerWrapper, WrapperError, WrapperState};

pub type HttpAdapter = HashMap<ListenerId, ListenerConfig>;

pub fn http_adapter_from_snapshot(snapshot: &ConfigSnapshot) -> HttpAdapter {
    snapshot
        .listeners
        .iter()
        .map(|l| (l.id.clone(), l.clone()))
        .collect()
}

#[derive(Debug, thiserror::Error)]
pub enum FleetError {
    #[error("starting listener {0} failed: {1}")]
    Start(ListenerId, WrapperError),
}

struct RunningWrapper {
    wrapper: Arc<HttpServerWrapper>,
    cancel: CancellationToken,
    task: JoinHandle<Result<(), WrapperError>>,
}

/// Holds the live set of server wrappers plus the adapter that produced them, so a failed
/// `reconcile` can reinstate what was running before (spec §4.5: "the manager triggers its
/// own compensation by reinstating the previous adapter").
pub struct FleetManager {
    registry: Arc<RoutingRegistry>,
    wrappers: Mutex<HashMap<ListenerId, RunningWrapper>>,
    applied: Mutex<HttpAdapter>,
    state: tokio::sync::watch::Sender<&'static str>,
}

impl FleetManager {
    pub fn new(registry: Arc<RoutingRegistry>) -> Self {
        let (state, _) = tokio::sync::watch::channel("Idle");
        Self {
            registry,
            wrappers: Mutex::new(HashMap::new()),
            applied: Mutex::new(HashMap::new()),
            state,
        }
    }

    pub fn states(&self) -> HashMap<ListenerId, WrapperState> {
        self.wrappers
            .lock()
            .unwrap()
            .iter()
            .map(|(id, running)| (id.clone(), running.wrapper.state()))
            .collect()
    }

    /// Aggregate observational state for the fleet as a whole (spec §6 `State()`):
    /// `"Idle"` with no listeners running, `"Running"` otherwise.
    pub fn state(&self) -> &'static str {
        *self.state.borrow()
    }

    /// `StateChanges(ctx)` (spec §6), the tokio analogue of a generic state stream.
    pub fn subscribe(&self) -> tokio::sync::watch::Receiver<&'static str> {
        self.state.subscribe()
    }

    fn refresh_state(&self) {
        let running = !self.wrappers.lock().unwrap().is_empty();
        let _ = self.state.send(if running { "Running" } else { "Idle" });
    }

    /// Reconciles the live listener set to `target`. Removals first, then replacements,
    /// then additions (spec §4.5), so port-reuse conflicts between a removed and a freshly
    /// added listener on the same address are minimized. Idempotent: reconciling with an
    /// unchanged adapter only re-issues no-op `UpdateHandler` calls.
    pub async fn reconcile(&self, target: HttpAdapter) -> Result<(), FleetError> {
        let previous = self.applied.lock().unwrap().clone();
        match self.apply_adapter(&previous, &target).await {
            Ok(()) => {
                *self.applied.lock().unwrap() = target;
                Ok(())
            }
            Err(e) => {
                tracing::error!(error = %e, "fleet reconcile failed, reinstating previous adapter");
                if let Err(e2) = self.apply_adapter(&target, &previous).await {
                    tracing::error!(error = %e2, "fleet compensation also failed, listener set may be inconsistent");
                }
                Err(e)
            }
        }
    }

    async fn apply_adapter(&self, previous: &HttpAdapter, target: &HttpAdapter) -> Result<(), FleetError> {
        let removed: Vec<ListenerId> = previous
            .keys()
            .filter(|id| !target.contains_key(*id))
            .cloned()
            .collect();
        let common: Vec<ListenerId> = previous
            .keys()
            .filter(|id| target.contains_key(*id))
            .cloned()
            .collect();
        let added: Vec<ListenerId> = target
            .keys()
            .filter(|id| !previous.contains_key(*id))
            .cloned()
            .collect();

        for id in removed {
            self.drain_and_remove(&id).await;
        }
        for id in common {
            let old = &previous[&id];
            let new = &target[&id];
            if binding_changed(old, new) {
                self.drain_and_remove(&id).await;
                self.start(new).await?;
            } else {
                self.update_handler(new);
            }
        }
        for id in added {
            self.start(&target[&id]).await?;
        }
        self.refresh_state();
        Ok(())
    }

    async fn start(&self, config: &ListenerConfig) -> Result<(), FleetError> {
        let handler = DispatchHandler::new(self.registry.clone(), config.id.clone(), config.endpoint_id.clone());
        let wrapper = Arc::new(HttpServerWrapper::new(config, handler));
        let listener = wrapper
            .bind()
            .await
            .map_err(|e| FleetError::Start(config.id.clone(), e))?;

        let cancel = CancellationToken::new();
        let task_wrapper = wrapper.clone();
        let task_cancel = cancel.clone();
        let task = tokio::spawn(async move { task_wrapper.run_with_listener(listener, task_cancel).await });

        self.wrappers.lock().unwrap().insert(
            config.id.clone(),
            RunningWrapper {
                wrapper,
                cancel,
                task,
            },
        );
        Ok(())
    }

    fn update_handler(&self, config: &ListenerConfig) {
        let wrappers = self.wrappers.lock().unwrap();
        if let Some(running) = wrappers.get(&config.id) {
            let handler = DispatchHandler::new(self.registry.clone(), config.id.clone(), config.endpoint_id.clone());
            running.wrapper.update_handler(handler);
        }
    }

    async fn drain_and_remove(&self, id: &ListenerId) {
        let running = self.wrappers.lock().unwrap().remove(id);
        if let Some(running) = running {
            running.cancel.cancel();
            match running.task.await {
                Ok(Err(e)) => {
                    tracing::error!(listener_id = %id, error = %e, "listener did not drain cleanly");
                }
                Err(e) => {
                    tracing::error!(listener_id = %id, error = %e, "listener task panicked during drain");
                }
                Ok(Ok(())) => {}
            }
        }
    }

    /// Cancels every running wrapper and waits for each to finish draining (spec §4.5
    /// `Stop`). Each wrapper gets its own drain window rather than one shared deadline
    /// (spec §9).
    pub async fn stop(&self) {
        let ids: Vec<ListenerId> = self.wrappers.lock().unwrap().keys().cloned().collect();
        for id in ids {
            self.drain_and_remove(&id).await;
        }
        self.refresh_state();
    }
}

fn binding_changed(a: &ListenerConfig, b: &ListenerConfig) -> bool {
    a.address != b.address
        || a.read_timeout != b.read_timeout
        || a.write_timeout != b.write_timeout
        || a.idle_timeout != b.idle_timeout
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    use dispatch_core::{
        ids::EndpointId,
        snapshot::{DEFAULT_DRAIN_TIMEOUT, DEFAULT_RW_TIMEOUT},
    };

    fn free_addr() -> std::net::SocketAddr {
        let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
        listener.local_addr().unwrap()
    }

    fn listener_config(id: &str, addr: std::net::SocketAddr, endpoint: &str) -> ListenerConfig {
        ListenerConfig {
            id: ListenerId::from(id),
            address: addr,
            endpoint_id: EndpointId::from(endpoint),
            read_timeout: DEFAULT_RW_TIMEOUT,
            write_timeout: DEFAULT_RW_TIMEOUT,
            idle_timeout: DEFAULT_RW_TIMEOUT,
            drain_timeout: DEFAULT_DRAIN_TIMEOUT,
        }
    }

    /// Boundary behavior 8 (spec §8): a snapshot with zero listeners is legal.
    #[tokio::test]
    async fn reconcile_with_empty_adapter_is_a_no_op() {
        let manager = FleetManager::new(Arc::new(RoutingRegistry::new()));
        manager.reconcile(HttpAdapter::new()).await.unwrap();
        assert!(manager.states().is_empty());
        assert_eq!(manager.state(), "Idle");
    }

    /// Round-trip/idempotence property 6 (spec §8): reconciling twice with the identical
    /// adapter produces identical observable state (the listener is not torn down and
    /// restarted the second time).
    #[tokio::test]
    async fn reconcile_is_idempotent_for_an_unchanged_adapter() {
        let manager = FleetManager::new(Arc::new(RoutingRegistry::new()));
        let addr = free_addr();
        let mut adapter = HttpAdapter::new();
        adapter.insert(ListenerId::from("L1"), listener_config("L1", addr, "E1"));

        manager.reconcile(adapter.clone()).await.unwrap();
        assert_eq!(manager.state(), "Running");

        manager.reconcile(adapter).await.unwrap();
        assert_eq!(manager.states().len(), 1);
        assert_eq!(manager.state(), "Running");

        manager.stop().await;
        assert_eq!(manager.state(), "Idle");
    }

    /// Boundary behavior 10 (spec §8): changing only a listener's timeouts forces a
    /// drain-and-replace, and the static address can be reused immediately after.
    #[tokio::test]
    async fn timeout_only_change_drains_and_replaces_same_address() {
        let manager = FleetManager::new(Arc::new(RoutingRegistry::new()));
        let addr = free_addr();
        let mut adapter = HttpAdapter::new();
        adapter.insert(ListenerId::from("L1"), listener_config("L1", addr, "E1"));
        manager.reconcile(adapter.clone()).await.unwrap();

        let mut changed = adapter;
        changed.get_mut(&ListenerId::from("L1")).unwrap().idle_timeout = Duration::from_secs(5);
        manager.reconcile(changed).await.unwrap();

        assert_eq!(manager.states().len(), 1);
        manager.stop().await;
    }
}
