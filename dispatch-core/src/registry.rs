//! The Routing Registry: the lock-free hot-swappable holder of the current [`RouteTable`]
//! (spec §4.3).
//!
//! `Resolve` is the hot path: one atomic `load`, then plain immutable traversal — no lock is
//! ever taken to serve a request. `Install` is the cold path, serialized by a plain mutex so
//! concurrent writers can't race building two tables into the same slot.

use std::sync::{Arc, Mutex};

use arc_swap::ArcSwapOption;

use crate::{
    ids::EndpointId,
    route::RouteTable,
    snapshot::ConfigSnapshot,
};

pub struct Resolution {
    pub app: Arc<dyn crate::app::AppHandler>,
    pub params: std::collections::HashMap<String, String>,
    pub static_data: serde_json::Map<String, serde_json::Value>,
}

/// Distinct from a genuine resolution failure (`NotInitialized`), `NoEndpoint` and `NoMatch`
/// are both "no match" outcomes per spec §4.3 ("if absent, returns `(nil, nil)`" for an
/// unknown endpoint) — callers should treat them identically (e.g. both map to 404, spec
/// §4.4), kept as separate variants only so logging/diagnostics can tell them apart.
#[derive(Debug, thiserror::Error)]
pub enum ResolveError {
    #[error("routing registry has no installed route table yet")]
    NotInitialized,
    #[error("no endpoint {0} in the installed route table")]
    NoEndpoint(EndpointId),
    #[error("no route matched the request path")]
    NoMatch,
}

/// Owns the single, atomically-swappable [`RouteTable`] slot. Cloning a `RoutingRegistry`
/// is not supported — callers share it behind an `Arc`, same as the app registry.
#[derive(Default)]
pub struct RoutingRegistry {
    current: ArcSwapOption<RouteTable>,
    install_lock: Mutex<()>,
}

impl RoutingRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_initialized(&self) -> bool {
        self.current.load().is_some()
    }

    /// Resolves `path` against the routes for `endpoint_id` in the currently installed
    /// table. A single `load()` plus immutable traversal; no lock, no allocation beyond the
    /// returned deep copy of the matched route's static data (spec §4.3).
    pub fn resolve(&self, endpoint_id: &EndpointId, path: &str) -> Result<Resolution, ResolveError> {
        let guard = self.current.load();
        let table = guard.as_deref().ok_or(ResolveError::NotInitialized)?;
        let routes = table
            .routes_for(endpoint_id)
            .ok_or_else(|| ResolveError::NoEndpoint(endpoint_id.clone()))?;
        let compiled = routes
            .iter()
            .find(|r| r.matcher.matches(path))
            .ok_or(ResolveError::NoMatch)?;
        Ok(Resolution {
            app: compiled.app.clone(),
            params: compiled.matcher.extract_params(path),
            static_data: (*compiled.static_data).clone(),
        })
    }

    /// Atomically swaps in a freshly compiled table. Serialized against other installers by
    /// `install_lock` so two concurrent `Install`s can't interleave their `store`s; readers
    /// never contend on this lock. Takes an already-`Arc`'d table so a caller that compiled
    /// it as part of a participant's pending adapter can hand over the same allocation
    /// instead of forcing a second one.
    pub fn install(&self, table: Arc<RouteTable>) {
        let _serialize = self.install_lock.lock().unwrap();
        self.current.store(Some(table));
    }
}

#[derive(Debug, thiserror::Error)]
pub enum ValidationError {
    #[error("listener {listener} references unknown endpoint {endpoint}")]
    UnknownEndpoint {
        listener: crate::ids::ListenerId,
        endpoint: EndpointId,
    },
}

/// Structural validation a snapshot must pass before any participant is allowed to act on
/// it (spec §3): every listener's endpoint reference must resolve within the same snapshot.
pub fn validate_snapshot(snapshot: &ConfigSnapshot) -> Result<(), ValidationError> {
    for listener in &snapshot.listeners {
        if snapshot.endpoint(&listener.endpoint_id).is_none() {
            return Err(ValidationError::UnknownEndpoint {
                listener: listener.id.clone(),
                endpoint: listener.endpoint_id.clone(),
            });
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::app::{AppHandler, AppRegistryBuilder};
    use crate::ids::AppId;
    use crate::snapshot::{EndpointDef, ListenerConfig, RouteCondition, RouteDef};

    struct Noop(AppId);

    #[async_trait::async_trait]
    impl AppHandler for Noop {
        fn id(&self) -> &AppId {
            &self.0
        }
        async fn handle_http(
            &self,
            _ctx: crate::app::RequestContext,
            _req: http::Request<hyper::body::Incoming>,
        ) -> Result<http::Response<crate::app::ResponseBody>, crate::app::AppError> {
            unreachable!()
        }
    }

    #[test]
    fn resolve_before_install_is_not_initialized() {
        let reg = RoutingRegistry::new();
        let err = reg.resolve(&EndpointId::from("E1"), "/").unwrap_err();
        assert!(matches!(err, ResolveError::NotInitialized));
    }

    #[test]
    fn resolve_after_install_finds_match() {
        let mut builder = AppRegistryBuilder::new();
        builder.register(Arc::new(Noop(AppId::from("echo")))).unwrap();
        let apps = builder.build();

        let snapshot = ConfigSnapshot {
            version: "v1".into(),
            listeners: vec![],
            endpoints: vec![EndpointDef {
                id: EndpointId::from("E1"),
                listener_ids: vec![],
                routes: vec![RouteDef {
                    app_id: AppId::from("echo"),
                    condition: RouteCondition::HttpPath {
                        path: "/".into(),
                        params: false,
                    },
                    static_data: Default::default(),
                }],
            }],
            apps: vec![],
        };

        let table = RouteTable::compile(&snapshot, &apps).unwrap();
        let reg = RoutingRegistry::new();
        reg.install(Arc::new(table));

        let resolved = reg.resolve(&EndpointId::from("E1"), "/anything").unwrap();
        assert_eq!(resolved.app.id().as_str(), "echo");
    }

    #[test]
    fn validate_rejects_dangling_listener_endpoint() {
        let snapshot = ConfigSnapshot {
            version: "v1".into(),
            listeners: vec![ListenerConfig {
                id: crate::ids::ListenerId::from("L1"),
                address: "127.0.0.1:0".parse().unwrap(),
                endpoint_id: EndpointId::from("missing"),
                read_timeout: crate::snapshot::DEFAULT_RW_TIMEOUT,
                write_timeout: crate::snapshot::DEFAULT_RW_TIMEOUT,
                idle_timeout: crate::snapshot::DEFAULT_RW_TIMEOUT,
                drain_timeout: crate::snapshot::DEFAULT_DRAIN_TIMEOUT,
            }],
            endpoints: vec![],
            apps: vec![],
        };
        assert!(validate_snapshot(&snapshot).is_err());
    }

    /// An endpoint absent from the installed table resolves to `NoEndpoint`, which callers
    /// must treat as a no-match (spec §4.3: "if absent, returns `(nil, nil)`"), not a
    /// resolution failure.
    #[test]
    fn resolve_against_absent_endpoint_is_no_endpoint_not_not_initialized() {
        let mut builder = AppRegistryBuilder::new();
        builder.register(Arc::new(Noop(AppId::from("echo")))).unwrap();
        let apps = builder.build();

        let snapshot = ConfigSnapshot {
            version: "v1".into(),
            listeners: vec![],
            endpoints: vec![EndpointDef {
                id: EndpointId::from("E1"),
                listener_ids: vec![],
                routes: vec![RouteDef {
                    app_id: AppId::from("echo"),
                    condition: RouteCondition::HttpPath {
                        path: "/".into(),
                        params: false,
                    },
                    static_data: Default::default(),
                }],
            }],
            apps: vec![],
        };
        let table = RouteTable::compile(&snapshot, &apps).unwrap();
        let reg = RoutingRegistry::new();
        reg.install(Arc::new(table));

        let err = reg.resolve(&EndpointId::from("E2"), "/").unwrap_err();
        assert!(matches!(err, ResolveError::NoEndpoint(_)));
    }
}
