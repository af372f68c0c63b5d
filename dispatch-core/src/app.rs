//! App Registry (spec §4.1).
//!
//! The registry owns the set of live app handlers for the current snapshot. Handlers are
//! constructed once per `Prepare` from [`AppDef`](crate::snapshot::AppDef) and shared via
//! `Arc` from then on: any handler returned by [`AppRegistry::lookup`] stays valid for as
//! long as the caller holds it, independent of later snapshots replacing the registry
//! itself (shared ownership, never a back-reference from app to registry).

use std::{collections::HashMap, net::SocketAddr};

use http::{Request, Response};
use http_body_util::combinators::BoxBody;
use hyper::body::{Bytes, Incoming};

use crate::ids::AppId;

/// Body type returned by an [`AppHandler`]. Boxed so handlers can freely mix body
/// implementations (`Full`, `Empty`, streaming) behind one object-safe trait.
pub type ResponseBody = BoxBody<Bytes, std::convert::Infallible>;

/// Per-request context handed to a handler alongside the request itself. Carries only
/// connection-level facts the handler cannot recover from the request value.
#[derive(Debug, Clone)]
pub struct RequestContext {
    pub peer_addr: SocketAddr,
    pub listener_id: crate::ids::ListenerId,
    pub endpoint_id: crate::ids::EndpointId,
    pub params: HashMap<String, String>,
    /// Deep copy of the route's static data, fresh per resolve (spec §4.3).
    pub static_data: serde_json::Map<String, serde_json::Value>,
}

#[derive(Debug, thiserror::Error)]
#[error("app {app_id} handler error: {cause}")]
pub struct AppError {
    pub app_id: AppId,
    pub cause: anyhow::Error,
}

/// An application handler: identity plus the single operation it exposes.
///
/// Static per-route data is bound at route-compile time and arrives via
/// [`RequestContext::static_data`], not as a separate per-call argument — this fixes the
/// Open Question from spec §9 in favor of the route-compile-time shape.
#[async_trait::async_trait]
pub trait AppHandler: Send + Sync {
    fn id(&self) -> &AppId;

    async fn handle_http(
        &self,
        ctx: RequestContext,
        req: Request<Incoming>,
    ) -> Result<Response<ResponseBody>, AppError>;
}

/// Duplicate app ids at composition time are a build error (spec §4.1).
#[derive(Debug, thiserror::Error)]
pub enum RegistryError {
    #[error("duplicate app id {0}")]
    Duplicate(AppId),
}

/// Mapping from [`AppId`] to live app handler, immutable after construction within a
/// transaction cycle (spec §4.1). `Lookup` is a constant-time, concurrent-safe hash-map
/// read once the registry has been handed out as an `Arc`.
#[derive(Default)]
pub struct AppRegistryBuilder {
    apps: HashMap<AppId, std::sync::Arc<dyn AppHandler>>,
}

impl AppRegistryBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a handler. Returns [`RegistryError::Duplicate`] if the id is already
    /// present — except for the reserved `echo` id, which silently keeps its original
    /// registration and only logs a warning (spec §6: `echo` is always registered).
    pub fn register(&mut self, handler: std::sync::Arc<dyn AppHandler>) -> Result<(), RegistryError> {
        let id = handler.id().clone();
        if self.apps.contains_key(&id) {
            if id.as_str() == "echo" {
                tracing::warn!("ignoring attempt to redefine the built-in 'echo' app");
                return Ok(());
            }
            return Err(RegistryError::Duplicate(id));
        }
        self.apps.insert(id, handler);
        Ok(())
    }

    pub fn build(self) -> AppRegistry {
        AppRegistry {
            apps: self.apps,
        }
    }
}

pub struct AppRegistry {
    apps: HashMap<AppId, std::sync::Arc<dyn AppHandler>>,
}

impl AppRegistry {
    pub fn lookup(&self, id: &AppId) -> Option<std::sync::Arc<dyn AppHandler>> {
        self.apps.get(id).cloned()
    }
}
