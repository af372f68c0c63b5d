//! The configuration snapshot schema (spec §3, §6).
//!
//! A [`ConfigSnapshot`] is a self-contained, whole-system configuration value. It is the
//! only thing a [`crate::Transaction`](crate::transaction::Transaction) ever carries: no
//! participant reaches back to an external config source mid-transaction.

use std::{collections::HashMap, net::SocketAddr, time::Duration};

use serde::{Deserialize, Serialize};

use crate::ids::{AppId, EndpointId, ListenerId};

/// Default read/write/idle timeout floor, one minute.
pub const DEFAULT_RW_TIMEOUT: Duration = Duration::from_secs(60);
/// Default drain timeout floor, ten minutes.
pub const DEFAULT_DRAIN_TIMEOUT: Duration = Duration::from_secs(600);

fn default_rw_timeout() -> Duration {
    DEFAULT_RW_TIMEOUT
}

fn default_drain_timeout() -> Duration {
    DEFAULT_DRAIN_TIMEOUT
}

/// A complete configuration snapshot, as delivered to [`Runner::submit`](crate::AnyResult).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConfigSnapshot {
    pub version: String,
    #[serde(default)]
    pub listeners: Vec<ListenerConfig>,
    #[serde(default)]
    pub endpoints: Vec<EndpointDef>,
    #[serde(default)]
    pub apps: Vec<AppDef>,
}

impl ConfigSnapshot {
    pub fn endpoint(&self, id: &EndpointId) -> Option<&EndpointDef> {
        self.endpoints.iter().find(|e| &e.id == id)
    }

    pub fn listener(&self, id: &ListenerId) -> Option<&ListenerConfig> {
        self.listeners.iter().find(|l| &l.id == id)
    }
}

/// One listener: a bound address, its timeouts, and the endpoint it serves.
///
/// Exactly one endpoint per listener, per spec §3.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ListenerConfig {
    pub id: ListenerId,
    pub address: SocketAddr,
    pub endpoint_id: EndpointId,
    #[serde(default = "default_rw_timeout", with = "humantime_duration")]
    pub read_timeout: Duration,
    #[serde(default = "default_rw_timeout", with = "humantime_duration")]
    pub write_timeout: Duration,
    #[serde(default = "default_rw_timeout", with = "humantime_duration")]
    pub idle_timeout: Duration,
    #[serde(default = "default_drain_timeout", with = "humantime_duration")]
    pub drain_timeout: Duration,
}

/// A logical routing namespace: an ordered list of routes reachable from its listeners.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EndpointDef {
    pub id: EndpointId,
    #[serde(default)]
    pub listener_ids: Vec<ListenerId>,
    pub routes: Vec<RouteDef>,
}

/// One route: a path condition, the app it dispatches to, and its compile-time static data.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RouteDef {
    pub app_id: AppId,
    pub condition: RouteCondition,
    #[serde(default)]
    pub static_data: HashMap<String, serde_json::Value>,
}

/// The matcher a route compiles to. `HTTPPath` is the only condition kind today; it is
/// modeled as an enum (rather than a bare path string) so the schema can grow new kinds
/// without a breaking change.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "kind")]
pub enum RouteCondition {
    #[serde(rename = "HTTPPath")]
    HttpPath {
        path: String,
        #[serde(default)]
        params: bool,
    },
}

/// An app definition: its id, its type (which selects the handler implementation), and
/// type-specific configuration carried as an opaque JSON value.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppDef {
    pub id: AppId,
    #[serde(rename = "type")]
    pub kind: String,
    #[serde(flatten)]
    pub config: serde_json::Value,
}

mod humantime_duration {
    use std::time::Duration;

    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(d: &Duration, s: S) -> Result<S::Ok, S::Error> {
        s.serialize_f64(d.as_secs_f64())
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<Duration, D::Error> {
        let secs = f64::deserialize(d)?;
        Ok(Duration::from_secs_f64(secs.max(0.0)))
    }
}
