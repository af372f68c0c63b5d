//! Route matching and the immutable Route Table (spec §4.2, §3).

use std::{collections::HashMap, sync::Arc};

use crate::{
    app::{AppHandler, AppRegistry},
    ids::{AppId, EndpointId},
    snapshot::{ConfigSnapshot, RouteCondition, RouteDef},
};

/// A matcher is polymorphic over `{Matches, ExtractParams}` (spec §4.2). Both variants are
/// deterministic and side-effect-free.
#[derive(Debug)]
pub enum Matcher {
    /// Matches when `request.path` has `pattern` as a byte prefix; parameters are always
    /// empty.
    Prefix(String),
    /// Segment-based matching with named-segment capture, built on `matchit`.
    Param(matchit::Router<()>),
}

impl Matcher {
    pub fn compile(condition: &RouteCondition) -> Result<Self, CompileError> {
        match condition {
            RouteCondition::HttpPath { path, params } if *params => {
                let mut router = matchit::Router::new();
                router
                    .insert(path, ())
                    .map_err(|e| CompileError::Matcher(path.clone(), e.to_string()))?;
                Ok(Matcher::Param(router))
            }
            RouteCondition::HttpPath { path, .. } => Ok(Matcher::Prefix(path.clone())),
        }
    }

    pub fn matches(&self, path: &str) -> bool {
        match self {
            Matcher::Prefix(pattern) => path.starts_with(pattern.as_str()),
            Matcher::Param(router) => router.at(path).is_ok(),
        }
    }

    pub fn extract_params(&self, path: &str) -> HashMap<String, String> {
        match self {
            Matcher::Prefix(_) => HashMap::new(),
            Matcher::Param(router) => router
                .at(path)
                .map(|m| {
                    m.params
                        .iter()
                        .map(|(k, v)| (k.to_string(), v.to_string()))
                        .collect()
                })
                .unwrap_or_default(),
        }
    }

    /// Length of the longest parameter-free prefix of the original pattern, used to break
    /// ties between routes that both match the same request (spec §4.2).
    fn literal_prefix_len(pattern: &str) -> usize {
        pattern
            .find([':', '*'])
            .unwrap_or(pattern.len())
    }
}

#[derive(Debug, thiserror::Error)]
pub enum CompileError {
    #[error("invalid route pattern {0:?}: {1}")]
    Matcher(String, String),
}

/// A compiled route: the original [`RouteDef`], its matcher, and a resolved app handle.
pub struct CompiledRoute {
    pub path_pattern: String,
    pub app_id: AppId,
    pub static_data: Arc<serde_json::Map<String, serde_json::Value>>,
    pub matcher: Matcher,
    pub app: Arc<dyn AppHandler>,
}

/// Immutable `endpoint_id -> ordered[CompiledRoute]` mapping, produced whole from a
/// snapshot and never mutated in place (spec §3 invariant).
#[derive(Default)]
pub struct RouteTable {
    endpoints: HashMap<EndpointId, Vec<CompiledRoute>>,
}

impl RouteTable {
    /// Routes for one endpoint, in the order `resolve` should try them — already sorted by
    /// longest-literal-prefix then definition order (spec §4.2's tie-break policy), so a
    /// caller only ever needs to take the first match.
    pub fn routes_for(&self, endpoint_id: &EndpointId) -> Option<&[CompiledRoute]> {
        self.endpoints.get(endpoint_id).map(Vec::as_slice)
    }

    /// Compiles a whole Route Table from a snapshot's endpoints against an already-built
    /// app registry. Unresolved app references are dropped with a warning (non-fatal, spec
    /// §3/§4.3); only matcher-compilation failures are fatal.
    pub fn compile(
        snapshot: &ConfigSnapshot,
        apps: &AppRegistry,
    ) -> Result<RouteTable, CompileError> {
        let mut endpoints = HashMap::with_capacity(snapshot.endpoints.len());
        for endpoint in &snapshot.endpoints {
            let mut compiled: Vec<(usize, CompiledRoute)> = Vec::with_capacity(endpoint.routes.len());
            for (idx, route) in endpoint.routes.iter().enumerate() {
                match compile_one(route, apps)? {
                    Some(c) => compiled.push((idx, c)),
                    None => {
                        tracing::warn!(
                            endpoint = %endpoint.id,
                            app_id = %route.app_id,
                            "route references unknown app, dropping route"
                        );
                    }
                }
            }
            compiled.sort_by_key(|(idx, c)| {
                (
                    std::cmp::Reverse(Matcher::literal_prefix_len(&c.path_pattern)),
                    *idx,
                )
            });
            endpoints.insert(
                endpoint.id.clone(),
                compiled.into_iter().map(|(_, c)| c).collect(),
            );
        }
        Ok(RouteTable { endpoints })
    }
}

fn compile_one(
    route: &RouteDef,
    apps: &AppRegistry,
) -> Result<Option<CompiledRoute>, CompileError> {
    let Some(app) = apps.lookup(&route.app_id) else {
        return Ok(None);
    };
    let matcher = Matcher::compile(&route.condition)?;
    let RouteCondition::HttpPath { path, .. } = &route.condition;
    let static_data: serde_json::Map<_, _> = route.static_data.clone().into_iter().collect();
    Ok(Some(CompiledRoute {
        path_pattern: path.clone(),
        app_id: route.app_id.clone(),
        static_data: Arc::new(static_data),
        matcher,
        app,
    }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::app::{AppError, AppRegistryBuilder, RequestContext, ResponseBody};

    struct Noop(AppId);

    #[async_trait::async_trait]
    impl AppHandler for Noop {
        fn id(&self) -> &AppId {
            &self.0
        }
        async fn handle_http(
            &self,
            _ctx: RequestContext,
            _req: http::Request<hyper::body::Incoming>,
        ) -> Result<http::Response<ResponseBody>, AppError> {
            unreachable!()
        }
    }

    fn registry(ids: &[&str]) -> AppRegistry {
        let mut b = AppRegistryBuilder::new();
        for id in ids {
            b.register(Arc::new(Noop(AppId::from(*id)))).unwrap();
        }
        b.build()
    }

    fn route(path: &str, app: &str, params: bool) -> RouteDef {
        RouteDef {
            app_id: AppId::from(app),
            condition: RouteCondition::HttpPath {
                path: path.to_string(),
                params,
            },
            static_data: Default::default(),
        }
    }

    #[test]
    fn longest_prefix_wins_ties() {
        let apps = registry(&["x", "y"]);
        let snapshot = ConfigSnapshot {
            version: "v".into(),
            listeners: vec![],
            endpoints: vec![crate::snapshot::EndpointDef {
                id: EndpointId::from("E1"),
                listener_ids: vec![],
                routes: vec![route("/a", "x", false), route("/a/b", "y", false)],
            }],
            apps: vec![],
        };
        let table = RouteTable::compile(&snapshot, &apps).unwrap();
        let routes = table.routes_for(&EndpointId::from("E1")).unwrap();

        let hit = routes.iter().find(|r| r.matcher.matches("/a/b/c")).unwrap();
        assert_eq!(hit.app_id.as_str(), "y");

        let hit2 = routes.iter().find(|r| r.matcher.matches("/a/c")).unwrap();
        assert_eq!(hit2.app_id.as_str(), "x");
    }

    #[test]
    fn unknown_app_is_dropped_non_fatally() {
        let apps = registry(&["echo"]);
        let snapshot = ConfigSnapshot {
            version: "v".into(),
            listeners: vec![],
            endpoints: vec![crate::snapshot::EndpointDef {
                id: EndpointId::from("E1"),
                listener_ids: vec![],
                routes: vec![route("/", "missing", false), route("/ok", "echo", false)],
            }],
            apps: vec![],
        };
        let table = RouteTable::compile(&snapshot, &apps).unwrap();
        let routes = table.routes_for(&EndpointId::from("E1")).unwrap();
        assert_eq!(routes.len(), 1);
        assert_eq!(routes[0].app_id.as_str(), "echo");
    }

    #[test]
    fn param_route_extracts_segments() {
        let apps = registry(&["echo"]);
        let snapshot = ConfigSnapshot {
            version: "v".into(),
            listeners: vec![],
            endpoints: vec![crate::snapshot::EndpointDef {
                id: EndpointId::from("E1"),
                listener_ids: vec![],
                routes: vec![route("/users/:id", "echo", true)],
            }],
            apps: vec![],
        };
        let table = RouteTable::compile(&snapshot, &apps).unwrap();
        let routes = table.routes_for(&EndpointId::from("E1")).unwrap();
        let params = routes[0].matcher.extract_params("/users/42");
        assert_eq!(params.get("id"), Some(&"42".to_string()));
    }
}
