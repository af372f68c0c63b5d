//! The thin per-listener dispatch adapter: resolves a request against the Routing Registry
//! and invokes the matched app handler (spec §4.4).

use std::{net::SocketAddr, sync::Arc};

use bytes::Bytes;
use dispatch_core::{
    app::{RequestContext, ResponseBody},
    ids::{EndpointId, ListenerId},
    registry::{ResolveError, RoutingRegistry},
};
use http::{Request, Response, StatusCode};
use http_body_util::{BodyExt, Full};
use hyper::body::Incoming;

/// Resolves and dispatches one request for a specific listener/endpoint pair. Cheap to
/// construct; a wrapper swaps in a fresh one whenever its endpoint binding changes
/// (`UpdateHandler`, spec §4.4) without touching the accept loop.
#[derive(Clone)]
pub struct DispatchHandler {
    registry: Arc<RoutingRegistry>,
    listener_id: ListenerId,
    endpoint_id: EndpointId,
}

impl DispatchHandler {
    pub fn new(registry: Arc<RoutingRegistry>, listener_id: ListenerId, endpoint_id: EndpointId) -> Self {
        Self {
            registry,
            listener_id,
            endpoint_id,
        }
    }

    pub fn endpoint_id(&self) -> &EndpointId {
        &self.endpoint_id
    }

    /// Error mapping per spec §4.3/§4.4: an absent endpoint is itself "no match" (`Resolve`
    /// returns `(nil, nil)` for it, same as an endpoint with no matching route), so it maps
    /// to 404 alongside `NoMatch`. Only `NotInitialized` (no snapshot ever installed) is a
    /// genuine resolution failure and maps to 500. Handler error -> 500. Never returns
    /// `Err`: every outcome is represented as a response.
    pub async fn dispatch(&self, peer_addr: SocketAddr, req: Request<Incoming>) -> Response<ResponseBody> {
        let path = req.uri().path().to_string();
        match self.registry.resolve(&self.endpoint_id, &path) {
            Ok(resolution) => {
                let ctx = RequestContext {
                    peer_addr,
                    listener_id: self.listener_id.clone(),
                    endpoint_id: self.endpoint_id.clone(),
                    params: resolution.params,
                    static_data: resolution.static_data,
                };
                match resolution.app.handle_http(ctx, req).await {
                    Ok(resp) => resp,
                    Err(e) => {
                        tracing::error!(listener_id = %self.listener_id, error = %e, "app handler error");
                        text_response(StatusCode::INTERNAL_SERVER_ERROR, "internal server error")
                    }
                }
            }
            Err(ResolveError::NoMatch) | Err(ResolveError::NoEndpoint(_)) => {
                text_response(StatusCode::NOT_FOUND, "not found")
            }
            Err(err @ ResolveError::NotInitialized) => {
                tracing::error!(listener_id = %self.listener_id, error = %err, "route resolution failed");
                text_response(StatusCode::INTERNAL_SERVER_ERROR, "internal server error")
            }
        }
    }
}

pub fn text_response(status: StatusCode, body: &'static str) -> Response<ResponseBody> {
    let body: ResponseBody = Full::new(Bytes::from_static(body.as_bytes()))
        .map_err(|never| match never {})
        .boxed();
    Response::builder()
        .status(status)
        .header(http::header::CONTENT_TYPE, "text/plain; charset=utf-8")
        .body(body)
        .expect("static response head is always valid")
}
