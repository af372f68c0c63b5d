//! The built-in `echo` application (spec §6): always registered regardless of
//! configuration, echoes configured response text as `text/plain`.

use bytes::Bytes;
use dispatch_core::{
    app::{AppError, AppHandler, RequestContext, ResponseBody},
    ids::AppId,
    snapshot::AppDef,
};
use http::{Request, Response};
use http_body_util::{BodyExt, Full};
use hyper::body::Incoming;
use serde::Deserialize;

#[derive(Debug, Deserialize, Default)]
struct EchoConfig {
    response: Option<String>,
}

pub struct EchoApp {
    id: AppId,
    response: String,
}

impl EchoApp {
    /// The always-registered fallback instance: id `echo`, response defaults to that id
    /// (spec §6). Registered last so a snapshot's own `echo` app definition, if any, wins.
    pub fn fallback() -> Self {
        Self {
            id: AppId::from("echo"),
            response: "echo".to_string(),
        }
    }

    /// Builds an instance from a configuration-supplied app definition of kind `echo`.
    /// Response defaults to the app's own id when the definition carries none.
    pub fn from_def(def: &AppDef) -> Self {
        let cfg: EchoConfig = serde_json::from_value(def.config.clone()).unwrap_or_default();
        let response = cfg.response.unwrap_or_else(|| def.id.as_str().to_string());
        Self {
            id: def.id.clone(),
            response,
        }
    }
}

#[async_trait::async_trait]
impl AppHandler for EchoApp {
    fn id(&self) -> &AppId {
        &self.id
    }

    async fn handle_http(
        &self,
        _ctx: RequestContext,
        _req: Request<Incoming>,
    ) -> Result<Response<ResponseBody>, AppError> {
        let body: ResponseBody = Full::new(Bytes::from(self.response.clone()))
            .map_err(|never| match never {})
            .boxed();
        Ok(Response::builder()
            .status(http::StatusCode::OK)
            .header(http::header::CONTENT_TYPE, "text/plain; charset=utf-8")
            .body(body)
            .expect("static response head is always valid"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn fallback_defaults_response_to_own_id() {
        let app = EchoApp::fallback();
        assert_eq!(app.id().as_str(), "echo");
        assert_eq!(app.response, "echo");
    }

    #[tokio::test]
    async fn uses_configured_response() {
        let def = AppDef {
            id: AppId::from("echo"),
            kind: "echo".to_string(),
            config: serde_json::json!({"response": "hello"}),
        };
        let app = EchoApp::from_def(&def);
        assert_eq!(app.response, "hello");
    }
}
