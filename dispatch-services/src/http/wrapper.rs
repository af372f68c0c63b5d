//! One bound listener: a TCP socket, an HTTP server, and the handler it dispatches to
//! (spec §4.4).

use std::{net::SocketAddr, sync::Arc, time::Duration};

use arc_swap::ArcSwap;
use dispatch_core::{ids::ListenerId, snapshot::ListenerConfig};
use hyper_util::{rt::TokioIo, server::conn::auto::Builder as ConnBuilder};
use tokio::{net::TcpListener, task::JoinSet};
use tokio_util::sync::CancellationToken;

use super::service::DispatchHandler;

#[derive(Debug, thiserror::Error)]
pub enum WrapperError {
    #[error("failed to bind {addr}: {source}")]
    Bind {
        addr: SocketAddr,
        #[source]
        source: std::io::Error,
    },
    #[error("listener {0} did not finish draining within its drain_timeout")]
    DrainTimeout(ListenerId),
}

/// Observational run states (spec §6 `State()`/`StateChanges`).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WrapperState {
    Starting,
    Running,
    Draining,
    Stopped,
    Errored,
}

impl std::fmt::Display for WrapperState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            WrapperState::Starting => "Starting",
            WrapperState::Running => "Running",
            WrapperState::Draining => "Draining",
            WrapperState::Stopped => "Stopped",
            WrapperState::Errored => "Errored",
        };
        f.write_str(s)
    }
}

/// Owns a bound socket, its timeouts, and an atomically swappable dispatch handler. Binding
/// happens in [`HttpServerWrapper::run`], not at construction, so a wrapper can be built and
/// handed to the fleet manager before its task is spawned.
pub struct HttpServerWrapper {
    listener_id: ListenerId,
    address: SocketAddr,
    read_timeout: Duration,
    write_timeout: Duration,
    idle_timeout: Duration,
    drain_timeout: Duration,
    handler: ArcSwap<DispatchHandler>,
    state: tokio::sync::watch::Sender<WrapperState>,
}

impl HttpServerWrapper {
    pub fn new(config: &ListenerConfig, handler: DispatchHandler) -> Self {
        let (state, _) = tokio::sync::watch::channel(WrapperState::Starting);
        Self {
            listener_id: config.id.clone(),
            address: config.address,
            read_timeout: config.read_timeout,
            write_timeout: config.write_timeout,
            idle_timeout: config.idle_timeout,
            drain_timeout: config.drain_timeout,
            handler: ArcSwap::from_pointee(handler),
            state,
        }
    }

    pub fn listener_id(&self) -> &ListenerId {
        &self.listener_id
    }

    pub fn address(&self) -> SocketAddr {
        self.address
    }

    pub fn state(&self) -> WrapperState {
        *self.state.borrow()
    }

    pub fn state_changes(&self) -> tokio::sync::watch::Receiver<WrapperState> {
        self.state.subscribe()
    }

    /// Replaces the request dispatch target atomically; in-flight requests continue with
    /// the handler they entered with (spec §4.4). Deliberately the only public way to
    /// change a running wrapper's behavior — there is no reload-with-config operation, so a
    /// caller cannot bypass the saga (spec §9).
    pub fn update_handler(&self, handler: DispatchHandler) {
        self.handler.store(Arc::new(handler));
    }

    /// Binds the socket. Split out from `run` so a caller (the fleet manager) can observe a
    /// bind failure synchronously before committing the wrapper to its listener set, rather
    /// than discovering it only after spawning the serve task.
    pub async fn bind(&self) -> Result<TcpListener, WrapperError> {
        TcpListener::bind(self.address)
            .await
            .map_err(|source| WrapperError::Bind {
                addr: self.address,
                source,
            })
    }

    /// Serves connections until `ctx` is cancelled, then drains bounded by `drain_timeout`.
    pub async fn run(&self, ctx: CancellationToken) -> Result<(), WrapperError> {
        let listener = self.bind().await?;
        self.run_with_listener(listener, ctx).await
    }

    /// As [`Self::run`], but against an already-bound listener.
    pub async fn run_with_listener(
        &self,
        listener: TcpListener,
        ctx: CancellationToken,
    ) -> Result<(), WrapperError> {
        let _ = self.state.send(WrapperState::Running);

        let mut connections = JoinSet::new();
        loop {
            tokio::select! {
                _ = ctx.cancelled() => break,
                accepted = listener.accept() => {
                    match accepted {
                        Ok((stream, peer_addr)) => {
                            let handler = self.handler.load_full();
                            let request_timeout = self.read_timeout + self.write_timeout;
                            let idle_timeout = self.idle_timeout;
                            connections.spawn(async move {
                                serve_connection(stream, peer_addr, handler, request_timeout, idle_timeout).await;
                            });
                        }
                        Err(e) => {
                            tracing::warn!(listener_id = %self.listener_id, error = %e, "accept failed");
                        }
                    }
                }
            }
        }

        let _ = self.state.send(WrapperState::Draining);
        let drained = tokio::time::timeout(self.drain_timeout, async {
            while connections.join_next().await.is_some() {}
        })
        .await;

        match drained {
            Ok(()) => {
                let _ = self.state.send(WrapperState::Stopped);
                Ok(())
            }
            Err(_) => {
                let _ = self.state.send(WrapperState::Errored);
                Err(WrapperError::DrainTimeout(self.listener_id.clone()))
            }
        }
    }
}

/// Serves one accepted connection. `request_timeout` (`read_timeout + write_timeout`) bounds
/// each individual request's dispatch; `idle_timeout` bounds the connection as a whole,
/// mirroring the teacher's `TimeoutService` — a single `Duration` wrapped around the inner
/// unit of work — generalized here to two timeout scopes instead of one (spec §4.4: read,
/// write, and idle are distinct advisory floors).
async fn serve_connection(
    stream: tokio::net::TcpStream,
    peer_addr: SocketAddr,
    handler: Arc<DispatchHandler>,
    request_timeout: Duration,
    idle_timeout: Duration,
) {
    let io = TokioIo::new(stream);
    let svc = hyper::service::service_fn(move |req| {
        let handler = handler.clone();
        async move {
            let resp = match tokio::time::timeout(request_timeout, handler.dispatch(peer_addr, req)).await {
                Ok(resp) => resp,
                Err(_) => {
                    tracing::warn!(%peer_addr, "request exceeded read/write timeout");
                    super::service::text_response(
                        http::StatusCode::INTERNAL_SERVER_ERROR,
                        "internal server error",
                    )
                }
            };
            Ok::<_, std::convert::Infallible>(resp)
        }
    });
    let serve = ConnBuilder::new(hyper_util::rt::TokioExecutor::new()).serve_connection(io, svc);
    match tokio::time::timeout(idle_timeout, serve).await {
        Ok(Ok(())) => {}
        Ok(Err(e)) => tracing::debug!(%peer_addr, error = %e, "connection closed with error"),
        Err(_) => tracing::debug!(%peer_addr, "connection exceeded idle_timeout, dropping"),
    }
}
