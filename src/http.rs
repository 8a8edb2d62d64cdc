use std::{
    collections::HashMap,
    sync::{Arc, Mutex, RwLock},
    time::Duration,
};

use async_trait::async_trait;
use axum::{
    body::Body,
    extract::{Request, State},
    http::{header, StatusCode},
    response::{IntoResponse, Response},
    Router,
};
use mime_guess::mime;
use tokio::{sync::oneshot, task::JoinHandle};
use tower::ServiceExt;
use tower_http::{cors::CorsLayer, services::ServeFile, trace::TraceLayer};
use tracing::{info, warn};

use crate::{
    error::{PreviewError, Result},
    exchange::{Exchange, PreviewRequest, Reply, RequestHandler, NOT_FOUND_BODY},
};

const STOP_GRACE: Duration = Duration::from_secs(5);

/// Request handler of a running listener; swapped when a new session reuses it.
pub type HandlerSlot = Arc<RwLock<Arc<dyn RequestHandler>>>;

#[derive(Clone)]
struct HttpState {
    exchange: Arc<Exchange>,
    handler: HandlerSlot,
}

/// Every path goes to the session handler; there is no routing table.
pub fn http_app(handler: HandlerSlot) -> Router {
    let state = HttpState {
        exchange: Exchange::new(),
        handler,
    };
    Router::new()
        .fallback(serve_request)
        .layer(CorsLayer::very_permissive())
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

async fn serve_request(State(state): State<HttpState>, request: Request) -> Response {
    let pending = state.exchange.register();
    let handler = state
        .handler
        .read()
        .unwrap_or_else(|e| e.into_inner())
        .clone();
    let path = request.uri().path().to_string();
    handler
        .handle(PreviewRequest { id: pending.id, path }, state.exchange.clone())
        .await;
    let reply = pending.reply().await;
    reply_response(reply, request).await
}

fn not_found() -> Response {
    (StatusCode::NOT_FOUND, NOT_FOUND_BODY).into_response()
}

async fn reply_response(reply: Reply, request: Request) -> Response {
    match reply {
        Reply::Text { body, content_type } => {
            ([(header::CONTENT_TYPE, content_type)], body).into_response()
        }
        Reply::File { path, content_type } => {
            let mime = content_type
                .parse::<mime::Mime>()
                .unwrap_or(mime::APPLICATION_OCTET_STREAM);
            match ServeFile::new_with_mime(&path, &mime).oneshot(request).await {
                Ok(res) if res.status() != StatusCode::NOT_FOUND => res.map(Body::new),
                _ => not_found(),
            }
        }
        Reply::NotFound => not_found(),
    }
}

/// A bound listener. Dropping it leaves the server running; call `stop`.
pub struct ListenerHandle {
    port: u16,
    shutdown: Option<oneshot::Sender<()>>,
    task: Option<JoinHandle<()>>,
}

impl ListenerHandle {
    pub fn new(port: u16, shutdown: oneshot::Sender<()>, task: JoinHandle<()>) -> Self {
        Self {
            port,
            shutdown: Some(shutdown),
            task: Some(task),
        }
    }

    pub fn port(&self) -> u16 {
        self.port
    }

    /// Graceful shutdown; connections still open after a grace period are cut.
    pub async fn stop(mut self) {
        if let Some(tx) = self.shutdown.take() {
            let _ = tx.send(());
        }
        if let Some(mut task) = self.task.take() {
            if tokio::time::timeout(STOP_GRACE, &mut task).await.is_err() {
                warn!(port = self.port, "preview server did not drain in time, aborting");
                task.abort();
                let _ = task.await;
            }
        }
    }
}

/// Host bind primitive. Fails with `BindConflict` when the port is still served
/// by one of our own listeners and `BindFailure` for anything else.
#[async_trait]
pub trait Binder: Send + Sync {
    async fn bind(
        &self,
        host: &str,
        port: u16,
        handler: Arc<dyn RequestHandler>,
    ) -> Result<ListenerHandle>;
}

type LiveMap = Arc<Mutex<HashMap<u16, HandlerSlot>>>;

/// Serves the axum app on a tokio `TcpListener`.
#[derive(Clone, Default)]
pub struct AxumBinder {
    live: LiveMap,
}

impl AxumBinder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_live(&self, port: u16) -> bool {
        self.live
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .contains_key(&port)
    }
}

struct LiveEntry {
    live: LiveMap,
    port: u16,
}

impl Drop for LiveEntry {
    fn drop(&mut self) {
        self.live
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .remove(&self.port);
    }
}

#[async_trait]
impl Binder for AxumBinder {
    async fn bind(
        &self,
        host: &str,
        port: u16,
        handler: Arc<dyn RequestHandler>,
    ) -> Result<ListenerHandle> {
        {
            let live = self.live.lock().unwrap_or_else(|e| e.into_inner());
            if let Some(slot) = live.get(&port) {
                *slot.write().unwrap_or_else(|e| e.into_inner()) = handler;
                return Err(PreviewError::BindConflict { port });
            }
        }

        let listener = tokio::net::TcpListener::bind((host, port))
            .await
            .map_err(|source| PreviewError::BindFailure { port, source })?;
        let port = listener
            .local_addr()
            .map_err(|source| PreviewError::BindFailure { port, source })?
            .port();

        let slot: HandlerSlot = Arc::new(RwLock::new(handler));
        self.live
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .insert(port, slot.clone());
        let entry = LiveEntry {
            live: self.live.clone(),
            port,
        };

        let app = http_app(slot);
        let (tx, rx) = oneshot::channel::<()>();
        let task = tokio::spawn(async move {
            let _entry = entry;
            let served = axum::serve(listener, app)
                .with_graceful_shutdown(async move {
                    let _ = rx.await;
                })
                .await;
            if let Err(e) = served {
                warn!(port, error = %e, "preview server stopped with an error");
            }
        });

        info!("listening on http://{host}:{port}");
        Ok(ListenerHandle::new(port, tx, task))
    }
}
