use std::{
    collections::HashMap,
    fmt,
    path::PathBuf,
    sync::{Arc, Mutex, MutexGuard},
};

use async_trait::async_trait;
use tokio::sync::oneshot;
use tracing::debug;
use uuid::Uuid;

pub const NOT_FOUND_BODY: &str = "File not found!";

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct RequestId(Uuid);

impl RequestId {
    pub fn new() -> Self {
        RequestId(Uuid::new_v4())
    }
}

impl Default for RequestId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for RequestId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

#[derive(Clone, Debug)]
pub struct PreviewRequest {
    pub id: RequestId,
    /// Always starts with `/`.
    pub path: String,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Reply {
    Text { body: String, content_type: String },
    /// Stream the file at `path` from disk.
    File { path: PathBuf, content_type: String },
    NotFound,
}

impl Reply {
    /// Text reply; no content type means HTML.
    pub fn text(body: impl Into<String>, content_type: Option<&str>) -> Self {
        Reply::Text {
            body: body.into(),
            content_type: content_type.unwrap_or("text/html").to_string(),
        }
    }
}

/// Accepts exactly one reply per request id.
pub trait ResponseSink: Send + Sync {
    fn send(&self, id: RequestId, reply: Reply);
}

#[async_trait]
pub trait RequestHandler: Send + Sync {
    /// Must eventually send one reply for `request.id` through `sink`, either
    /// before returning or from work it schedules.
    async fn handle(&self, request: PreviewRequest, sink: Arc<dyn ResponseSink>);
}

/// Pairs request ids with the waiting HTTP handlers.
#[derive(Default)]
pub struct Exchange {
    pending: Mutex<HashMap<RequestId, oneshot::Sender<Reply>>>,
}

impl Exchange {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    fn pending(&self) -> MutexGuard<'_, HashMap<RequestId, oneshot::Sender<Reply>>> {
        self.pending.lock().unwrap_or_else(|e| e.into_inner())
    }

    pub fn register(self: &Arc<Self>) -> Pending {
        let id = RequestId::new();
        let (tx, rx) = oneshot::channel();
        self.pending().insert(id, tx);
        Pending {
            id,
            rx: Some(rx),
            exchange: Arc::clone(self),
        }
    }

    pub fn pending_count(&self) -> usize {
        self.pending().len()
    }
}

impl ResponseSink for Exchange {
    fn send(&self, id: RequestId, reply: Reply) {
        let Some(tx) = self.pending().remove(&id) else {
            debug!(%id, "dropping reply for unknown or already answered request");
            return;
        };
        if tx.send(reply).is_err() {
            debug!(%id, "requester went away before the reply");
        }
    }
}

/// A registered request. Dropping it forgets the id, so a reply that arrives
/// after the client disconnected is discarded.
pub struct Pending {
    pub id: RequestId,
    rx: Option<oneshot::Receiver<Reply>>,
    exchange: Arc<Exchange>,
}

impl Pending {
    /// Waits for the reply. A handler that gives up without replying yields
    /// `NotFound`.
    pub async fn reply(mut self) -> Reply {
        match self.rx.take() {
            Some(rx) => rx.await.unwrap_or(Reply::NotFound),
            None => Reply::NotFound,
        }
    }
}

impl Drop for Pending {
    fn drop(&mut self) {
        self.exchange.pending().remove(&self.id);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn each_request_gets_exactly_one_reply() {
        let exchange = Exchange::new();
        let pending = exchange.register();
        let id = pending.id;

        exchange.send(id, Reply::text("first", None));
        exchange.send(id, Reply::text("second", None));
        assert_eq!(exchange.pending_count(), 0);
        assert_eq!(
            pending.reply().await,
            Reply::Text {
                body: "first".to_string(),
                content_type: "text/html".to_string()
            }
        );
    }

    #[tokio::test]
    async fn dropped_requests_are_forgotten() {
        let exchange = Exchange::new();
        let pending = exchange.register();
        let id = pending.id;
        drop(pending);
        assert_eq!(exchange.pending_count(), 0);
        exchange.send(id, Reply::NotFound);
    }

    #[tokio::test]
    async fn replies_from_other_tasks_are_delivered() {
        let exchange = Exchange::new();
        let pending = exchange.register();
        let id = pending.id;
        let sink: Arc<dyn ResponseSink> = exchange.clone();
        tokio::spawn(async move { sink.send(id, Reply::NotFound) });
        assert_eq!(pending.reply().await, Reply::NotFound);
    }
}
