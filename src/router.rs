use std::sync::Arc;

use async_trait::async_trait;
use futures::FutureExt;
use tracing::{debug, warn};

use crate::{
    config::{ConsoleEngine, Paths, Settings},
    error::PreviewError,
    exchange::{PreviewRequest, Reply, RequestHandler, RequestId, ResponseSink},
    locator::{extname, Locator},
    serializer::SendSerializer,
    session::Session,
    store::{lookup_mime, ContentStore},
    transform::{inject_bridge, render_console_page, render_markdown, ConsoleParams},
    workspace::{Document, DocumentMode, Workspace},
};

const MIME_JS: &str = "application/javascript";
const MIME_CSS: &str = "text/css";
const MIME_HTML: &str = "text/html";
const DEFAULT_MARKDOWN_STYLE: &str = "img {max-width: 100%;}";

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ContentKind {
    Html,
    Markdown,
    Script,
    Other,
}

const CONTENT_KINDS: &[(&str, ContentKind)] = &[
    ("html", ContentKind::Html),
    ("htm", ContentKind::Html),
    ("md", ContentKind::Markdown),
    ("js", ContentKind::Script),
    ("mjs", ContentKind::Script),
];

impl ContentKind {
    pub fn from_extension(ext: Option<&str>) -> Self {
        ext.and_then(|ext| {
            CONTENT_KINDS
                .iter()
                .find(|(known, _)| *known == ext)
                .map(|(_, kind)| *kind)
        })
        .unwrap_or(ContentKind::Other)
    }
}

/// Where the answer to a request comes from.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Route {
    /// Ready-made body; no content type means HTML.
    Text {
        body: String,
        content_type: Option<String>,
    },
    /// Live HTML from the editor, instrumented before sending.
    LiveHtml { text: String },
    /// Stored HTML read as text and instrumented.
    StoredHtml { locator: Locator },
    StoredText {
        locator: Locator,
        content_type: String,
    },
    /// Delivered by path through the send serializer.
    Stream { locator: Locator },
    NotFound,
}

impl Route {
    pub fn label(&self) -> &'static str {
        match self {
            Route::Text { .. } => "text",
            Route::LiveHtml { .. } => "live-html",
            Route::StoredHtml { .. } => "stored-html",
            Route::StoredText { .. } => "stored-text",
            Route::Stream { .. } => "stream",
            Route::NotFound => "not-found",
        }
    }

    fn text(body: impl Into<String>, content_type: Option<&str>) -> Self {
        Route::Text {
            body: body.into(),
            content_type: content_type.map(str::to_string),
        }
    }
}

/// Request path relative to the session root. `/` and directory paths map to
/// their `index.html`; paths escaping the root are rejected.
pub fn normalize_path(path: &str) -> Option<String> {
    let raw = path.strip_prefix('/').unwrap_or(path);
    let decoded = urlencoding::decode(raw).ok()?.into_owned();
    if decoded.split(['/', '\\']).any(|seg| seg == "..") {
        return None;
    }
    if decoded.is_empty() || decoded.ends_with('/') {
        return Some(format!("{decoded}index.html"));
    }
    Some(decoded)
}

pub struct SessionRouter {
    session: Arc<Session>,
    settings: Arc<Settings>,
    paths: Paths,
    workspace: Arc<dyn Workspace>,
    store: Arc<ContentStore>,
    sends: Arc<SendSerializer>,
}

impl SessionRouter {
    pub fn new(
        session: Arc<Session>,
        settings: Arc<Settings>,
        paths: Paths,
        workspace: Arc<dyn Workspace>,
        store: Arc<ContentStore>,
        sends: Arc<SendSerializer>,
    ) -> Self {
        Self {
            session,
            settings,
            paths,
            workspace,
            store,
            sends,
        }
    }

    pub fn session(&self) -> &Arc<Session> {
        &self.session
    }

    fn active_document(&self) -> Option<Document> {
        let id = self.session.document.as_deref()?;
        self.workspace.document(id)
    }

    pub fn route(&self, path: &str) -> Route {
        let Some(req) = normalize_path(path) else {
            return Route::NotFound;
        };
        let session = &self.session;

        if req == session.console_script {
            let script = if session.is_console() || self.settings.console == ConsoleEngine::Legacy
            {
                self.paths.legacy_console_script()
            } else {
                self.paths.eruda_script()
            };
            return Route::StoredText {
                locator: Locator::from_path(&script),
                content_type: MIME_JS.to_string(),
            };
        }

        if req == session.executing_script {
            let body = match session.extension.as_deref() {
                Some("js") => self.active_document().map(|d| d.text).unwrap_or_default(),
                _ => String::new(),
            };
            return Route::text(body, Some(MIME_JS));
        }

        if req == session.markdown_style {
            return match &self.settings.markdown_style {
                Some(style) => Route::StoredText {
                    locator: Locator::new(style.clone()),
                    content_type: MIME_CSS.to_string(),
                },
                None => Route::text(DEFAULT_MARKDOWN_STYLE, Some(MIME_CSS)),
            };
        }

        self.route_by_kind(&req)
    }

    fn route_by_kind(&self, req: &str) -> Route {
        let session = &self.session;
        if session.is_console() {
            match req {
                "console.html" => {
                    let page = render_console_page(&ConsoleParams {
                        console_script: &session.console_script,
                        executing_script: &session.executing_script,
                    });
                    return Route::text(page, Some(MIME_HTML));
                }
                "favicon.ico" => return self.favicon(),
                _ => {}
            }
        }

        let active = self.active_document();
        if let Some(doc) = active.as_ref().filter(|d| d.mode == DocumentMode::Single) {
            if doc.filename == req {
                return Route::text(doc.text.clone(), lookup_mime(&doc.filename).as_deref());
            }
            return Route::NotFound;
        }

        let (locator, live) = match &session.base {
            Some(base) => {
                let locator = base.join(req);
                let live = self.workspace.file_by_uri(&locator);
                (Some(locator), live)
            }
            None => match active {
                Some(doc) if doc.uri.is_none() => (None, Some(doc)),
                Some(doc) => (doc.uri, None),
                None => (None, None),
            },
        };

        match ContentKind::from_extension(extname(req).as_deref()) {
            ContentKind::Html => match (live, locator) {
                (Some(doc), _) => Route::LiveHtml { text: doc.text },
                (None, Some(locator)) => Route::StoredHtml { locator },
                (None, None) => Route::NotFound,
            },
            ContentKind::Markdown => match live {
                Some(doc) => Route::text(
                    render_markdown(&doc.text, &session.filename, &session.markdown_style),
                    Some(MIME_HTML),
                ),
                None => Route::NotFound,
            },
            ContentKind::Script => match (live, locator) {
                (Some(doc), _) if doc.unsaved => Route::text(doc.text, Some(MIME_JS)),
                (_, Some(locator)) => Route::Stream { locator },
                (_, None) => Route::NotFound,
            },
            ContentKind::Other => match (live, locator) {
                (Some(doc), _) if doc.unsaved => {
                    Route::text(doc.text, lookup_mime(&doc.filename).as_deref())
                }
                (_, Some(_)) if req == "favicon.ico" => self.favicon(),
                (_, Some(locator)) => Route::Stream { locator },
                (_, None) => Route::NotFound,
            },
        }
    }

    fn favicon(&self) -> Route {
        Route::Stream {
            locator: Locator::from_path(&self.paths.favicon()),
        }
    }

    fn instrument(&self, page: &str) -> String {
        inject_bridge(
            page,
            &self.session.bridge_params(self.settings.show_console_toggler),
        )
    }

    async fn stored_text(&self, locator: &Locator) -> Option<String> {
        match self.store.read_text(locator).await {
            Ok(text) => Some(text),
            Err(PreviewError::NotFound) => None,
            Err(e) => {
                warn!(%locator, error = %e, "unable to read file");
                None
            }
        }
    }

    /// Sends the reply for `route`. Stream routes are queued on the send
    /// serializer and answered when their turn comes.
    pub async fn respond(&self, route: Route, id: RequestId, sink: Arc<dyn ResponseSink>) {
        let reply = match route {
            Route::Text { body, content_type } => Reply::text(body, content_type.as_deref()),
            Route::LiveHtml { text } => Reply::text(self.instrument(&text), Some(MIME_HTML)),
            Route::StoredHtml { locator } => match self.stored_text(&locator).await {
                Some(text) => Reply::text(self.instrument(&text), Some(MIME_HTML)),
                None => Reply::NotFound,
            },
            Route::StoredText {
                locator,
                content_type,
            } => match self.stored_text(&locator).await {
                Some(text) => Reply::text(text, Some(&content_type)),
                None => Reply::NotFound,
            },
            Route::Stream { locator } => {
                let store = Arc::clone(&self.store);
                self.sends.enqueue(
                    async move {
                        let reply = store.stream(&locator).await;
                        sink.send(id, reply);
                    }
                    .boxed(),
                );
                return;
            }
            Route::NotFound => Reply::NotFound,
        };
        sink.send(id, reply);
    }
}

#[async_trait]
impl RequestHandler for SessionRouter {
    async fn handle(&self, request: PreviewRequest, sink: Arc<dyn ResponseSink>) {
        let route = self.route(&request.path);
        debug!(id = %request.id, path = %request.path, route = route.label(), "routed request");
        self.respond(route, request.id, sink).await;
    }
}
