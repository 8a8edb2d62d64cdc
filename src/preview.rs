use std::sync::Arc;

use tracing::info;

use crate::{
    cache::RemoteCache,
    config::{Paths, PreviewTarget, Settings},
    error::Result,
    fetch::{ContentResolver, Fetcher, NoContentResolver, StandardFetcher},
    http::{AxumBinder, Binder},
    lifecycle::{InAppOptions, LifecycleState, Presenter, ServerLifecycle, SystemPresenter},
    locator::Locator,
    router::SessionRouter,
    serializer::SendSerializer,
    session::Session,
    store::ContentStore,
    workspace::Workspace,
};

#[derive(Clone, Copy, Debug, Default)]
pub struct RunOptions {
    /// Open the debug console instead of the active document.
    pub console: bool,
    /// Overrides the configured preview mode.
    pub target: Option<PreviewTarget>,
    /// Preview exactly the active file, without folder `index.html` promotion.
    pub run_file: bool,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum RunOutcome {
    Serving { url: String, port: u16 },
    /// A separately configured preview server already serves the project.
    DelegatedToPreview { url: String },
    /// No active document, or one that cannot be previewed.
    NotRunnable,
}

/// Host services the preview server depends on.
pub struct Collaborators {
    pub workspace: Arc<dyn Workspace>,
    pub fetcher: Arc<dyn Fetcher>,
    pub resolver: Arc<dyn ContentResolver>,
    pub binder: Arc<dyn Binder>,
    pub presenter: Arc<dyn Presenter>,
}

impl Collaborators {
    pub fn system(workspace: Arc<dyn Workspace>) -> Self {
        Self {
            workspace,
            fetcher: Arc::new(StandardFetcher::new()),
            resolver: Arc::new(NoContentResolver),
            binder: Arc::new(AxumBinder::new()),
            presenter: Arc::new(SystemPresenter),
        }
    }
}

pub struct Preview {
    settings: Arc<Settings>,
    paths: Paths,
    workspace: Arc<dyn Workspace>,
    fetcher: Arc<dyn Fetcher>,
    store: Arc<ContentStore>,
    sends: Arc<SendSerializer>,
    lifecycle: ServerLifecycle,
    session: Option<Arc<Session>>,
}

impl Preview {
    pub fn new(settings: Settings, paths: Paths, parts: Collaborators) -> Self {
        let cache = RemoteCache::new(
            paths.cache_dir.clone(),
            parts.fetcher.clone(),
            parts.resolver,
        )
        .bypass(settings.disable_cache);
        let store = Arc::new(ContentStore::new(parts.fetcher.clone(), cache));
        let lifecycle = ServerLifecycle::new(parts.binder, parts.presenter, &settings);
        Self {
            sends: SendSerializer::new(settings.send_order),
            settings: Arc::new(settings),
            paths,
            workspace: parts.workspace,
            fetcher: parts.fetcher,
            store,
            lifecycle,
            session: None,
        }
    }

    pub fn session(&self) -> Option<&Arc<Session>> {
        self.session.as_ref()
    }

    pub fn state(&self) -> LifecycleState {
        self.lifecycle.state()
    }

    /// Starts (or replaces) the preview session for the active document.
    pub async fn run(&mut self, opts: RunOptions) -> Result<RunOutcome> {
        let settings = Arc::clone(&self.settings);

        if !opts.console && !opts.run_file && settings.server_port != settings.preview_port {
            let url = format!("http://{}:{}", settings.host, settings.preview_port);
            let presenter = self.lifecycle.presenter();
            match settings.preview_mode {
                PreviewTarget::Browser => presenter.open_in_browser(&url),
                PreviewTarget::InApp => presenter.open_in_app(
                    &url,
                    InAppOptions {
                        title: String::new(),
                        show_console_toggle: false,
                        disable_cache: settings.disable_cache,
                    },
                    Box::new(|| {}),
                ),
            }
            info!(%url, "delegating to the running preview server");
            return Ok(RunOutcome::DelegatedToPreview { url });
        }

        let active = if opts.console {
            None
        } else {
            match self.workspace.active_file() {
                Some(doc) if self.workspace.can_run(&doc) => Some(doc),
                _ => return Ok(RunOutcome::NotRunnable),
            }
        };

        let target = opts.target.unwrap_or(settings.preview_mode);
        let mut session = Session::new(active.as_ref(), target, settings.server_port);

        if let Some(doc) = &active {
            if !opts.run_file && session.filename != "index.html" && session.base.is_some() {
                if let Some(folder) = doc.uri.as_ref().and_then(|u| self.workspace.folder_for(u)) {
                    if self.fetcher.exists(&folder.join("index.html")).await? {
                        session.filename = "index.html".to_string();
                        session.extension = Some("html".to_string());
                        session.base = Some(folder);
                    }
                }
            }
        }

        if opts.console || session.extension.as_deref() == Some("js") {
            session.enter_console(Locator::from_path(&self.paths.console_www()), !opts.console);
        }

        // The previous session ends here even if no port can be bound.
        self.session = None;
        let session = Arc::new(session);
        let router = Arc::new(SessionRouter::new(
            session.clone(),
            settings,
            self.paths.clone(),
            self.workspace.clone(),
            self.store.clone(),
            self.sends.clone(),
        ));
        let port = self.lifecycle.start(session.clone(), router).await?;
        let url = format!(
            "http://localhost:{port}/{}",
            urlencoding::encode(&session.filename)
        );
        info!(session = %session.id, %url, mode = ?session.mode, "preview session started");
        self.session = Some(session);
        Ok(RunOutcome::Serving { url, port })
    }

    pub async fn stop(&mut self) {
        self.lifecycle.stop().await;
        self.session = None;
    }
}
