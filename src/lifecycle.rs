use std::{process::Stdio, sync::Arc};

use tracing::{info, warn};

use crate::{
    config::{PreviewTarget, Settings},
    error::{PreviewError, Result},
    exchange::RequestHandler,
    http::{Binder, ListenerHandle},
    session::Session,
};

#[derive(Clone, Debug)]
pub struct InAppOptions {
    pub title: String,
    pub show_console_toggle: bool,
    pub disable_cache: bool,
}

pub type ExternalBrowserHook = Box<dyn Fn() + Send + Sync>;

/// Where a running preview is shown.
pub trait Presenter: Send + Sync {
    fn open_in_browser(&self, url: &str);

    /// `on_external_browser` is called if the user leaves the embedded view
    /// for an external browser.
    fn open_in_app(&self, url: &str, options: InAppOptions, on_external_browser: ExternalBrowserHook);
}

/// Opens URLs with the platform opener. There is no embedded browser here, so
/// in-app requests are only logged.
pub struct SystemPresenter;

impl SystemPresenter {
    fn opener() -> (&'static str, &'static [&'static str]) {
        if cfg!(target_os = "macos") {
            ("open", &[])
        } else if cfg!(target_os = "windows") {
            ("cmd", &["/C", "start", ""])
        } else {
            ("xdg-open", &[])
        }
    }
}

impl Presenter for SystemPresenter {
    fn open_in_browser(&self, url: &str) {
        let (program, args) = Self::opener();
        let spawned = tokio::process::Command::new(program)
            .args(args)
            .arg(url)
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .spawn();
        match spawned {
            Ok(_) => info!(%url, "opened preview in browser"),
            Err(e) => warn!(%url, error = %e, "unable to launch browser; open the URL manually"),
        }
    }

    fn open_in_app(&self, url: &str, options: InAppOptions, _on_external_browser: ExternalBrowserHook) {
        info!(%url, title = %options.title, "preview ready");
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum LifecycleState {
    Idle,
    Binding { port: u16 },
    Listening { port: u16 },
    Stopped,
}

/// Owns the one preview listener of the process.
pub struct ServerLifecycle {
    binder: Arc<dyn Binder>,
    presenter: Arc<dyn Presenter>,
    host: String,
    max_attempts: u16,
    disable_cache: bool,
    state: LifecycleState,
    listener: Option<ListenerHandle>,
}

impl ServerLifecycle {
    pub fn new(binder: Arc<dyn Binder>, presenter: Arc<dyn Presenter>, settings: &Settings) -> Self {
        Self {
            binder,
            presenter,
            host: settings.host.clone(),
            max_attempts: settings.max_bind_attempts.max(1),
            disable_cache: settings.disable_cache,
            state: LifecycleState::Idle,
            listener: None,
        }
    }

    pub fn state(&self) -> LifecycleState {
        self.state
    }

    pub fn presenter(&self) -> &Arc<dyn Presenter> {
        &self.presenter
    }

    /// Stops any current listener, binds for `session` starting at its port
    /// and presents the result. Busy ports are skipped one at a time, up to the
    /// configured number of attempts.
    pub async fn start(
        &mut self,
        session: Arc<Session>,
        handler: Arc<dyn RequestHandler>,
    ) -> Result<u16> {
        if let Some(previous) = self.listener.take() {
            info!(port = previous.port(), "stopping previous preview server");
            previous.stop().await;
        }

        let first = session.port();
        let mut port = first;
        for attempt in 1..=self.max_attempts {
            self.state = LifecycleState::Binding { port };
            match self.binder.bind(&self.host, port, handler.clone()).await {
                Ok(listener) => {
                    let bound = listener.port();
                    self.listener = Some(listener);
                    return Ok(self.listening(&session, bound));
                }
                Err(PreviewError::BindConflict { .. }) => {
                    info!(port, "preview server already running, reusing it");
                    return Ok(self.listening(&session, port));
                }
                Err(e) => {
                    warn!(port, attempt, error = %e, "bind failed, trying next port");
                    if attempt == self.max_attempts {
                        break;
                    }
                    port = match port.checked_add(1) {
                        Some(next) => next,
                        None => break,
                    };
                }
            }
        }

        self.state = LifecycleState::Stopped;
        Err(PreviewError::BindExhausted { first, last: port })
    }

    fn listening(&mut self, session: &Arc<Session>, port: u16) -> u16 {
        session.set_port(port);
        self.state = LifecycleState::Listening { port };
        self.present(session);
        port
    }

    fn present(&self, session: &Arc<Session>) {
        let url = format!(
            "http://localhost:{}/{}",
            session.port(),
            urlencoding::encode(&session.filename)
        );
        match session.target() {
            PreviewTarget::Browser => self.presenter.open_in_browser(&url),
            PreviewTarget::InApp => {
                let options = InAppOptions {
                    title: session.filename.clone(),
                    show_console_toggle: !session.is_console(),
                    disable_cache: self.disable_cache,
                };
                let promoted = Arc::clone(session);
                self.presenter.open_in_app(
                    &url,
                    options,
                    Box::new(move || promoted.promote_to_browser()),
                );
            }
        }
    }

    pub async fn stop(&mut self) {
        if let Some(listener) = self.listener.take() {
            listener.stop().await;
        }
        self.state = LifecycleState::Stopped;
    }
}
