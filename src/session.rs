use std::sync::{
    atomic::{AtomicU16, Ordering},
    RwLock,
};

use uuid::Uuid;

use crate::{
    config::{PreviewTarget, CONSOLE_PORT},
    locator::Locator,
    transform::BridgeParams,
    workspace::Document,
};

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SessionMode {
    Normal,
    /// Serves the debug console landing page instead of the document.
    Console,
}

/// One run of the preview server against one document or folder.
///
/// Synthetic resource names carry the random session id so they cannot clash
/// with project files of the same base name.
#[derive(Debug)]
pub struct Session {
    pub id: String,
    pub mode: SessionMode,
    target: RwLock<PreviewTarget>,
    port: AtomicU16,
    /// Workspace id of the active document; `None` for a bare console run.
    pub document: Option<String>,
    pub filename: String,
    /// Locator request paths are joined to.
    pub base: Option<Locator>,
    pub extension: Option<String>,
    pub console_script: String,
    pub executing_script: String,
    pub markdown_style: String,
}

impl Session {
    pub fn new(document: Option<&Document>, target: PreviewTarget, port: u16) -> Self {
        let id = Uuid::new_v4().simple().to_string();
        let (filename, base, extension) = match document {
            Some(doc) => {
                let base = doc
                    .location
                    .clone()
                    .or_else(|| doc.uri.as_ref().and_then(Locator::dirname));
                (doc.filename.clone(), base, doc.extension())
            }
            None => (String::new(), None, None),
        };
        Self {
            console_script: format!("{id}_console.js"),
            executing_script: format!("{id}_script.js"),
            markdown_style: format!("{id}_md.css"),
            id,
            mode: SessionMode::Normal,
            target: RwLock::new(target),
            port: AtomicU16::new(port),
            document: document.map(|d| d.id.clone()),
            filename,
            base,
            extension,
        }
    }

    /// Switches to console mode: the console page is served from the bundled
    /// `www` directory and, when a script document started the run, that
    /// document becomes the executing script.
    pub fn enter_console(&mut self, console_www: Locator, from_document: bool) {
        if from_document && self.mode == SessionMode::Normal {
            self.executing_script = self.filename.clone();
        }
        self.mode = SessionMode::Console;
        *self.target.get_mut().unwrap_or_else(|e| e.into_inner()) = PreviewTarget::InApp;
        self.filename = "console.html".to_string();
        self.base = Some(console_www);
        *self.port.get_mut() = CONSOLE_PORT;
    }

    pub fn is_console(&self) -> bool {
        self.mode == SessionMode::Console
    }

    pub fn target(&self) -> PreviewTarget {
        *self.target.read().unwrap_or_else(|e| e.into_inner())
    }

    /// Called when the user leaves the embedded browser for an external one.
    pub fn promote_to_browser(&self) {
        *self.target.write().unwrap_or_else(|e| e.into_inner()) = PreviewTarget::Browser;
    }

    pub fn port(&self) -> u16 {
        self.port.load(Ordering::SeqCst)
    }

    pub(crate) fn set_port(&self, port: u16) {
        self.port.store(port, Ordering::SeqCst);
    }

    pub fn bridge_params(&self, show_console_toggler: bool) -> BridgeParams<'_> {
        BridgeParams {
            token: &self.id,
            console_script: &self.console_script,
            target: self.target(),
            show_console_toggler,
        }
    }
}
