use std::sync::{RwLock, RwLockReadGuard, RwLockWriteGuard};

use crate::locator::Locator;

const RUNNABLE_EXTENSIONS: &[&str] = &["html", "htm", "md", "js", "svg"];

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum DocumentMode {
    /// Regular editor tab, possibly inside an open folder.
    Editor,
    /// Opened on its own; only its own filename may be served.
    Single,
}

/// Snapshot of an editor document. `text` is the live buffer, not the disk copy.
#[derive(Clone, Debug)]
pub struct Document {
    pub id: String,
    pub filename: String,
    pub location: Option<Locator>,
    pub uri: Option<Locator>,
    pub text: String,
    pub unsaved: bool,
    pub mode: DocumentMode,
}

impl Document {
    pub fn new(id: impl Into<String>, filename: impl Into<String>, text: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            filename: filename.into(),
            location: None,
            uri: None,
            text: text.into(),
            unsaved: false,
            mode: DocumentMode::Editor,
        }
    }

    pub fn with_uri(mut self, uri: impl Into<Locator>) -> Self {
        self.uri = Some(uri.into());
        self
    }

    pub fn with_location(mut self, location: impl Into<Locator>) -> Self {
        self.location = Some(location.into());
        self
    }

    pub fn unsaved(mut self) -> Self {
        self.unsaved = true;
        self
    }

    pub fn single(mut self) -> Self {
        self.mode = DocumentMode::Single;
        self
    }

    pub fn extension(&self) -> Option<String> {
        crate::locator::extname(&self.filename)
    }
}

/// The host editor's view of open documents and folders.
pub trait Workspace: Send + Sync {
    fn active_file(&self) -> Option<Document>;

    fn document(&self, id: &str) -> Option<Document>;

    fn file_by_uri(&self, uri: &Locator) -> Option<Document>;

    /// Root of the open folder containing `uri`, if any.
    fn folder_for(&self, uri: &Locator) -> Option<Locator>;

    fn can_run(&self, doc: &Document) -> bool {
        if doc
            .extension()
            .is_some_and(|ext| RUNNABLE_EXTENSIONS.contains(&ext.as_str()))
        {
            return true;
        }
        doc.uri.as_ref().is_some_and(|uri| self.folder_for(uri).is_some())
    }
}

#[derive(Default)]
struct Inner {
    docs: Vec<Document>,
    active: Option<String>,
    folders: Vec<Locator>,
}

/// In-process workspace used by the command line front end and tests.
#[derive(Default)]
pub struct MemoryWorkspace {
    inner: RwLock<Inner>,
}

impl MemoryWorkspace {
    pub fn new() -> Self {
        Self::default()
    }

    fn read(&self) -> RwLockReadGuard<'_, Inner> {
        self.inner.read().unwrap_or_else(|e| e.into_inner())
    }

    fn write(&self) -> RwLockWriteGuard<'_, Inner> {
        self.inner.write().unwrap_or_else(|e| e.into_inner())
    }

    /// Adds or replaces a document and makes it the active one.
    pub fn open(&self, doc: Document) {
        let mut inner = self.write();
        let id = doc.id.clone();
        inner.docs.retain(|d| d.id != id);
        inner.docs.push(doc);
        inner.active = Some(id);
    }

    pub fn set_active(&self, id: &str) -> bool {
        let mut inner = self.write();
        if inner.docs.iter().any(|d| d.id == id) {
            inner.active = Some(id.to_string());
            return true;
        }
        false
    }

    pub fn close(&self, id: &str) {
        let mut inner = self.write();
        inner.docs.retain(|d| d.id != id);
        if inner.active.as_deref() == Some(id) {
            inner.active = inner.docs.last().map(|d| d.id.clone());
        }
    }

    /// Replaces the live text of a document, as typing in the editor would.
    pub fn edit(&self, id: &str, text: impl Into<String>) -> bool {
        let mut inner = self.write();
        let Some(doc) = inner.docs.iter_mut().find(|d| d.id == id) else {
            return false;
        };
        doc.text = text.into();
        doc.unsaved = true;
        true
    }

    pub fn mark_saved(&self, id: &str) {
        let mut inner = self.write();
        if let Some(doc) = inner.docs.iter_mut().find(|d| d.id == id) {
            doc.unsaved = false;
        }
    }

    pub fn add_folder(&self, root: impl Into<Locator>) {
        let root = root.into();
        let mut inner = self.write();
        if !inner.folders.contains(&root) {
            inner.folders.push(root);
        }
    }
}

impl Workspace for MemoryWorkspace {
    fn active_file(&self) -> Option<Document> {
        let inner = self.read();
        let id = inner.active.as_deref()?;
        inner.docs.iter().find(|d| d.id == id).cloned()
    }

    fn document(&self, id: &str) -> Option<Document> {
        self.read().docs.iter().find(|d| d.id == id).cloned()
    }

    fn file_by_uri(&self, uri: &Locator) -> Option<Document> {
        self.read()
            .docs
            .iter()
            .find(|d| d.uri.as_ref() == Some(uri))
            .cloned()
    }

    fn folder_for(&self, uri: &Locator) -> Option<Locator> {
        let inner = self.read();
        inner
            .folders
            .iter()
            .filter(|root| {
                let root = root.as_str().trim_end_matches('/');
                uri.as_str()
                    .strip_prefix(root)
                    .is_some_and(|rest| rest.starts_with('/'))
            })
            .max_by_key(|root| root.as_str().len())
            .cloned()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn edits_are_visible_through_every_lookup() {
        let ws = MemoryWorkspace::new();
        ws.open(Document::new("a", "index.html", "<p>disk</p>").with_uri("/site/index.html"));
        assert!(ws.edit("a", "<p>typed</p>"));

        let uri = Locator::from("/site/index.html");
        assert_eq!(ws.file_by_uri(&uri).unwrap().text, "<p>typed</p>");
        assert!(ws.active_file().unwrap().unsaved);
        ws.mark_saved("a");
        assert!(!ws.document("a").unwrap().unsaved);
    }

    #[test]
    fn folder_lookup_prefers_the_deepest_root() {
        let ws = MemoryWorkspace::new();
        ws.add_folder("/work");
        ws.add_folder("/work/site/");
        assert_eq!(
            ws.folder_for(&Locator::from("/work/site/js/app.js")).unwrap().as_str(),
            "/work/site/"
        );
        assert!(ws.folder_for(&Locator::from("/workshop/a.html")).is_none());
    }

    #[test]
    fn runnable_documents() {
        let ws = MemoryWorkspace::new();
        ws.add_folder("/site");
        assert!(ws.can_run(&Document::new("1", "notes.md", "")));
        assert!(!ws.can_run(&Document::new("2", "style.css", "")));
        assert!(ws.can_run(&Document::new("3", "style.css", "").with_uri("/site/style.css")));
    }

    #[test]
    fn closing_the_active_document_falls_back() {
        let ws = MemoryWorkspace::new();
        ws.open(Document::new("a", "a.html", ""));
        ws.open(Document::new("b", "b.html", ""));
        ws.close("b");
        assert_eq!(ws.active_file().unwrap().id, "a");
    }
}
