//! Local preview server for documents open in an editor workspace.
//!
//! A run builds a [`session::Session`] for the active document, binds an HTTP
//! listener through [`lifecycle::ServerLifecycle`] and answers every request
//! with [`router::SessionRouter`]: live editor text, instrumented HTML,
//! rendered markdown, or files streamed from disk and remote hosts.

pub mod cache;
pub mod config;
pub mod error;
pub mod exchange;
pub mod fetch;
pub mod http;
pub mod lifecycle;
pub mod locator;
pub mod preview;
pub mod router;
pub mod serializer;
pub mod session;
pub mod store;
pub mod transform;
pub mod workspace;

pub use error::{PreviewError, Result};
pub use preview::{Collaborators, Preview, RunOptions, RunOutcome};
