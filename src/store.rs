use std::{path::PathBuf, sync::Arc};

use tracing::warn;

use crate::{
    cache::RemoteCache,
    error::{PreviewError, Result},
    exchange::Reply,
    fetch::Fetcher,
    locator::Locator,
};

/// MIME type for a file name, if the extension is known.
pub fn lookup_mime(name: &str) -> Option<String> {
    mime_guess::from_path(name).first().map(|m| m.to_string())
}

/// Byte-level access to stored content: text reads go straight through the
/// fetcher, deliveries by path go through the remote cache.
pub struct ContentStore {
    fetcher: Arc<dyn Fetcher>,
    cache: RemoteCache,
}

impl ContentStore {
    pub fn new(fetcher: Arc<dyn Fetcher>, cache: RemoteCache) -> Self {
        Self { fetcher, cache }
    }

    /// Reads a stored file as text; a missing file is `NotFound`.
    pub async fn read_text(&self, locator: &Locator) -> Result<String> {
        if !self.fetcher.exists(locator).await? {
            return Err(PreviewError::NotFound);
        }
        self.fetcher.read_text(locator).await
    }

    pub async fn materialize(&self, locator: &Locator) -> Result<PathBuf> {
        self.cache.materialize(locator).await
    }

    /// Reply that streams `locator` from a local path. The content type comes
    /// from the locator, since cached copies carry no extension.
    pub async fn stream(&self, locator: &Locator) -> Reply {
        match self.materialize(locator).await {
            Ok(path) => Reply::File {
                path,
                content_type: lookup_mime(locator.basename())
                    .unwrap_or_else(|| "application/octet-stream".to_string()),
            },
            Err(e) => {
                warn!(%locator, error = %e, "unable to deliver file");
                Reply::NotFound
            }
        }
    }
}
