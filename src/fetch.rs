use std::path::PathBuf;

use async_trait::async_trait;
use tokio::sync::oneshot;

use crate::{
    error::{PreviewError, Result},
    locator::{Locator, Scheme},
};

/// Read access to whatever a locator points at.
#[async_trait]
pub trait Fetcher: Send + Sync {
    async fn exists(&self, locator: &Locator) -> Result<bool>;

    async fn read(&self, locator: &Locator) -> Result<Vec<u8>>;

    async fn read_text(&self, locator: &Locator) -> Result<String> {
        let bytes = self.read(locator).await?;
        Ok(String::from_utf8_lossy(&bytes).into_owned())
    }
}

/// Converts platform `content:` handles into readable local paths.
#[async_trait]
pub trait ContentResolver: Send + Sync {
    async fn resolve(&self, locator: &Locator) -> Result<PathBuf>;
}

/// Local files through `tokio::fs`, `http(s)` through `reqwest`.
#[derive(Clone, Default)]
pub struct StandardFetcher {
    http: reqwest::Client,
}

impl StandardFetcher {
    pub fn new() -> Self {
        Self::default()
    }
}

fn is_http(scheme: &str) -> bool {
    scheme.eq_ignore_ascii_case("http") || scheme.eq_ignore_ascii_case("https")
}

fn local_path(locator: &Locator) -> Result<PathBuf> {
    locator
        .to_file_path()
        .ok_or_else(|| PreviewError::Fetch(format!("not a local path: {locator}")))
}

#[async_trait]
impl Fetcher for StandardFetcher {
    async fn exists(&self, locator: &Locator) -> Result<bool> {
        match locator.scheme() {
            Scheme::Local => {
                let path = local_path(locator)?;
                Ok(tokio::fs::metadata(&path)
                    .await
                    .is_ok_and(|meta| meta.is_file()))
            }
            Scheme::Other(p) if is_http(p) => {
                let resp = self
                    .http
                    .head(locator.as_str())
                    .send()
                    .await
                    .map_err(PreviewError::fetch)?;
                Ok(resp.status().is_success())
            }
            _ => Err(PreviewError::Fetch(format!("unsupported locator: {locator}"))),
        }
    }

    async fn read(&self, locator: &Locator) -> Result<Vec<u8>> {
        match locator.scheme() {
            Scheme::Local => {
                let path = local_path(locator)?;
                tokio::fs::read(&path)
                    .await
                    .map_err(|e| PreviewError::Fetch(format!("{}: {e}", path.display())))
            }
            Scheme::Other(p) if is_http(p) => {
                let resp = self
                    .http
                    .get(locator.as_str())
                    .send()
                    .await
                    .and_then(|r| r.error_for_status())
                    .map_err(PreviewError::fetch)?;
                let bytes = resp.bytes().await.map_err(PreviewError::fetch)?;
                Ok(bytes.to_vec())
            }
            _ => Err(PreviewError::Fetch(format!("unsupported locator: {locator}"))),
        }
    }
}

type Convert = dyn Fn(Locator, oneshot::Sender<Result<PathBuf, String>>) + Send + Sync;

/// Bridges a callback-style host conversion API: the callback receives the
/// handle and a one-shot sender it must answer exactly once.
pub struct CallbackResolver {
    convert: Box<Convert>,
}

impl CallbackResolver {
    pub fn new<F>(convert: F) -> Self
    where
        F: Fn(Locator, oneshot::Sender<Result<PathBuf, String>>) + Send + Sync + 'static,
    {
        Self {
            convert: Box::new(convert),
        }
    }
}

#[async_trait]
impl ContentResolver for CallbackResolver {
    async fn resolve(&self, locator: &Locator) -> Result<PathBuf> {
        let (tx, rx) = oneshot::channel();
        (self.convert)(locator.clone(), tx);
        match rx.await {
            Ok(Ok(path)) => Ok(path),
            Ok(Err(e)) => Err(PreviewError::Fetch(e)),
            Err(_) => Err(PreviewError::Fetch(format!(
                "content resolver dropped {locator}"
            ))),
        }
    }
}

pub struct NoContentResolver;

#[async_trait]
impl ContentResolver for NoContentResolver {
    async fn resolve(&self, locator: &Locator) -> Result<PathBuf> {
        Err(PreviewError::Fetch(format!(
            "no content resolver for {locator}"
        )))
    }
}
