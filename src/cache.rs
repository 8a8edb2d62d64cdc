use std::{collections::HashMap, path::PathBuf, sync::Arc};

use tokio::sync::Mutex;
use tracing::debug;

use crate::{
    error::{PreviewError, Result},
    fetch::{ContentResolver, Fetcher},
    locator::{Locator, Scheme},
};

/// Cache key and file name for a locator. Stable across runs; collisions are
/// not guarded against.
pub fn locator_hash(locator: &Locator) -> String {
    format!("{:x}", md5::compute(locator.as_str()))
}

/// Gives every locator a local path that can be streamed from disk, fetching
/// and persisting non-local resources on first use.
pub struct RemoteCache {
    cache_dir: PathBuf,
    fetcher: Arc<dyn Fetcher>,
    resolver: Arc<dyn ContentResolver>,
    bypass: bool,
    entries: Mutex<HashMap<String, PathBuf>>,
}

impl RemoteCache {
    pub fn new(
        cache_dir: impl Into<PathBuf>,
        fetcher: Arc<dyn Fetcher>,
        resolver: Arc<dyn ContentResolver>,
    ) -> Self {
        Self {
            cache_dir: cache_dir.into(),
            fetcher,
            resolver,
            bypass: false,
            entries: Mutex::new(HashMap::new()),
        }
    }

    /// Re-fetch on every access instead of reusing earlier copies.
    pub fn bypass(mut self, bypass: bool) -> Self {
        self.bypass = bypass;
        self
    }

    pub async fn materialize(&self, locator: &Locator) -> Result<PathBuf> {
        match locator.scheme() {
            Scheme::Local => locator
                .to_file_path()
                .ok_or_else(|| PreviewError::Fetch(format!("bad file locator: {locator}"))),
            Scheme::Content => self.resolver.resolve(locator).await,
            Scheme::Transfer(proto) => {
                let key = format!("{}{}", proto.to_ascii_lowercase(), locator_hash(locator));
                self.cached(locator, key).await
            }
            Scheme::Other(_) => self.cached(locator, locator_hash(locator)).await,
        }
    }

    pub async fn entry_count(&self) -> usize {
        self.entries.lock().await.len()
    }

    /// The bytes of this read always replace whatever an earlier process left
    /// at the cache path.
    async fn cached(&self, locator: &Locator, key: String) -> Result<PathBuf> {
        if !self.bypass {
            if let Some(path) = self.entries.lock().await.get(&key) {
                return Ok(path.clone());
            }
        }

        let bytes = self.fetcher.read(locator).await?;
        let path = self.cache_dir.join(&key);
        tokio::fs::create_dir_all(&self.cache_dir)
            .await
            .map_err(PreviewError::fetch)?;
        tokio::fs::write(&path, &bytes)
            .await
            .map_err(|e| PreviewError::Fetch(format!("{}: {e}", path.display())))?;
        debug!(%locator, path = %path.display(), "cached remote resource");

        self.entries.lock().await.insert(key, path.clone());
        Ok(path)
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};

    use async_trait::async_trait;

    use super::*;
    use crate::fetch::{CallbackResolver, NoContentResolver};

    struct CountingFetcher {
        reads: AtomicUsize,
        fail: bool,
    }

    impl CountingFetcher {
        fn new() -> Arc<Self> {
            Arc::new(Self {
                reads: AtomicUsize::new(0),
                fail: false,
            })
        }

        fn reads(&self) -> usize {
            self.reads.load(Ordering::SeqCst)
        }
    }

    #[async_trait]
    impl Fetcher for CountingFetcher {
        async fn exists(&self, _locator: &Locator) -> Result<bool> {
            Ok(!self.fail)
        }

        async fn read(&self, locator: &Locator) -> Result<Vec<u8>> {
            let n = self.reads.fetch_add(1, Ordering::SeqCst) + 1;
            if self.fail {
                return Err(PreviewError::Fetch("connection refused".to_string()));
            }
            Ok(format!("{locator}#{n}").into_bytes())
        }
    }

    fn cache(dir: &std::path::Path, fetcher: Arc<CountingFetcher>) -> RemoteCache {
        RemoteCache::new(dir.join("cache"), fetcher, Arc::new(NoContentResolver))
    }

    #[test]
    fn hash_is_stable() {
        let loc = Locator::from("https://example.com/a.css");
        assert_eq!(locator_hash(&loc), locator_hash(&loc.clone()));
        assert_eq!(locator_hash(&loc).len(), 32);
        assert_ne!(locator_hash(&loc), locator_hash(&Locator::from("https://example.com/b.css")));
    }

    #[tokio::test]
    async fn materialize_is_idempotent_and_fetches_once() {
        let dir = tempfile::tempdir().unwrap();
        let fetcher = CountingFetcher::new();
        let cache = cache(dir.path(), fetcher.clone());
        let loc = Locator::from("https://example.com/app.js");

        let first = cache.materialize(&loc).await.unwrap();
        let second = cache.materialize(&loc).await.unwrap();
        assert_eq!(first, second);
        assert_eq!(fetcher.reads(), 1);
        assert_eq!(first, dir.path().join("cache").join(locator_hash(&loc)));
        assert_eq!(
            tokio::fs::read_to_string(&first).await.unwrap(),
            "https://example.com/app.js#1"
        );
    }

    #[tokio::test]
    async fn bypass_refetches_and_overwrites() {
        let dir = tempfile::tempdir().unwrap();
        let fetcher = CountingFetcher::new();
        let cache = cache(dir.path(), fetcher.clone()).bypass(true);
        let loc = Locator::from("https://example.com/app.js");

        let first = cache.materialize(&loc).await.unwrap();
        let second = cache.materialize(&loc).await.unwrap();
        assert_eq!(first, second);
        assert_eq!(fetcher.reads(), 2);
        assert_eq!(
            tokio::fs::read_to_string(&second).await.unwrap(),
            "https://example.com/app.js#2"
        );
    }

    #[tokio::test]
    async fn transfer_protocols_are_prefixed_with_their_scheme() {
        let dir = tempfile::tempdir().unwrap();
        let fetcher = CountingFetcher::new();
        let cache = cache(dir.path(), fetcher.clone());
        let loc = Locator::from("SFTP://host/www/logo.png");

        let path = cache.materialize(&loc).await.unwrap();
        let name = path.file_name().unwrap().to_string_lossy().to_string();
        assert_eq!(name, format!("sftp{}", locator_hash(&loc)));
        assert!(tokio::fs::try_exists(&path).await.unwrap());
    }

    #[tokio::test]
    async fn stale_transfer_copy_is_replaced_by_fresh_bytes() {
        let dir = tempfile::tempdir().unwrap();
        let loc = Locator::from("ftp://host/a.txt");
        let cache_dir = dir.path().join("cache");
        tokio::fs::create_dir_all(&cache_dir).await.unwrap();
        let stale = cache_dir.join(format!("ftp{}", locator_hash(&loc)));
        tokio::fs::write(&stale, "stale from last run").await.unwrap();

        let fetcher = CountingFetcher::new();
        let cache = cache(dir.path(), fetcher.clone());
        let path = cache.materialize(&loc).await.unwrap();
        assert_eq!(path, stale);
        assert_eq!(fetcher.reads(), 1);
        assert_eq!(
            tokio::fs::read_to_string(&path).await.unwrap(),
            "ftp://host/a.txt#1"
        );
    }

    #[tokio::test]
    async fn local_locators_pass_through() {
        let dir = tempfile::tempdir().unwrap();
        let fetcher = CountingFetcher::new();
        let cache = cache(dir.path(), fetcher.clone());

        let path = cache
            .materialize(&Locator::from("file:///srv/site/a.png"))
            .await
            .unwrap();
        assert_eq!(path, PathBuf::from("/srv/site/a.png"));
        assert_eq!(fetcher.reads(), 0);
        assert_eq!(cache.entry_count().await, 0);
    }

    #[tokio::test]
    async fn content_handles_use_the_resolver() {
        let dir = tempfile::tempdir().unwrap();
        let resolver = CallbackResolver::new(|_, reply| {
            let _ = reply.send(Ok(PathBuf::from("/storage/emulated/0/a.png")));
        });
        let cache = RemoteCache::new(dir.path(), CountingFetcher::new(), Arc::new(resolver));
        let path = cache
            .materialize(&Locator::from("content://provider/a"))
            .await
            .unwrap();
        assert_eq!(path, PathBuf::from("/storage/emulated/0/a.png"));
    }

    #[tokio::test]
    async fn failed_fetch_is_not_cached() {
        let dir = tempfile::tempdir().unwrap();
        let fetcher = Arc::new(CountingFetcher {
            reads: AtomicUsize::new(0),
            fail: true,
        });
        let cache = cache(dir.path(), fetcher.clone());
        let loc = Locator::from("https://example.com/down.js");

        assert!(matches!(
            cache.materialize(&loc).await,
            Err(PreviewError::Fetch(_))
        ));
        assert!(cache.materialize(&loc).await.is_err());
        assert_eq!(fetcher.reads(), 2);
        assert_eq!(cache.entry_count().await, 0);
    }
}
