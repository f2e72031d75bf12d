use sha2::{Digest, Sha256};
use std::path::{Path, PathBuf};

use super::fetcher::{FetchError, Fetcher};
use crate::util::atomic_write;

/// Development helper: serves each URL from a disk cache after the first
/// successful fetch, so template work does not hit real sources every cycle.
///
/// Cache entries never expire. Delete the directory to start over.
#[derive(Debug, Clone)]
pub struct CachingFetcher<F> {
    inner: F,
    dir: PathBuf,
}

impl<F: Fetcher> CachingFetcher<F> {
    pub fn new(inner: F, dir: impl Into<PathBuf>) -> Self {
        Self {
            inner,
            dir: dir.into(),
        }
    }

    /// Where the response for `url` is (or would be) stored.
    pub fn cache_path(&self, url: &str) -> PathBuf {
        let hash = Sha256::digest(url.as_bytes());
        self.dir.join(format!("{:x}.xml", hash))
    }

    fn io_error(url: &str, source: std::io::Error) -> FetchError {
        FetchError::Io {
            url: url.to_owned(),
            source,
        }
    }

    async fn read_cached(path: &Path) -> Option<Vec<u8>> {
        tokio::fs::read(path).await.ok()
    }
}

impl<F: Fetcher> Fetcher for CachingFetcher<F> {
    fn is_cached(&self, url: &str) -> bool {
        self.cache_path(url).is_file()
    }

    async fn fetch(&self, url: &str) -> Result<Vec<u8>, FetchError> {
        let path = self.cache_path(url);
        if let Some(bytes) = Self::read_cached(&path).await {
            tracing::debug!(url = %url, path = %path.display(), "Serving feed from cache");
            return Ok(bytes);
        }

        tracing::debug!(url = %url, "Cache miss, fetching");
        let bytes = self.inner.fetch(url).await?;

        tokio::fs::create_dir_all(&self.dir)
            .await
            .map_err(|e| Self::io_error(url, e))?;
        atomic_write(&path, &bytes).map_err(|e| Self::io_error(url, e))?;
        Ok(bytes)
    }
}
