//! Cached page fetching. Index pages are always fetched live; detail and
//! photos pages may be served from a file cache keyed by a hash of the URL.

use sha2::{Digest, Sha256};
use std::path::{Path, PathBuf};
use tokio::sync::Mutex;
use tokio::time::{Duration, Instant};
use tracing::{debug, warn};

const REQUEST_DELAY: Duration = Duration::from_millis(200);

/// Network and HTTP-level failures. All of them are transient: the caller
/// retries on the next poll cycle and never ledgers the listing.
#[derive(Debug, thiserror::Error)]
pub enum FetchError {
    #[error("http error: {0}")]
    Http(#[from] reqwest::Error),
    #[error("resource unavailable: {0}")]
    Unavailable(String),
}

#[async_trait::async_trait]
pub trait Fetcher: Send + Sync {
    async fn fetch_page(&self, url: &str, use_cache: bool) -> Result<String, FetchError>;
    async fn fetch_bytes(&self, url: &str) -> Result<Vec<u8>, FetchError>;
}

pub struct HttpFetcher {
    client: reqwest::Client,
    cache_dir: PathBuf,
    cache_enabled: bool,
    last_request: Mutex<Option<Instant>>,
}

impl HttpFetcher {
    pub fn new(cache_dir: impl Into<PathBuf>, cache_enabled: bool) -> HttpFetcher {
        HttpFetcher {
            client: reqwest::Client::new(),
            cache_dir: cache_dir.into(),
            cache_enabled,
            last_request: Mutex::new(None),
        }
    }

    fn cache_path(&self, url: &str) -> PathBuf {
        self.cache_dir.join(cache_key(url))
    }

    /// Polite inter-request spacing shared by every caller of this fetcher.
    async fn pace(&self) {
        let mut last_request = self.last_request.lock().await;
        if let Some(last) = *last_request {
            let elapsed = last.elapsed();
            if elapsed < REQUEST_DELAY {
                tokio::time::sleep(REQUEST_DELAY - elapsed).await;
            }
        }
        *last_request = Some(Instant::now());
    }
}

#[async_trait::async_trait]
impl Fetcher for HttpFetcher {
    async fn fetch_page(&self, url: &str, use_cache: bool) -> Result<String, FetchError> {
        let use_cache = use_cache && self.cache_enabled;
        let cache_path = self.cache_path(url);
        if use_cache {
            if let Ok(cached) = tokio::fs::read_to_string(&cache_path).await {
                debug!(%url, "cache hit");
                return Ok(cached);
            }
        }

        self.pace().await;
        debug!(%url, "GET");
        let body = self
            .client
            .get(url)
            .send()
            .await?
            .error_for_status()?
            .text()
            .await?;

        // Failed reads are never cached, only complete bodies.
        if use_cache {
            if let Err(e) = write_cache(&self.cache_dir, &cache_path, &body).await {
                warn!(%url, error = %e, "could not write cache entry");
            }
        }
        Ok(body)
    }

    async fn fetch_bytes(&self, url: &str) -> Result<Vec<u8>, FetchError> {
        self.pace().await;
        debug!(%url, "GET (bytes)");
        let bytes = self
            .client
            .get(url)
            .send()
            .await?
            .error_for_status()?
            .bytes()
            .await?;
        Ok(bytes.to_vec())
    }
}

async fn write_cache(dir: &Path, path: &Path, body: &str) -> std::io::Result<()> {
    tokio::fs::create_dir_all(dir).await?;
    tokio::fs::write(path, body).await
}

fn cache_key(url: &str) -> String {
    let digest = Sha256::digest(url.as_bytes());
    digest.iter().map(|byte| format!("{byte:02x}")).collect()
}
