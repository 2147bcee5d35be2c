//! Asset sources: where the manifest and model files are fetched from.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use reqwest::Client;
use tracing::debug;

use crate::config::StudioConfig;
use crate::error::{VoxError, VoxResult};

/// Read-only store of asset bytes addressed by `/`-separated relative paths
#[async_trait]
pub trait AssetSource: Send + Sync {
    /// Fetch the full contents of `path`
    async fn fetch(&self, path: &str) -> VoxResult<Bytes>;

    /// Human-readable location of `path`, used in log and error messages
    fn describe(&self, path: &str) -> String;
}

/// Fetches assets over HTTP relative to a base URL
#[derive(Debug, Clone)]
pub struct HttpSource {
    client: Client,
    base_url: String,
}

impl HttpSource {
    /// Create a source rooted at `base_url` with a per-request timeout
    pub fn new<S: Into<String>>(base_url: S, timeout: Duration) -> VoxResult<Self> {
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| VoxError::configuration(format!("Failed to build HTTP client: {e}")))?;

        Ok(Self {
            client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
        })
    }

    fn url_for(&self, path: &str) -> String {
        format!("{}/{}", self.base_url, path.trim_start_matches("./").trim_start_matches('/'))
    }
}

#[async_trait]
impl AssetSource for HttpSource {
    async fn fetch(&self, path: &str) -> VoxResult<Bytes> {
        let url = self.url_for(path);
        debug!(%url, "fetching asset");

        let response = self.client.get(&url).send().await?;
        let status = response.status();
        if !status.is_success() {
            return Err(VoxError::network(format!(
                "Failed to fetch {url} ({})",
                status.as_u16()
            )));
        }

        Ok(response.bytes().await?)
    }

    fn describe(&self, path: &str) -> String {
        self.url_for(path)
    }
}

/// Reads assets from a local directory laid out like the web root
#[derive(Debug, Clone)]
pub struct DirSource {
    root: PathBuf,
}

impl DirSource {
    /// Create a source rooted at `root`
    pub fn new<P: Into<PathBuf>>(root: P) -> Self {
        Self { root: root.into() }
    }

    /// Root directory of this source
    #[must_use]
    pub fn root(&self) -> &Path {
        &self.root
    }

    fn path_for(&self, path: &str) -> PathBuf {
        self.root
            .join(path.trim_start_matches("./").trim_start_matches('/'))
    }
}

#[async_trait]
impl AssetSource for DirSource {
    async fn fetch(&self, path: &str) -> VoxResult<Bytes> {
        let full = self.path_for(path);
        let data = tokio::fs::read(&full)
            .await
            .map_err(|e| VoxError::file(format!("Failed to read {}: {e}", full.display())))?;
        Ok(Bytes::from(data))
    }

    fn describe(&self, path: &str) -> String {
        self.path_for(path).display().to_string()
    }
}

/// Build the source described by `config.asset_base`
pub fn source_from_config(config: &StudioConfig) -> VoxResult<Arc<dyn AssetSource>> {
    if config.is_remote() {
        let source = HttpSource::new(
            config.asset_base.clone(),
            Duration::from_secs(config.request_timeout_secs),
        )?;
        Ok(Arc::new(source))
    } else {
        Ok(Arc::new(DirSource::new(&config.asset_base)))
    }
}
