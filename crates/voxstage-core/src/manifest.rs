//! Process-wide cache of the asset manifest.

use std::collections::HashMap;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tokio::sync::OnceCell;
use tracing::{info, warn};

use crate::error::{VoxError, VoxResult};
use crate::source::AssetSource;

/// Storage directory name -> relative file paths that directory requires
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Manifest {
    entries: HashMap<String, Vec<String>>,
}

impl Manifest {
    /// Decode a manifest from its JSON representation
    pub fn from_json(bytes: &[u8]) -> VoxResult<Self> {
        serde_json::from_slice(bytes)
            .map_err(|e| VoxError::manifest_unavailable(format!("Malformed manifest: {e}")))
    }

    /// Files required for `directory`, in manifest order
    #[must_use]
    pub fn files_for(&self, directory: &str) -> Option<&[String]> {
        self.entries.get(directory).map(Vec::as_slice)
    }

    /// Directory names listed in the manifest, sorted
    #[must_use]
    pub fn directories(&self) -> Vec<&str> {
        let mut dirs: Vec<&str> = self.entries.keys().map(String::as_str).collect();
        dirs.sort_unstable();
        dirs
    }

    /// Number of directories
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether the manifest lists no directories
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl FromIterator<(String, Vec<String>)> for Manifest {
    fn from_iter<I: IntoIterator<Item = (String, Vec<String>)>>(iter: I) -> Self {
        Self {
            entries: iter.into_iter().collect(),
        }
    }
}

/// Loads the manifest once and hands out the cached copy afterwards.
///
/// Only a successful load is cached; after a failure the next caller
/// fetches again.
pub struct ManifestStore {
    source: Arc<dyn AssetSource>,
    path: String,
    cache: OnceCell<Arc<Manifest>>,
}

impl std::fmt::Debug for ManifestStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ManifestStore")
            .field("path", &self.path)
            .field("loaded", &self.cache.initialized())
            .finish_non_exhaustive()
    }
}

impl ManifestStore {
    /// Create a store that reads `path` from `source`
    pub fn new<S: Into<String>>(source: Arc<dyn AssetSource>, path: S) -> Self {
        Self {
            source,
            path: path.into(),
            cache: OnceCell::new(),
        }
    }

    /// Return the manifest, fetching it on first use
    pub async fn load(&self) -> VoxResult<Arc<Manifest>> {
        self.cache
            .get_or_try_init(|| self.fetch())
            .await
            .map(Arc::clone)
    }

    /// Whether a manifest has been cached
    #[must_use]
    pub fn is_loaded(&self) -> bool {
        self.cache.initialized()
    }

    async fn fetch(&self) -> VoxResult<Arc<Manifest>> {
        let location = self.source.describe(&self.path);
        let bytes = self.source.fetch(&self.path).await.map_err(|e| {
            warn!(%location, error = %e, "manifest fetch failed");
            VoxError::manifest_unavailable(format!("Unable to load model manifest: {e}"))
        })?;

        let manifest = Manifest::from_json(&bytes)?;
        info!(%location, directories = manifest.len(), "loaded model manifest");
        Ok(Arc::new(manifest))
    }
}
