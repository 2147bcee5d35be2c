//! Asset staging: makes a model's files present in the sandboxed staging root.
//!
//! Each model id moves `unmounted -> mounting -> mounted` at most once per
//! successful staging run. Concurrent `mount` calls for the same id share one
//! staging task; a failed run puts the id back to `unmounted` so the next
//! call starts over.

use std::collections::HashMap;
use std::path::{Component, Path, PathBuf};
use std::sync::Arc;
use std::time::Instant;

use futures_util::future::{self, BoxFuture, FutureExt, Shared};
use futures_util::stream::{self, StreamExt, TryStreamExt};
use parking_lot::Mutex;
use tracing::{debug, info, warn};

use crate::catalog::{ModelCatalog, ModelDefinition};
use crate::error::{VoxError, VoxResult};
use crate::manifest::ManifestStore;
use crate::source::AssetSource;

/// Directory under the staging root that holds every mounted model
pub const MODELS_DIR: &str = "models";

/// Observable mount state of a model
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MountState {
    /// Nothing staged yet, or the last attempt failed
    Unmounted,
    /// A staging run is in flight
    Mounting,
    /// All files are present
    Mounted,
}

type MountFuture = Shared<BoxFuture<'static, VoxResult<()>>>;

enum Slot {
    Mounting(MountFuture),
    Mounted,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Transfer {
    Written,
    Skipped,
}

/// Stages model assets into the sandboxed filesystem.
///
/// Cheap to clone; all clones share the same mount state.
#[derive(Clone)]
pub struct AssetStager {
    inner: Arc<StagerInner>,
}

struct StagerInner {
    catalog: Arc<ModelCatalog>,
    manifest: Arc<ManifestStore>,
    source: Arc<dyn AssetSource>,
    root: PathBuf,
    max_concurrent_transfers: usize,
    states: Mutex<HashMap<String, Slot>>,
}

impl std::fmt::Debug for AssetStager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AssetStager")
            .field("root", &self.inner.root)
            .field("max_concurrent_transfers", &self.inner.max_concurrent_transfers)
            .finish_non_exhaustive()
    }
}

impl AssetStager {
    /// Create a stager writing below `root`
    pub fn new(
        catalog: Arc<ModelCatalog>,
        manifest: Arc<ManifestStore>,
        source: Arc<dyn AssetSource>,
        root: PathBuf,
        max_concurrent_transfers: usize,
    ) -> Self {
        Self {
            inner: Arc::new(StagerInner {
                catalog,
                manifest,
                source,
                root,
                max_concurrent_transfers: max_concurrent_transfers.max(1),
                states: Mutex::new(HashMap::new()),
            }),
        }
    }

    /// Make `model_id` and all of its dependencies present on disk
    pub async fn mount(&self, model_id: &str) -> VoxResult<()> {
        self.inner.mount(model_id.to_string()).await
    }

    /// Current mount state of `model_id`
    #[must_use]
    pub fn mount_state(&self, model_id: &str) -> MountState {
        match self.inner.states.lock().get(model_id) {
            Some(Slot::Mounted) => MountState::Mounted,
            Some(Slot::Mounting(_)) => MountState::Mounting,
            None => MountState::Unmounted,
        }
    }

    /// Whether `model_id` has been fully staged
    #[must_use]
    pub fn is_mounted(&self, model_id: &str) -> bool {
        self.mount_state(model_id) == MountState::Mounted
    }

    /// Sandboxed root directory
    #[must_use]
    pub fn root(&self) -> &Path {
        &self.inner.root
    }

    /// Directory a model's files are staged into
    #[must_use]
    pub fn model_dir(&self, model: &ModelDefinition) -> PathBuf {
        self.inner.root.join(MODELS_DIR).join(&model.dir)
    }

    /// Catalog this stager resolves model ids against
    #[must_use]
    pub fn catalog(&self) -> &Arc<ModelCatalog> {
        &self.inner.catalog
    }
}

impl StagerInner {
    fn mount(self: &Arc<Self>, model_id: String) -> BoxFuture<'static, VoxResult<()>> {
        if self.catalog.definition(&model_id).is_none() {
            return future::ready(Err(VoxError::model_not_found(model_id))).boxed();
        }

        let mut states = self.states.lock();
        match states.get(&model_id) {
            Some(Slot::Mounted) => return future::ready(Ok(())).boxed(),
            Some(Slot::Mounting(inflight)) => {
                debug!(%model_id, "joining in-flight mount");
                return inflight.clone().boxed();
            }
            None => {}
        }

        // Run the staging on its own task so it completes even if every
        // waiter goes away.
        let inner = Arc::clone(self);
        let id = model_id.clone();
        let task = tokio::spawn(async move {
            let result = inner.stage(&id).await;
            let mut states = inner.states.lock();
            if result.is_ok() {
                states.insert(id, Slot::Mounted);
            } else {
                states.remove(&id);
            }
            result
        });

        let shared = async move { task.await.unwrap_or_else(|e| Err(VoxError::from(e))) }
            .boxed()
            .shared();
        states.insert(model_id, Slot::Mounting(shared.clone()));
        shared.boxed()
    }

    async fn stage(self: &Arc<Self>, model_id: &str) -> VoxResult<()> {
        let model = self
            .catalog
            .definition(model_id)
            .cloned()
            .ok_or_else(|| VoxError::model_not_found(model_id))?;

        // Siblings may stage concurrently; all of them finish before any of
        // this model's own files are fetched.
        if !model.dependencies.is_empty() {
            debug!(model_id, dependencies = ?model.dependencies, "mounting dependencies");
            future::try_join_all(model.dependencies.iter().map(|dep| self.mount(dep.clone())))
                .await?;
        }

        let manifest = self.manifest.load().await?;
        let files = manifest
            .files_for(&model.dir)
            .ok_or_else(|| VoxError::manifest_entry_missing(&model.dir))?
            .to_vec();

        let base = self.root.join(MODELS_DIR).join(&model.dir);
        tokio::fs::create_dir_all(&base).await.map_err(|e| {
            VoxError::staging(format!("Failed to create directory {}: {e}", base.display()))
        })?;

        let started = Instant::now();
        info!(
            model_id,
            kind = %model.kind,
            files = files.len(),
            limit = self.max_concurrent_transfers,
            "staging model assets"
        );

        let transfers: Vec<_> = files
            .iter()
            .map(|relative| self.transfer(&model, &base, relative))
            .collect();
        let written = stream::iter(transfers)
            .buffer_unordered(self.max_concurrent_transfers)
            .try_fold(0usize, |count, transfer| {
                future::ready(Ok(count + usize::from(transfer == Transfer::Written)))
            })
            .await
            .map_err(|e| {
                warn!(model_id, error = %e, "staging failed");
                e
            })?;

        info!(
            model_id,
            written,
            skipped = files.len() - written,
            elapsed_ms = started.elapsed().as_millis() as u64,
            "model mounted"
        );
        Ok(())
    }

    async fn transfer(
        &self,
        model: &ModelDefinition,
        base: &Path,
        relative: &str,
    ) -> VoxResult<Transfer> {
        let target = base.join(sandboxed_relative_path(relative)?);
        if tokio::fs::try_exists(&target).await.unwrap_or(false) {
            return Ok(Transfer::Skipped);
        }

        if let Some(parent) = target.parent() {
            tokio::fs::create_dir_all(parent).await.map_err(|e| {
                VoxError::staging(format!("Failed to create directory {}: {e}", parent.display()))
            })?;
        }

        let source_path = model.source_path(relative);
        let bytes = self.source.fetch(&source_path).await.map_err(|e| {
            VoxError::staging(format!(
                "Failed to fetch {}: {e}",
                self.source.describe(&source_path)
            ))
        })?;

        write_file(&target, &bytes).await?;
        debug!(path = %target.display(), bytes = bytes.len(), "staged file");
        Ok(Transfer::Written)
    }
}

/// Validate a manifest path and turn it into a path that stays below its base
fn sandboxed_relative_path(relative: &str) -> VoxResult<PathBuf> {
    let mut clean = PathBuf::new();
    for component in Path::new(relative).components() {
        match component {
            Component::Normal(part) => clean.push(part),
            Component::CurDir => {}
            _ => {
                return Err(VoxError::staging(format!(
                    "Refusing to stage '{relative}' outside the model directory"
                )))
            }
        }
    }

    if clean.as_os_str().is_empty() {
        return Err(VoxError::staging(format!("Invalid asset path '{relative}'")));
    }
    Ok(clean)
}

/// Write through a temporary sibling and rename it into place, so a
/// half-written file never appears under the final name.
async fn write_file(target: &Path, bytes: &[u8]) -> VoxResult<()> {
    let file_name = target
        .file_name()
        .map(|name| name.to_string_lossy().into_owned())
        .unwrap_or_default();
    let temp = target.with_file_name(format!(".{file_name}.{}.part", uuid::Uuid::new_v4()));

    if let Err(e) = tokio::fs::write(&temp, bytes).await {
        let _ = tokio::fs::remove_file(&temp).await;
        return Err(VoxError::staging(format!(
            "Failed to write {}: {e}",
            target.display()
        )));
    }

    if let Err(e) = tokio::fs::rename(&temp, target).await {
        let _ = tokio::fs::remove_file(&temp).await;
        // Another writer got there first.
        if tokio::fs::try_exists(target).await.unwrap_or(false) {
            return Ok(());
        }
        return Err(VoxError::staging(format!(
            "Failed to write {}: {e}",
            target.display()
        )));
    }

    Ok(())
}
