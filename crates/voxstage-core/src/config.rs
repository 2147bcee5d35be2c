//! Runtime configuration for staging and engine construction.

use std::path::{Path, PathBuf};

use directories::ProjectDirs;
use serde::{Deserialize, Serialize};

use crate::error::{VoxError, VoxResult};

/// Environment variable that overrides the staging root
pub const STAGING_DIR_ENV: &str = "VOXSTAGE_STAGING_DIR";

/// Upper bound for concurrent file transfers
pub const MAX_TRANSFER_CONCURRENCY: usize = 64;

/// Numeric synthesis parameters forwarded to the engine configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineSettings {
    /// VITS noise scale
    pub noise_scale: f32,
    /// VITS noise scale for the duration predictor
    pub noise_scale_w: f32,
    /// Length scale (inverse speaking rate)
    pub length_scale: f32,
    /// Threads the engine may use
    pub num_threads: u32,
    /// Execution provider name
    pub provider: String,
    /// Sentences synthesized per engine call
    pub max_num_sentences: u32,
    /// Silence scale between sentences
    pub silence_scale: f32,
}

impl Default for EngineSettings {
    fn default() -> Self {
        Self {
            noise_scale: 0.667,
            noise_scale_w: 0.8,
            length_scale: 1.0,
            num_threads: 1,
            provider: "cpu".to_string(),
            max_num_sentences: 1,
            silence_scale: 0.2,
        }
    }
}

/// Top-level configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct StudioConfig {
    /// Base the asset source resolves relative paths against
    /// (an `http(s)://` URL or a local directory)
    pub asset_base: String,
    /// Location of the manifest relative to `asset_base`
    pub manifest_path: String,
    /// Sandboxed directory the engine reads staged files from
    pub staging_root: PathBuf,
    /// Maximum number of file transfers in flight per mount
    pub max_concurrent_transfers: usize,
    /// Model activated when no voice has been selected yet
    pub default_model_id: String,
    /// Per-request timeout for HTTP transfers
    pub request_timeout_secs: u64,
    /// Engine parameters
    pub engine: EngineSettings,
}

impl Default for StudioConfig {
    fn default() -> Self {
        Self {
            asset_base: ".".to_string(),
            manifest_path: "models/manifest.json".to_string(),
            staging_root: default_staging_root(),
            max_concurrent_transfers: 8,
            default_model_id: crate::catalog::DEFAULT_MODEL_ID.to_string(),
            request_timeout_secs: 60,
            engine: EngineSettings::default(),
        }
    }
}

impl StudioConfig {
    /// Parse a configuration from TOML text; missing keys keep their defaults
    pub fn from_toml_str(text: &str) -> VoxResult<Self> {
        let config: Self = toml::from_str(text)?;
        config.validate()?;
        Ok(config)
    }

    /// Load a configuration file
    pub fn from_file<P: AsRef<Path>>(path: P) -> VoxResult<Self> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path).map_err(|e| {
            VoxError::configuration(format!("Failed to read {}: {e}", path.display()))
        })?;
        Self::from_toml_str(&text)
    }

    /// Set the staging root
    #[must_use]
    pub fn with_staging_root<P: Into<PathBuf>>(mut self, root: P) -> Self {
        self.staging_root = root.into();
        self
    }

    /// Set the asset base
    #[must_use]
    pub fn with_asset_base<S: Into<String>>(mut self, base: S) -> Self {
        self.asset_base = base.into();
        self
    }

    /// Set the transfer concurrency limit
    #[must_use]
    pub const fn with_max_concurrent_transfers(mut self, limit: usize) -> Self {
        self.max_concurrent_transfers = limit;
        self
    }

    /// Whether the asset base points at an HTTP server
    #[must_use]
    pub fn is_remote(&self) -> bool {
        self.asset_base.starts_with("http://") || self.asset_base.starts_with("https://")
    }

    /// Validate configuration values
    pub fn validate(&self) -> VoxResult<()> {
        if self.asset_base.trim().is_empty() {
            return Err(VoxError::configuration("asset_base cannot be empty"));
        }

        if self.manifest_path.trim().is_empty() {
            return Err(VoxError::configuration("manifest_path cannot be empty"));
        }

        if !(1..=MAX_TRANSFER_CONCURRENCY).contains(&self.max_concurrent_transfers) {
            return Err(VoxError::configuration(format!(
                "max_concurrent_transfers must be between 1 and {MAX_TRANSFER_CONCURRENCY}, got {}",
                self.max_concurrent_transfers
            )));
        }

        if self.request_timeout_secs == 0 {
            return Err(VoxError::configuration("request_timeout_secs must be positive"));
        }

        if self.engine.num_threads == 0 {
            return Err(VoxError::configuration("engine.num_threads must be positive"));
        }

        if !(self.engine.length_scale.is_finite() && self.engine.length_scale > 0.0) {
            return Err(VoxError::configuration(format!(
                "engine.length_scale must be positive, got {}",
                self.engine.length_scale
            )));
        }

        Ok(())
    }
}

fn default_staging_root() -> PathBuf {
    if let Some(dir) = std::env::var_os(STAGING_DIR_ENV) {
        return PathBuf::from(dir);
    }

    ProjectDirs::from("ai", "Voxstage", "voxstage").map_or_else(
        || PathBuf::from("./.voxstage/staging"),
        |dirs| dirs.cache_dir().join("staging"),
    )
}
