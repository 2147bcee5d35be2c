//! Seam to the embedded synthesis engine and the configuration handed to it.
//!
//! The engine itself is opaque: it is built from an [`EngineConfig`] that
//! points at staged files, reports how many speakers it has, and turns a
//! [`GenerationRequest`] into an [`AudioClip`].

use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::catalog::{ModelDefinition, ModelKind};
use crate::config::EngineSettings;
use crate::error::{VoxError, VoxResult};
use crate::stager::MODELS_DIR;

/// Mono floating-point audio produced by one synthesis call
#[derive(Debug, Clone, PartialEq)]
pub struct AudioClip {
    /// Samples per second
    pub sample_rate: u32,
    /// Normalized samples in [-1, 1]
    pub samples: Vec<f32>,
}

impl AudioClip {
    /// Create a clip
    #[must_use]
    pub fn new(sample_rate: u32, samples: Vec<f32>) -> Self {
        Self {
            sample_rate,
            samples,
        }
    }

    /// Duration in seconds
    #[must_use]
    pub fn duration_secs(&self) -> f32 {
        if self.sample_rate == 0 {
            return 0.0;
        }
        self.samples.len() as f32 / self.sample_rate as f32
    }

    /// Whether the clip has no samples
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }
}

/// One text-to-waveform request
#[derive(Debug, Clone, PartialEq)]
pub struct GenerationRequest {
    /// Text to speak
    pub text: String,
    /// Speaker index inside the model
    pub speaker_id: u32,
    /// Speed multiplier (1.0 = normal)
    pub speed: f32,
}

/// A live engine bound to one staged model
pub trait SynthesisEngine: Send + Sync {
    /// Number of speakers the loaded model provides
    fn num_speakers(&self) -> u32;

    /// Output sample rate
    fn sample_rate(&self) -> u32;

    /// Generate audio for `request`
    ///
    /// # Errors
    ///
    /// Returns an error if the engine fails to produce audio.
    fn generate(&self, request: &GenerationRequest) -> VoxResult<AudioClip>;

    /// Free native resources before the instance is dropped
    ///
    /// # Errors
    ///
    /// Returns an error if the native side reports a failure while freeing.
    fn release(&mut self) -> VoxResult<()> {
        Ok(())
    }
}

/// Builds engine instances from a configuration
pub trait EngineFactory: Send + Sync {
    /// Construct an engine for the staged files referenced by `config`
    ///
    /// # Errors
    ///
    /// Returns an error if the engine cannot be initialized.
    fn create(&self, config: &EngineConfig) -> VoxResult<Box<dyn SynthesisEngine>>;
}

/// VITS model section of the engine configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VitsModelConfig {
    /// Absolute path of the staged model file
    pub model: String,
    /// Lexicon path (unused by Piper voices)
    pub lexicon: String,
    /// Absolute path of the staged tokens file
    pub tokens: String,
    /// Absolute path of the shared data directory, empty when none
    pub data_dir: String,
    /// Noise scale
    pub noise_scale: f32,
    /// Duration noise scale
    pub noise_scale_w: f32,
    /// Length scale
    pub length_scale: f32,
}

/// Model section of the engine configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TtsModelConfig {
    /// VITS model settings
    pub vits: VitsModelConfig,
    /// Engine threads
    pub num_threads: u32,
    /// Verbose engine logging
    pub debug: bool,
    /// Execution provider
    pub provider: String,
}

/// Configuration passed to [`EngineFactory::create`]
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EngineConfig {
    /// Model settings
    pub model: TtsModelConfig,
    /// Text normalization FSTs
    pub rule_fsts: String,
    /// Text normalization FARs
    pub rule_fars: String,
    /// Sentences per engine call
    pub max_num_sentences: u32,
    /// Silence scale between sentences
    pub silence_scale: f32,
}

impl EngineConfig {
    /// Build the configuration for a staged local model
    pub fn for_model(
        model: &ModelDefinition,
        staging_root: &Path,
        settings: &EngineSettings,
    ) -> VoxResult<Self> {
        if model.kind != ModelKind::LocalModel {
            return Err(VoxError::configuration(format!(
                "Model '{}' is {} and cannot back an engine",
                model.id, model.kind
            )));
        }

        let models_root = staging_root.join(MODELS_DIR);
        let base = models_root.join(&model.dir);
        let file = |name: &Option<String>, what: &str| {
            name.as_ref()
                .map(|name| base.join(name).to_string_lossy().into_owned())
                .ok_or_else(|| {
                    VoxError::configuration(format!("Model '{}' has no {what} file", model.id))
                })
        };

        let data_dir = model
            .shared_data_dir
            .as_ref()
            .map(|dir| models_root.join(dir).to_string_lossy().into_owned())
            .unwrap_or_default();

        Ok(Self {
            model: TtsModelConfig {
                vits: VitsModelConfig {
                    model: file(&model.model_file, "model")?,
                    lexicon: String::new(),
                    tokens: file(&model.tokens_file, "tokens")?,
                    data_dir,
                    noise_scale: settings.noise_scale,
                    noise_scale_w: settings.noise_scale_w,
                    length_scale: settings.length_scale,
                },
                num_threads: settings.num_threads,
                debug: false,
                provider: settings.provider.clone(),
            },
            rule_fsts: String::new(),
            rule_fars: String::new(),
            max_num_sentences: settings.max_num_sentences,
            silence_scale: settings.silence_scale,
        })
    }
}
