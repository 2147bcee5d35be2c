//! Static registry of model definitions and the selectable voice catalog.

use std::collections::{HashMap, HashSet};

use once_cell::sync::Lazy;
use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::error::{VoxError, VoxResult};

/// Model activated when nothing else has been selected
pub const DEFAULT_MODEL_ID: &str = "en-gb-cori";

/// Shared espeak-ng data directory every Piper voice reads
const ESPEAK_DATA_DIR: &str = "common/espeak-ng-data";

/// Asset-group kind of a model definition
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ModelKind {
    /// Data shared between models (e.g. espeak-ng phoneme tables)
    SharedData,
    /// A loadable voice model with its own model and tokens files
    LocalModel,
}

impl ModelKind {
    /// Get the kind name as string
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::SharedData => "shared-data",
            Self::LocalModel => "local-model",
        }
    }

    /// Prefix under which the asset source serves this kind's directories
    #[must_use]
    pub const fn source_prefix(self) -> &'static str {
        match self {
            Self::SharedData => "",
            Self::LocalModel => "models/",
        }
    }
}

impl std::fmt::Display for ModelKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Static description of a model's storage location, files and dependencies
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ModelDefinition {
    /// Unique identifier
    pub id: String,
    /// Human-readable label
    pub label: String,
    /// Asset-group kind
    pub kind: ModelKind,
    /// Storage directory name (also the manifest key)
    pub dir: String,
    /// Model file inside `dir`
    pub model_file: Option<String>,
    /// Tokens file inside `dir`
    pub tokens_file: Option<String>,
    /// Shared data directory, relative to the staged `models/` root
    pub shared_data_dir: Option<String>,
    /// Models that must be mounted before this one
    pub dependencies: Vec<String>,
}

impl ModelDefinition {
    /// Define a shared-data asset group
    pub fn shared_data<S: Into<String>>(id: S, dir: S) -> Self {
        let id = id.into();
        Self {
            label: id.clone(),
            id,
            kind: ModelKind::SharedData,
            dir: dir.into(),
            model_file: None,
            tokens_file: None,
            shared_data_dir: None,
            dependencies: Vec::new(),
        }
    }

    /// Define a loadable voice model
    pub fn local<S: Into<String>>(id: S, label: S, dir: S, model_file: S, tokens_file: S) -> Self {
        Self {
            id: id.into(),
            label: label.into(),
            kind: ModelKind::LocalModel,
            dir: dir.into(),
            model_file: Some(model_file.into()),
            tokens_file: Some(tokens_file.into()),
            shared_data_dir: None,
            dependencies: Vec::new(),
        }
    }

    /// Set the shared data directory
    #[must_use]
    pub fn with_shared_data_dir<S: Into<String>>(mut self, dir: S) -> Self {
        self.shared_data_dir = Some(dir.into());
        self
    }

    /// Add a mount dependency
    #[must_use]
    pub fn with_dependency<S: Into<String>>(mut self, id: S) -> Self {
        self.dependencies.push(id.into());
        self
    }

    /// Path on the asset source for a file of this model
    #[must_use]
    pub fn source_path(&self, relative: &str) -> String {
        format!("{}{}/{}", self.kind.source_prefix(), self.dir, relative)
    }

    fn piper(id: &str, label: &str, dir: &str, model_file: &str) -> Self {
        Self::local(id, label, dir, model_file, "tokens.txt")
            .with_shared_data_dir(ESPEAK_DATA_DIR)
            .with_dependency("common")
    }
}

/// Raw voice registry record, normalized into a [`VoiceEntry`]
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VoiceDescriptor {
    /// Model the voice belongs to; the default model when absent
    #[serde(default)]
    pub model_id: Option<String>,
    /// Speaker index inside the model
    pub id: i64,
    /// Display name
    #[serde(default)]
    pub name: Option<String>,
    /// Language display name
    #[serde(default)]
    pub language: Option<String>,
    /// Free-text description
    #[serde(default)]
    pub description: Option<String>,
    /// Documentation link
    #[serde(default, alias = "documentation")]
    pub docs: Option<String>,
    /// Speaker reference in the training dataset
    #[serde(default, alias = "datasetId")]
    pub dataset_speaker: Option<u32>,
}

/// A selectable (model, speaker index) pair
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VoiceEntry {
    /// Uniqueness key, `modelId:speakerIndex`
    pub key: String,
    /// Model the voice belongs to
    pub model_id: String,
    /// Speaker index passed to the engine
    pub speaker_index: u32,
    /// Display name
    pub name: String,
    /// Language display name
    pub language: String,
    /// Free-text description
    pub description: String,
    /// Documentation link
    pub docs: Option<String>,
    /// Speaker reference in the training dataset
    pub dataset_speaker: Option<u32>,
}

/// Build the catalog key for a voice
#[must_use]
pub fn voice_key(model_id: &str, speaker_index: u32) -> String {
    format!("{model_id}:{speaker_index}")
}

static BUILTIN_MODELS: Lazy<Vec<ModelDefinition>> = Lazy::new(|| {
    vec![
        ModelDefinition::shared_data("common", "common"),
        ModelDefinition::piper(
            "sv-lisa",
            "Swedish · Lisa",
            "vits-piper-sv_SE-lisa-medium",
            "sv_SE-lisa-medium.onnx",
        ),
        ModelDefinition::piper(
            "sv-nst",
            "Swedish · NST",
            "vits-piper-sv_SE-nst-medium",
            "sv_SE-nst-medium.onnx",
        ),
        ModelDefinition::piper(
            "en-gb-cori",
            "English (British) · Cori",
            "vits-piper-en_GB-cori-medium",
            "en_GB-cori-medium.onnx",
        ),
        ModelDefinition::piper(
            "en-gb-northern-male",
            "English (British) · Northern Male",
            "vits-piper-en_GB-northern_english_male-medium",
            "en_GB-northern_english_male-medium.onnx",
        ),
        ModelDefinition::piper(
            "en-us-amy",
            "English (American) · Amy",
            "vits-piper-en_US-amy-medium",
            "en_US-amy-medium.onnx",
        ),
    ]
});

fn descriptor(
    model_id: &str,
    name: &str,
    language: &str,
    description: &str,
    docs: &str,
) -> VoiceDescriptor {
    VoiceDescriptor {
        model_id: Some(model_id.to_string()),
        id: 0,
        name: Some(name.to_string()),
        language: Some(language.to_string()),
        description: Some(description.to_string()),
        docs: Some(docs.to_string()),
        dataset_speaker: None,
    }
}

static BUILTIN_VOICES: Lazy<Vec<VoiceDescriptor>> = Lazy::new(|| {
    const DOCS: &str = "https://k2-fsa.github.io/sherpa/onnx/tts/all";
    vec![
        descriptor(
            "sv-lisa",
            "Lisa",
            "Swedish",
            "Official sherpa-onnx VITS voice · recorded by Lisa from the NST dataset",
            &format!("{DOCS}/Swedish/vits-piper-sv_SE-lisa-medium.html"),
        ),
        descriptor(
            "sv-nst",
            "Anders",
            "Swedish",
            "National Library of Sweden voice model (NST collection)",
            &format!("{DOCS}/Swedish/vits-piper-sv_SE-nst-medium.html"),
        ),
        descriptor(
            "en-gb-cori",
            "Cori",
            "English (British)",
            "British English voice model from rhasspy/piper-voices",
            &format!("{DOCS}/English/vits-piper-en_GB-cori-medium.html"),
        ),
        descriptor(
            "en-gb-northern-male",
            "John",
            "English (British)",
            "Northern English male accent voice from rhasspy/piper-voices",
            &format!("{DOCS}/English/vits-piper-en_GB-northern_english_male-medium.html"),
        ),
        descriptor(
            "en-us-amy",
            "Amy",
            "English (American)",
            "American English female voice from rhasspy/piper-voices",
            &format!("{DOCS}/English/vits-piper-en_US-amy-medium.html"),
        ),
    ]
});

/// Validated registry of models and voices
#[derive(Debug, Clone)]
pub struct ModelCatalog {
    models: HashMap<String, ModelDefinition>,
    model_order: Vec<String>,
    voices: Vec<VoiceEntry>,
    default_model_id: String,
}

impl ModelCatalog {
    /// Build and validate a catalog.
    ///
    /// Model definitions must be consistent (known, acyclic dependencies;
    /// local models name their files). Voice descriptors that cannot be
    /// used are dropped with a warning.
    pub fn new(
        models: Vec<ModelDefinition>,
        descriptors: &[VoiceDescriptor],
        default_model_id: &str,
    ) -> VoxResult<Self> {
        let mut by_id = HashMap::with_capacity(models.len());
        let mut model_order = Vec::with_capacity(models.len());
        for model in models {
            if by_id.contains_key(&model.id) {
                return Err(VoxError::configuration(format!(
                    "Duplicate model definition '{}'",
                    model.id
                )));
            }
            model_order.push(model.id.clone());
            by_id.insert(model.id.clone(), model);
        }

        validate_models(&by_id)?;

        match by_id.get(default_model_id) {
            Some(model) if model.kind == ModelKind::LocalModel => {}
            Some(_) => {
                return Err(VoxError::configuration(format!(
                    "Default model '{default_model_id}' is not a loadable voice model"
                )))
            }
            None => {
                return Err(VoxError::configuration(format!(
                    "Default model '{default_model_id}' is not defined"
                )))
            }
        }

        let voices = normalize_voices(&by_id, descriptors, default_model_id);

        Ok(Self {
            models: by_id,
            model_order,
            voices,
            default_model_id: default_model_id.to_string(),
        })
    }

    /// Catalog of the bundled Piper voices
    pub fn builtin() -> VoxResult<Self> {
        Self::new(BUILTIN_MODELS.clone(), &BUILTIN_VOICES, DEFAULT_MODEL_ID)
    }

    /// Bundled models with voices read from a JSON array of descriptors
    pub fn builtin_with_voices_json(json: &[u8], default_model_id: &str) -> VoxResult<Self> {
        let descriptors: Vec<VoiceDescriptor> = serde_json::from_slice(json)
            .map_err(|e| VoxError::configuration(format!("Invalid voice registry: {e}")))?;
        Self::new(BUILTIN_MODELS.clone(), &descriptors, default_model_id)
    }

    /// Look up a model definition
    #[must_use]
    pub fn definition(&self, model_id: &str) -> Option<&ModelDefinition> {
        self.models.get(model_id)
    }

    /// Model definitions in declaration order
    pub fn models(&self) -> impl Iterator<Item = &ModelDefinition> {
        self.model_order.iter().filter_map(|id| self.models.get(id))
    }

    /// Default model identifier
    #[must_use]
    pub fn default_model_id(&self) -> &str {
        &self.default_model_id
    }

    /// All voices in catalog order
    #[must_use]
    pub fn voice_catalog(&self) -> &[VoiceEntry] {
        &self.voices
    }

    /// Look up a voice by key
    #[must_use]
    pub fn voice(&self, key: &str) -> Option<&VoiceEntry> {
        self.voices.iter().find(|voice| voice.key == key)
    }

    /// Distinct languages, sorted
    #[must_use]
    pub fn languages(&self) -> Vec<&str> {
        let mut languages: Vec<&str> = self.voices.iter().map(|v| v.language.as_str()).collect();
        languages.sort_unstable();
        languages.dedup();
        languages
    }

    /// Voices for one language, in catalog order
    #[must_use]
    pub fn voices_for_language(&self, language: &str) -> Vec<&VoiceEntry> {
        self.voices
            .iter()
            .filter(|voice| voice.language == language)
            .collect()
    }

    /// Pick the voice to select after switching to `language`.
    ///
    /// Keeps `previous_key` when it belongs to that language, otherwise the
    /// language's first voice.
    #[must_use]
    pub fn resolve_selection(
        &self,
        language: &str,
        previous_key: Option<&str>,
    ) -> Option<&VoiceEntry> {
        let voices = self.voices_for_language(language);
        previous_key
            .and_then(|key| voices.iter().copied().find(|voice| voice.key == key))
            .or_else(|| voices.first().copied())
    }

    /// One-line description shown next to the voice picker
    #[must_use]
    pub fn voice_details(&self, voice: &VoiceEntry) -> String {
        let mut parts = vec![
            format!("Speaker ID {}", voice.speaker_index),
            self.definition(&voice.model_id)
                .map_or_else(|| voice.language.clone(), |model| model.label.clone()),
        ];

        if let Some(speaker) = voice.dataset_speaker {
            parts.push(format!("Dataset speaker {speaker}"));
        }

        if !voice.description.is_empty() {
            parts.push(voice.description.clone());
        }

        format!("{} · {}", voice.name, parts.join(" · "))
    }
}

fn validate_models(models: &HashMap<String, ModelDefinition>) -> VoxResult<()> {
    for model in models.values() {
        if model.kind == ModelKind::LocalModel
            && (model.model_file.is_none() || model.tokens_file.is_none())
        {
            return Err(VoxError::configuration(format!(
                "Model '{}' must name a model file and a tokens file",
                model.id
            )));
        }

        for dependency in &model.dependencies {
            if !models.contains_key(dependency) {
                return Err(VoxError::configuration(format!(
                    "Model '{}' depends on unknown model '{dependency}'",
                    model.id
                )));
            }
        }
    }

    // Depth-first walk; a node seen again while still on the stack is a cycle.
    fn visit<'a>(
        id: &'a str,
        models: &'a HashMap<String, ModelDefinition>,
        on_stack: &mut HashSet<&'a str>,
        done: &mut HashSet<&'a str>,
    ) -> VoxResult<()> {
        if done.contains(id) {
            return Ok(());
        }
        if !on_stack.insert(id) {
            return Err(VoxError::configuration(format!(
                "Dependency cycle through model '{id}'"
            )));
        }
        if let Some(model) = models.get(id) {
            for dependency in &model.dependencies {
                visit(dependency, models, on_stack, done)?;
            }
        }
        on_stack.remove(id);
        done.insert(id);
        Ok(())
    }

    let mut on_stack = HashSet::new();
    let mut done = HashSet::new();
    for id in models.keys() {
        visit(id, models, &mut on_stack, &mut done)?;
    }
    Ok(())
}

fn normalize_voices(
    models: &HashMap<String, ModelDefinition>,
    descriptors: &[VoiceDescriptor],
    default_model_id: &str,
) -> Vec<VoiceEntry> {
    let mut voices = Vec::with_capacity(descriptors.len());
    let mut seen = HashSet::new();

    for entry in descriptors {
        let model_id = entry.model_id.as_deref().unwrap_or(default_model_id);
        match models.get(model_id) {
            Some(model) if model.kind == ModelKind::LocalModel => {}
            Some(_) => {
                warn!(model_id, "Skipping voice bound to a shared-data model");
                continue;
            }
            None => {
                warn!(model_id, "Skipping voice with unknown modelId");
                continue;
            }
        }

        let Ok(speaker_index) = u32::try_from(entry.id) else {
            warn!(model_id, speaker = entry.id, "Skipping voice with invalid speaker id");
            continue;
        };

        let key = voice_key(model_id, speaker_index);
        if !seen.insert(key.clone()) {
            continue;
        }

        voices.push(VoiceEntry {
            key,
            model_id: model_id.to_string(),
            speaker_index,
            name: entry
                .name
                .clone()
                .unwrap_or_else(|| format!("Voice {speaker_index}")),
            language: entry.language.clone().unwrap_or_else(|| "Unknown".to_string()),
            description: entry.description.clone().unwrap_or_default(),
            docs: entry.docs.clone().filter(|docs| !docs.is_empty()),
            dataset_speaker: entry.dataset_speaker,
        });
    }

    if voices.is_empty() {
        warn!(default_model_id, "Voice catalog is empty, using fallback voice");
        voices.push(VoiceEntry {
            key: voice_key(default_model_id, 0),
            model_id: default_model_id.to_string(),
            speaker_index: 0,
            name: "Voice 0".to_string(),
            language: "English (British)".to_string(),
            description: "Default speaker".to_string(),
            docs: None,
            dataset_speaker: None,
        });
    }

    voices
}
