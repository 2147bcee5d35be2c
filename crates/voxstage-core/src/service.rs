//! Request-level facade used by the UI: voice selection, synthesis and
//! status reporting.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use parking_lot::Mutex;
use tokio::sync::watch;
use tracing::{info, warn};

use crate::catalog::{ModelCatalog, VoiceEntry};
use crate::config::StudioConfig;
use crate::coordinator::{ActiveModel, SwitchCoordinator, SwitchOutcome};
use crate::engine::{AudioClip, EngineFactory};
use crate::error::{VoxError, VoxResult};
use crate::manifest::ManifestStore;
use crate::source::AssetSource;
use crate::stager::AssetStager;
use crate::status::{ModelStatus, Status, StatusBoard, StatusTone};
use crate::synthesis::SynthesisRequestHandler;
use crate::wav_writer::encode_wav;

/// Longest text excerpt kept on a rendered clip, in characters
pub const EXCERPT_MAX_CHARS: usize = 140;

/// One synthesized clip, encoded and labelled for display
#[derive(Debug, Clone, PartialEq)]
pub struct RenderedClip {
    /// 1-based position in this session
    pub index: usize,
    /// Distinct download name, `tts-NN.wav`
    pub file_name: String,
    /// Display title
    pub title: String,
    /// Shortened input text
    pub excerpt: String,
    /// Voice the clip was rendered with
    pub voice_key: String,
    /// Decoded samples
    pub audio: AudioClip,
    /// 16-bit PCM WAV bytes
    pub wav: Vec<u8>,
}

/// Everything the UI talks to
pub struct VoiceStudio {
    catalog: Arc<ModelCatalog>,
    stager: AssetStager,
    coordinator: SwitchCoordinator,
    handler: SynthesisRequestHandler,
    board: Arc<StatusBoard>,
    selected: Mutex<Option<String>>,
    clips: AtomicUsize,
}

impl std::fmt::Debug for VoiceStudio {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("VoiceStudio")
            .field("stager", &self.stager)
            .field("selected", &*self.selected.lock())
            .finish_non_exhaustive()
    }
}

impl VoiceStudio {
    /// Wire up the stager, switch worker and synthesis handler.
    ///
    /// Must be called from within a Tokio runtime.
    pub fn new(
        config: &StudioConfig,
        catalog: ModelCatalog,
        source: Arc<dyn AssetSource>,
        factory: Arc<dyn EngineFactory>,
    ) -> VoxResult<Self> {
        config.validate()?;
        if catalog.definition(&config.default_model_id).is_none() {
            return Err(VoxError::configuration(format!(
                "Default model '{}' is not in the catalog",
                config.default_model_id
            )));
        }

        let catalog = Arc::new(catalog);
        let manifest = Arc::new(ManifestStore::new(
            Arc::clone(&source),
            config.manifest_path.clone(),
        ));
        let stager = AssetStager::new(
            Arc::clone(&catalog),
            manifest,
            source,
            config.staging_root.clone(),
            config.max_concurrent_transfers,
        );
        let board = Arc::new(StatusBoard::new());
        let coordinator = SwitchCoordinator::spawn(
            stager.clone(),
            factory,
            config.engine.clone(),
            Arc::clone(&board),
        );
        let handler = SynthesisRequestHandler::new(coordinator.engine_slot());

        let initial = catalog
            .voice_catalog()
            .iter()
            .find(|voice| voice.model_id == config.default_model_id)
            .or_else(|| catalog.voice_catalog().first())
            .map(|voice| voice.key.clone());

        Ok(Self {
            catalog,
            stager,
            coordinator,
            handler,
            board,
            selected: Mutex::new(initial),
            clips: AtomicUsize::new(0),
        })
    }

    /// Activate the model of the selected voice
    pub async fn bootstrap(&self) -> VoxResult<SwitchOutcome> {
        let model_id = self
            .current_voice()
            .map_or_else(|| self.catalog.default_model_id().to_string(), |voice| voice.model_id);
        info!(%model_id, "bootstrapping");
        self.coordinator.switch_to(&model_id).await
    }

    /// Select a voice by key and activate its model
    pub async fn select_voice(&self, key: &str) -> VoxResult<SwitchOutcome> {
        let Some(voice) = self.catalog.voice(key).cloned() else {
            self.board
                .set(StatusTone::Warn, format!("Unknown voice {key}"));
            return Err(VoxError::voice_not_found(key));
        };

        *self.selected.lock() = Some(voice.key.clone());
        self.coordinator.switch_to(&voice.model_id).await
    }

    /// Switch to a language, keeping the selected voice when it speaks that
    /// language and otherwise taking the language's first voice
    pub async fn select_language(&self, language: &str) -> VoxResult<SwitchOutcome> {
        let previous = self.selected.lock().clone();
        let key = self
            .catalog
            .resolve_selection(language, previous.as_deref())
            .map(|voice| voice.key.clone());

        match key {
            Some(key) => self.select_voice(&key).await,
            None => {
                self.board
                    .set(StatusTone::Warn, format!("No voices available for {language}"));
                Err(VoxError::invalid_input(format!(
                    "No voices available for language '{language}'"
                )))
            }
        }
    }

    /// Synthesize `text` with the selected voice, activating its model first
    pub async fn synthesize(&self, text: &str, speed: f32) -> VoxResult<RenderedClip> {
        let text = text.trim();
        if text.is_empty() {
            self.board
                .set(StatusTone::Warn, "Enter something to synthesize first");
            return Err(VoxError::invalid_input("Text cannot be empty"));
        }

        let voice = self.current_voice().ok_or_else(|| {
            self.board.set(StatusTone::Warn, "Select a voice first");
            VoxError::invalid_input("No voice selected")
        })?;

        let outcome = self.coordinator.switch_to(&voice.model_id).await?;
        if voice.speaker_index >= outcome.speaker_count {
            self.board.set(
                StatusTone::Warn,
                format!(
                    "Voice must be between 0 and {}",
                    outcome.speaker_count.saturating_sub(1)
                ),
            );
            return Err(VoxError::speaker_out_of_range(
                voice.speaker_index,
                outcome.speaker_count,
            ));
        }

        self.board.set(
            StatusTone::Info,
            "Generating audio… this usually takes a few seconds",
        );

        let audio = match self.handler.synthesize(text, &voice, speed).await {
            Ok(audio) => audio,
            Err(e) => {
                self.report_synthesis_failure(&e, outcome.speaker_count);
                return Err(e);
            }
        };

        let wav = match encode_wav(&audio.samples, audio.sample_rate) {
            Ok(wav) => wav,
            Err(e) => {
                self.report_synthesis_failure(&e, outcome.speaker_count);
                return Err(e);
            }
        };

        let index = self.clips.fetch_add(1, Ordering::SeqCst) + 1;
        self.board
            .set(StatusTone::Success, "Done! You can synthesize another sentence");

        Ok(RenderedClip {
            index,
            file_name: clip_file_name(index),
            title: clip_title(index, &voice, speed),
            excerpt: excerpt(text),
            voice_key: voice.key,
            audio,
            wav,
        })
    }

    fn report_synthesis_failure(&self, error: &VoxError, speaker_count: u32) {
        match error {
            VoxError::SpeakerOutOfRange { .. } => self.board.set(
                StatusTone::Warn,
                format!(
                    "Voice must be between 0 and {}",
                    speaker_count.saturating_sub(1)
                ),
            ),
            VoxError::InvalidInput { message } => {
                self.board.set(StatusTone::Warn, message.as_str());
            }
            _ => {
                warn!(error = %error, category = error.category(), "synthesis failed");
                self.board
                    .set(StatusTone::Error, "Something went wrong while generating audio");
            }
        }
    }

    /// Phase and label of the active model
    #[must_use]
    pub fn active_model_status(&self) -> ModelStatus {
        self.board.model()
    }

    /// Identity of the installed engine, if any
    pub async fn active_model(&self) -> Option<ActiveModel> {
        self.coordinator.active_model().await
    }

    /// Latest status line
    #[must_use]
    pub fn status(&self) -> Status {
        self.board.status()
    }

    /// Receiver notified on every status line change
    #[must_use]
    pub fn subscribe_status(&self) -> watch::Receiver<Status> {
        self.board.subscribe()
    }

    /// Receiver notified on every model status change
    #[must_use]
    pub fn subscribe_model_status(&self) -> watch::Receiver<ModelStatus> {
        self.board.subscribe_model()
    }

    /// Selected voice
    #[must_use]
    pub fn current_voice(&self) -> Option<VoiceEntry> {
        let selected = self.selected.lock();
        selected
            .as_deref()
            .and_then(|key| self.catalog.voice(key))
            .cloned()
    }

    /// Detail line for the selected voice
    #[must_use]
    pub fn current_voice_details(&self) -> Option<String> {
        self.current_voice()
            .map(|voice| self.catalog.voice_details(&voice))
    }

    /// Distinct languages in the catalog
    #[must_use]
    pub fn languages(&self) -> Vec<&str> {
        self.catalog.languages()
    }

    /// Voices for one language
    #[must_use]
    pub fn voices_for_language(&self, language: &str) -> Vec<&VoiceEntry> {
        self.catalog.voices_for_language(language)
    }

    /// Catalog backing this studio
    #[must_use]
    pub fn catalog(&self) -> &ModelCatalog {
        &self.catalog
    }

    /// Stager backing this studio
    #[must_use]
    pub fn stager(&self) -> &AssetStager {
        &self.stager
    }
}

fn clip_file_name(index: usize) -> String {
    format!("tts-{index:02}.wav")
}

fn clip_title(index: usize, voice: &VoiceEntry, speed: f32) -> String {
    format!("{index:02}. {} ({}) @ {speed:.1}×", voice.name, voice.language)
}

fn excerpt(text: &str) -> String {
    if text.chars().count() > EXCERPT_MAX_CHARS {
        let head: String = text.chars().take(EXCERPT_MAX_CHARS - 3).collect();
        format!("{head}…")
    } else {
        text.to_string()
    }
}
