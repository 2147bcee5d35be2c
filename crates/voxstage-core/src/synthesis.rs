//! Runs one synthesis call against the active engine.

use std::time::Instant;

use tracing::{debug, info, warn};

use crate::catalog::VoiceEntry;
use crate::coordinator::EngineSlot;
use crate::engine::{AudioClip, GenerationRequest};
use crate::error::{VoxError, VoxResult};

/// Validates synthesis requests and invokes the active engine.
///
/// Never switches models: the caller activates the voice's model first.
#[derive(Debug, Clone)]
pub struct SynthesisRequestHandler {
    slot: EngineSlot,
}

impl SynthesisRequestHandler {
    /// Create a handler reading the engine from `slot`
    #[must_use]
    pub fn new(slot: EngineSlot) -> Self {
        Self { slot }
    }

    /// Generate audio for `text` with `voice` at `speed`
    ///
    /// # Errors
    ///
    /// - [`VoxError::InvalidInput`] for blank text or a non-positive speed
    /// - [`VoxError::NoActiveModel`] / [`VoxError::ModelNotActive`] when the
    ///   voice's model is not the active one
    /// - [`VoxError::SpeakerOutOfRange`] when the engine lacks the speaker
    /// - [`VoxError::SynthesisError`] when the engine fails
    pub async fn synthesize(
        &self,
        text: &str,
        voice: &VoiceEntry,
        speed: f32,
    ) -> VoxResult<AudioClip> {
        let text = text.trim();
        if text.is_empty() {
            return Err(VoxError::invalid_input("Text cannot be empty"));
        }
        if !(speed.is_finite() && speed > 0.0) {
            return Err(VoxError::invalid_input(format!(
                "Speed must be a positive number, got {speed}"
            )));
        }

        // Held until generation returns so a switch cannot release the engine
        // underneath this call.
        let guard = std::sync::Arc::clone(&self.slot).read_owned().await;
        let active = guard.as_ref().ok_or(VoxError::NoActiveModel)?;

        if active.model.model_id != voice.model_id {
            return Err(VoxError::ModelNotActive {
                requested: voice.model_id.clone(),
                active: active.model.model_id.clone(),
            });
        }

        if voice.speaker_index >= active.model.speaker_count {
            warn!(
                voice = %voice.key,
                speaker_count = active.model.speaker_count,
                "speaker index out of range"
            );
            return Err(VoxError::speaker_out_of_range(
                voice.speaker_index,
                active.model.speaker_count,
            ));
        }

        let request = GenerationRequest {
            text: text.to_string(),
            speaker_id: voice.speaker_index,
            speed,
        };
        debug!(voice = %voice.key, chars = text.chars().count(), speed, "generating audio");

        let started = Instant::now();
        let clip = tokio::task::spawn_blocking(move || {
            let active = guard.as_ref().ok_or(VoxError::NoActiveModel)?;
            active.engine.generate(&request)
        })
        .await?
        .map_err(|e| match e {
            VoxError::SynthesisError { .. } => e,
            other => VoxError::synthesis(other.to_string()),
        })?;

        info!(
            voice = %voice.key,
            samples = clip.samples.len(),
            duration_secs = clip.duration_secs(),
            elapsed_ms = started.elapsed().as_millis() as u64,
            "synthesized audio"
        );
        Ok(clip)
    }
}
