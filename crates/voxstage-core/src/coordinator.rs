//! Model switching: at most one engine instance, switches run one at a time
//! in the order they were requested.
//!
//! Switch requests go into a single queue drained by a worker task. A caller
//! that stops waiting does not cancel its switch; the worker still runs it
//! to completion before taking the next request.

use std::sync::Arc;
use std::time::Instant;

use tokio::sync::{mpsc, oneshot, RwLock};
use tracing::{error, info, warn};

use crate::config::EngineSettings;
use crate::engine::{EngineConfig, EngineFactory, SynthesisEngine};
use crate::error::{VoxError, VoxResult};
use crate::stager::AssetStager;
use crate::status::{ModelPhase, StatusBoard, StatusTone};

/// Identity of the engine currently installed
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ActiveModel {
    /// Model the engine is bound to
    pub model_id: String,
    /// Model label
    pub label: String,
    /// Speakers the engine reported
    pub speaker_count: u32,
    /// Engine output sample rate
    pub sample_rate: u32,
}

/// An installed engine and the model it was built for
pub struct ActiveEngine {
    /// Identity of the installed engine
    pub model: ActiveModel,
    /// The engine itself
    pub engine: Box<dyn SynthesisEngine>,
}

impl std::fmt::Debug for ActiveEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ActiveEngine")
            .field("model", &self.model)
            .finish_non_exhaustive()
    }
}

/// Shared slot holding the active engine.
///
/// Synthesis holds a read guard for the whole call; the switch worker takes
/// the write guard to release or install an engine.
pub type EngineSlot = Arc<RwLock<Option<ActiveEngine>>>;

/// Result of a completed switch
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SwitchOutcome {
    /// Model now active
    pub model_id: String,
    /// Speakers the new engine reported
    pub speaker_count: u32,
}

struct SwitchRequest {
    model_id: String,
    reply: oneshot::Sender<VoxResult<SwitchOutcome>>,
}

/// Handle for requesting model switches. Cheap to clone.
#[derive(Clone)]
pub struct SwitchCoordinator {
    queue: mpsc::UnboundedSender<SwitchRequest>,
    slot: EngineSlot,
}

impl std::fmt::Debug for SwitchCoordinator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SwitchCoordinator").finish_non_exhaustive()
    }
}

impl SwitchCoordinator {
    /// Start the switch worker.
    ///
    /// Must be called from within a Tokio runtime. The worker exits once
    /// every handle has been dropped.
    pub fn spawn(
        stager: AssetStager,
        factory: Arc<dyn EngineFactory>,
        settings: EngineSettings,
        board: Arc<StatusBoard>,
    ) -> Self {
        let (queue, requests) = mpsc::unbounded_channel();
        let slot: EngineSlot = Arc::new(RwLock::new(None));

        let worker = SwitchWorker {
            stager,
            factory,
            settings,
            board,
            slot: Arc::clone(&slot),
        };
        tokio::spawn(worker.run(requests));

        Self { queue, slot }
    }

    /// Make `model_id` the active model, waiting for every earlier switch
    /// request to finish first
    ///
    /// # Errors
    ///
    /// Returns [`VoxError::ModelNotFound`] for unknown ids and
    /// [`VoxError::SwitchError`] when staging or engine construction fails.
    pub async fn switch_to(&self, model_id: &str) -> VoxResult<SwitchOutcome> {
        let (reply, response) = oneshot::channel();
        self.queue
            .send(SwitchRequest {
                model_id: model_id.to_string(),
                reply,
            })
            .map_err(|_| VoxError::concurrency("Switch worker has stopped"))?;

        response
            .await
            .map_err(|_| VoxError::concurrency("Switch worker dropped the request"))?
    }

    /// Identity of the active engine, if any
    pub async fn active_model(&self) -> Option<ActiveModel> {
        self.slot.read().await.as_ref().map(|active| active.model.clone())
    }

    /// Slot synthesis reads the active engine from
    #[must_use]
    pub fn engine_slot(&self) -> EngineSlot {
        Arc::clone(&self.slot)
    }
}

struct SwitchWorker {
    stager: AssetStager,
    factory: Arc<dyn EngineFactory>,
    settings: EngineSettings,
    board: Arc<StatusBoard>,
    slot: EngineSlot,
}

impl SwitchWorker {
    async fn run(self, mut requests: mpsc::UnboundedReceiver<SwitchRequest>) {
        while let Some(request) = requests.recv().await {
            let result = self.switch(&request.model_id).await;
            // The caller may have stopped waiting; the switch still happened.
            let _ = request.reply.send(result);
        }
    }

    async fn switch(&self, model_id: &str) -> VoxResult<SwitchOutcome> {
        let Some(model) = self.stager.catalog().definition(model_id).cloned() else {
            self.board.set_model(ModelPhase::Error, model_id);
            self.board
                .set(StatusTone::Error, format!("Unknown model {model_id}"));
            return Err(VoxError::model_not_found(model_id));
        };

        if let Some(active) = self.slot.read().await.as_ref() {
            if active.model.model_id == model_id {
                return Ok(SwitchOutcome {
                    model_id: model_id.to_string(),
                    speaker_count: active.model.speaker_count,
                });
            }
        }

        let label = model.label.clone();
        self.board.set_model(ModelPhase::Loading, label.as_str());
        self.board.set(StatusTone::Info, format!("Loading {label}…"));
        let started = Instant::now();

        self.release_current().await;

        match self.activate(model_id, &label).await {
            Ok(active) => {
                let outcome = SwitchOutcome {
                    model_id: model_id.to_string(),
                    speaker_count: active.model.speaker_count,
                };
                info!(
                    model_id,
                    speakers = outcome.speaker_count,
                    sample_rate = active.model.sample_rate,
                    elapsed_ms = started.elapsed().as_millis() as u64,
                    "model ready"
                );
                *self.slot.write().await = Some(active);

                self.board.set_model(ModelPhase::Ready, label.as_str());
                self.board.set(
                    StatusTone::Success,
                    format!("{label} ready. Type something and click Synthesize!"),
                );
                Ok(outcome)
            }
            Err(e) => {
                error!(model_id, error = %e, category = e.category(), "model switch failed");
                self.board.set_model(ModelPhase::Error, label.as_str());
                self.board
                    .set(StatusTone::Error, format!("Failed to initialize {label}"));
                Err(VoxError::switch(model_id, e))
            }
        }
    }

    /// Drop the installed engine, waiting for in-flight synthesis to finish
    async fn release_current(&self) {
        let previous = self.slot.write().await.take();
        if let Some(mut previous) = previous {
            if let Err(e) = previous.engine.release() {
                warn!(
                    model_id = %previous.model.model_id,
                    error = %e,
                    "failed to release engine"
                );
            }
            info!(model_id = %previous.model.model_id, "released engine");
        }
    }

    async fn activate(&self, model_id: &str, label: &str) -> VoxResult<ActiveEngine> {
        self.stager.mount(model_id).await?;

        let model = self
            .stager
            .catalog()
            .definition(model_id)
            .ok_or_else(|| VoxError::model_not_found(model_id))?;
        let config = EngineConfig::for_model(model, self.stager.root(), &self.settings)?;

        let factory = Arc::clone(&self.factory);
        let engine = tokio::task::spawn_blocking(move || factory.create(&config)).await??;

        Ok(ActiveEngine {
            model: ActiveModel {
                model_id: model_id.to_string(),
                label: label.to_string(),
                speaker_count: engine.num_speakers(),
                sample_rate: engine.sample_rate(),
            },
            engine,
        })
    }
}
