//! User-facing status indicator and active-model status.

use serde::{Deserialize, Serialize};
use tokio::sync::watch;

/// Visual tone of a status message
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StatusTone {
    /// Neutral progress information
    Info,
    /// An operation completed
    Success,
    /// The request was rejected; nothing broke
    Warn,
    /// An operation failed
    Error,
}

/// One status line
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Status {
    /// Tone
    pub tone: StatusTone,
    /// Message text
    pub message: String,
}

impl Status {
    /// Create a status line
    pub fn new<S: Into<String>>(tone: StatusTone, message: S) -> Self {
        Self {
            tone,
            message: message.into(),
        }
    }
}

/// Lifecycle phase of the active model
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ModelPhase {
    /// No switch has been requested yet
    Idle,
    /// A switch is in progress
    Loading,
    /// An engine is active
    Ready,
    /// The last switch failed
    Error,
}

/// Phase plus the label of the model it refers to
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ModelStatus {
    /// Phase
    pub phase: ModelPhase,
    /// Model label, empty while idle
    pub label: String,
}

impl ModelStatus {
    /// Idle status
    #[must_use]
    pub fn idle() -> Self {
        Self {
            phase: ModelPhase::Idle,
            label: String::new(),
        }
    }
}

/// Latest status line and model status, observable through `watch` channels
#[derive(Debug)]
pub struct StatusBoard {
    status: watch::Sender<Status>,
    model: watch::Sender<ModelStatus>,
}

impl Default for StatusBoard {
    fn default() -> Self {
        Self::new()
    }
}

impl StatusBoard {
    /// Create a board showing an idle model and an empty info line
    #[must_use]
    pub fn new() -> Self {
        let (status, _) = watch::channel(Status::new(StatusTone::Info, ""));
        let (model, _) = watch::channel(ModelStatus::idle());
        Self { status, model }
    }

    /// Replace the status line
    pub fn set<S: Into<String>>(&self, tone: StatusTone, message: S) {
        self.status.send_replace(Status::new(tone, message));
    }

    /// Replace the model status
    pub fn set_model<S: Into<String>>(&self, phase: ModelPhase, label: S) {
        self.model.send_replace(ModelStatus {
            phase,
            label: label.into(),
        });
    }

    /// Current status line
    #[must_use]
    pub fn status(&self) -> Status {
        self.status.borrow().clone()
    }

    /// Current model status
    #[must_use]
    pub fn model(&self) -> ModelStatus {
        self.model.borrow().clone()
    }

    /// Receiver notified on every status line change
    #[must_use]
    pub fn subscribe(&self) -> watch::Receiver<Status> {
        self.status.subscribe()
    }

    /// Receiver notified on every model status change
    #[must_use]
    pub fn subscribe_model(&self) -> watch::Receiver<ModelStatus> {
        self.model.subscribe()
    }
}
