//! Error types for model staging, switching and synthesis.

/// Result type alias for voxstage operations
pub type VoxResult<T> = Result<T, VoxError>;

/// Main error type for voxstage operations
#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
pub enum VoxError {
    /// The asset manifest could not be retrieved or decoded
    #[error("Model manifest unavailable: {message}")]
    ManifestUnavailable {
        /// Error message describing the failure
        message: String,
    },

    /// The manifest has no entry for a model's storage directory
    #[error("Manifest entry missing for '{directory}'")]
    ManifestEntryMissing {
        /// Storage directory that was looked up
        directory: String,
    },

    /// A file transfer or filesystem operation failed while staging assets
    #[error("Asset staging failed: {message}")]
    AssetStagingError {
        /// Error message describing the staging failure
        message: String,
    },

    /// Switching the active model failed
    #[error("Failed to switch to model '{model_id}': {source}")]
    SwitchError {
        /// Model that was being activated
        model_id: String,
        /// Underlying staging or engine construction failure
        source: Box<VoxError>,
    },

    /// Requested speaker index is not provided by the active engine
    #[error("Speaker {speaker} out of range (engine has {speaker_count} speakers)")]
    SpeakerOutOfRange {
        /// Requested speaker index
        speaker: u32,
        /// Number of speakers reported by the engine
        speaker_count: u32,
    },

    /// The engine failed while generating audio
    #[error("TTS synthesis failed: {message}")]
    SynthesisError {
        /// Error message describing the failure
        message: String,
    },

    /// Model identifier is not part of the catalog
    #[error("Model '{model_id}' not found")]
    ModelNotFound {
        /// The model ID that was not found
        model_id: String,
    },

    /// Voice key is not part of the catalog
    #[error("Voice '{voice_key}' not found")]
    VoiceNotFound {
        /// The voice key that was not found
        voice_key: String,
    },

    /// No engine instance is currently active
    #[error("No active TTS model")]
    NoActiveModel,

    /// The active engine is bound to a different model than requested
    #[error("Model '{requested}' is not active (active model is '{active}')")]
    ModelNotActive {
        /// Model the caller asked for
        requested: String,
        /// Model the engine is bound to
        active: String,
    },

    /// Invalid input error
    #[error("Invalid input: {message}")]
    InvalidInput {
        /// Error message describing the invalid input
        message: String,
    },

    /// Configuration error
    #[error("Configuration error: {message}")]
    ConfigurationError {
        /// Error message describing the configuration issue
        message: String,
    },

    /// File I/O error
    #[error("File I/O error: {message}")]
    FileError {
        /// Error message describing the file operation failure
        message: String,
    },

    /// Network or download error
    #[error("Network error: {message}")]
    NetworkError {
        /// Error message describing the network issue
        message: String,
    },

    /// Thread or task error
    #[error("Concurrency error: {message}")]
    ConcurrencyError {
        /// Error message describing the concurrency issue
        message: String,
    },
}

impl VoxError {
    /// Create a new manifest unavailable error
    #[must_use]
    pub fn manifest_unavailable<S: Into<String>>(message: S) -> Self {
        Self::ManifestUnavailable {
            message: message.into(),
        }
    }

    /// Create a new manifest entry missing error
    #[must_use]
    pub fn manifest_entry_missing<S: Into<String>>(directory: S) -> Self {
        Self::ManifestEntryMissing {
            directory: directory.into(),
        }
    }

    /// Create a new asset staging error
    #[must_use]
    pub fn staging<S: Into<String>>(message: S) -> Self {
        Self::AssetStagingError {
            message: message.into(),
        }
    }

    /// Wrap a failure that happened while switching to `model_id`
    #[must_use]
    pub fn switch<S: Into<String>>(model_id: S, source: Self) -> Self {
        Self::SwitchError {
            model_id: model_id.into(),
            source: Box::new(source),
        }
    }

    /// Create a new speaker out of range error
    #[must_use]
    pub const fn speaker_out_of_range(speaker: u32, speaker_count: u32) -> Self {
        Self::SpeakerOutOfRange {
            speaker,
            speaker_count,
        }
    }

    /// Create a new synthesis error
    #[must_use]
    pub fn synthesis<S: Into<String>>(message: S) -> Self {
        Self::SynthesisError {
            message: message.into(),
        }
    }

    /// Create a new model not found error
    #[must_use]
    pub fn model_not_found<S: Into<String>>(model_id: S) -> Self {
        Self::ModelNotFound {
            model_id: model_id.into(),
        }
    }

    /// Create a new voice not found error
    #[must_use]
    pub fn voice_not_found<S: Into<String>>(voice_key: S) -> Self {
        Self::VoiceNotFound {
            voice_key: voice_key.into(),
        }
    }

    /// Create a new invalid input error
    #[must_use]
    pub fn invalid_input<S: Into<String>>(message: S) -> Self {
        Self::InvalidInput {
            message: message.into(),
        }
    }

    /// Create a new configuration error
    #[must_use]
    pub fn configuration<S: Into<String>>(message: S) -> Self {
        Self::ConfigurationError {
            message: message.into(),
        }
    }

    /// Create a new file error
    #[must_use]
    pub fn file<S: Into<String>>(message: S) -> Self {
        Self::FileError {
            message: message.into(),
        }
    }

    /// Create a new network error
    #[must_use]
    pub fn network<S: Into<String>>(message: S) -> Self {
        Self::NetworkError {
            message: message.into(),
        }
    }

    /// Create a new concurrency error
    #[must_use]
    pub fn concurrency<S: Into<String>>(message: S) -> Self {
        Self::ConcurrencyError {
            message: message.into(),
        }
    }

    /// Check if this error is retriable
    ///
    /// A failed manifest fetch or mount leaves no cached state behind, so
    /// calling the same operation again starts from scratch.
    #[must_use]
    pub fn is_retriable(&self) -> bool {
        match self {
            Self::ManifestUnavailable { .. }
            | Self::AssetStagingError { .. }
            | Self::NetworkError { .. } => true,
            Self::SwitchError { source, .. } => source.is_retriable(),
            _ => false,
        }
    }

    /// Check if this error is due to invalid user input
    #[must_use]
    pub const fn is_user_error(&self) -> bool {
        matches!(
            self,
            Self::InvalidInput { .. }
                | Self::VoiceNotFound { .. }
                | Self::SpeakerOutOfRange { .. }
        )
    }

    /// Get the error category for logging
    #[must_use]
    pub const fn category(&self) -> &'static str {
        match self {
            Self::ManifestUnavailable { .. } | Self::ManifestEntryMissing { .. } => "manifest",
            Self::AssetStagingError { .. } => "staging",
            Self::SwitchError { .. } | Self::NoActiveModel | Self::ModelNotActive { .. } => {
                "switch"
            }
            Self::SpeakerOutOfRange { .. } | Self::InvalidInput { .. } => "input",
            Self::SynthesisError { .. } => "synthesis",
            Self::ModelNotFound { .. } => "model",
            Self::VoiceNotFound { .. } => "voice",
            Self::ConfigurationError { .. } => "configuration",
            Self::FileError { .. } => "file",
            Self::NetworkError { .. } => "network",
            Self::ConcurrencyError { .. } => "concurrency",
        }
    }
}

// Convert from common error types
impl From<std::io::Error> for VoxError {
    fn from(err: std::io::Error) -> Self {
        Self::file(err.to_string())
    }
}

impl From<serde_json::Error> for VoxError {
    fn from(err: serde_json::Error) -> Self {
        Self::file(format!("JSON serialization error: {err}"))
    }
}

impl From<toml::de::Error> for VoxError {
    fn from(err: toml::de::Error) -> Self {
        Self::configuration(format!("Invalid TOML: {err}"))
    }
}

impl From<reqwest::Error> for VoxError {
    fn from(err: reqwest::Error) -> Self {
        Self::network(err.to_string())
    }
}

impl From<tokio::task::JoinError> for VoxError {
    fn from(err: tokio::task::JoinError) -> Self {
        Self::concurrency(format!("Background task failed: {err}"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = VoxError::voice_not_found("en-gb-cori:3");
        assert_eq!(err.to_string(), "Voice 'en-gb-cori:3' not found");

        let err = VoxError::manifest_entry_missing("vits-piper-en_US-amy-medium");
        assert_eq!(
            err.to_string(),
            "Manifest entry missing for 'vits-piper-en_US-amy-medium'"
        );
    }

    #[test]
    fn test_switch_error_wraps_source() {
        let err = VoxError::switch("sv-lisa", VoxError::staging("disk full"));
        assert_eq!(
            err.to_string(),
            "Failed to switch to model 'sv-lisa': Asset staging failed: disk full"
        );
        let source = std::error::Error::source(&err).expect("switch errors carry a source");
        assert_eq!(source.to_string(), "Asset staging failed: disk full");
    }

    #[test]
    fn test_error_categories() {
        assert_eq!(VoxError::manifest_unavailable("x").category(), "manifest");
        assert_eq!(VoxError::manifest_entry_missing("x").category(), "manifest");
        assert_eq!(VoxError::staging("x").category(), "staging");
        assert_eq!(VoxError::switch("m", VoxError::staging("x")).category(), "switch");
        assert_eq!(VoxError::NoActiveModel.category(), "switch");
        assert_eq!(VoxError::speaker_out_of_range(1, 1).category(), "input");
        assert_eq!(VoxError::synthesis("x").category(), "synthesis");
        assert_eq!(VoxError::model_not_found("x").category(), "model");
        assert_eq!(VoxError::configuration("x").category(), "configuration");
        assert_eq!(VoxError::network("x").category(), "network");
        assert_eq!(VoxError::concurrency("x").category(), "concurrency");
    }

    #[test]
    fn test_retriable_errors() {
        assert!(VoxError::manifest_unavailable("503").is_retriable());
        assert!(VoxError::staging("reset").is_retriable());
        assert!(VoxError::switch("m", VoxError::network("reset")).is_retriable());
        assert!(!VoxError::switch("m", VoxError::synthesis("bad model")).is_retriable());
        assert!(!VoxError::manifest_entry_missing("dir").is_retriable());
        assert!(!VoxError::synthesis("x").is_retriable());
    }

    #[test]
    fn test_user_errors() {
        assert!(VoxError::invalid_input("empty").is_user_error());
        assert!(VoxError::speaker_out_of_range(2, 1).is_user_error());
        assert!(!VoxError::staging("x").is_user_error());
    }

    #[test]
    fn test_from_io_error() {
        let io_err = std::io::Error::new(std::io::ErrorKind::NotFound, "File not found");
        let err = VoxError::from(io_err);
        assert!(matches!(err, VoxError::FileError { .. }));
    }

    #[test]
    fn test_error_clone_equality() {
        let err1 = VoxError::switch("a", VoxError::staging("x"));
        let err2 = err1.clone();
        assert_eq!(err1, err2);
        assert_ne!(err1, VoxError::switch("b", VoxError::staging("x")));
    }
}
