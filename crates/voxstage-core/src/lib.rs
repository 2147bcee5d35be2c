//! # Voxstage Core
//!
//! Model lifecycle and asset staging for an embedded speech synthesis engine.
//!
//! ## Features
//!
//! - Manifest-driven staging of model files into a sandboxed directory
//! - Recursive dependency mounts with coalescing of concurrent requests
//! - Serialized model switching with a single live engine instance
//! - 16-bit PCM WAV encoding of synthesized audio
//!
//! ## Example
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use voxstage_core::{source_from_config, EngineFactory, ModelCatalog, StudioConfig, VoiceStudio};
//!
//! async fn run(factory: Arc<dyn EngineFactory>) -> voxstage_core::VoxResult<()> {
//!     let config = StudioConfig::default().with_asset_base("https://voices.example.org");
//!     let source = source_from_config(&config)?;
//!     let studio = VoiceStudio::new(&config, ModelCatalog::builtin()?, source, factory)?;
//!
//!     studio.select_voice("sv-lisa:0").await?;
//!     let clip = studio.synthesize("Hej! Hur mår du?", 1.0).await?;
//!     std::fs::write(&clip.file_name, &clip.wav)?;
//!     Ok(())
//! }
//! ```

#![deny(missing_docs)]
#![deny(unsafe_code)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![warn(clippy::nursery)]
#![allow(clippy::module_name_repetitions)]

pub mod catalog;
pub mod config;
pub mod coordinator;
pub mod engine;
pub mod error;
pub mod manifest;
pub mod service;
pub mod source;
pub mod stager;
pub mod status;
pub mod synthesis;
pub mod wav_writer;

// Re-export main types for convenience
pub use catalog::{
    voice_key, ModelCatalog, ModelDefinition, ModelKind, VoiceDescriptor, VoiceEntry,
    DEFAULT_MODEL_ID,
};
pub use config::{EngineSettings, StudioConfig};
pub use coordinator::{ActiveModel, SwitchCoordinator, SwitchOutcome};
pub use engine::{AudioClip, EngineConfig, EngineFactory, GenerationRequest, SynthesisEngine};
pub use error::{VoxError, VoxResult};
pub use manifest::{Manifest, ManifestStore};
pub use service::{RenderedClip, VoiceStudio};
pub use source::{source_from_config, AssetSource, DirSource, HttpSource};
pub use stager::{AssetStager, MountState};
pub use status::{ModelPhase, ModelStatus, Status, StatusBoard, StatusTone};
pub use synthesis::SynthesisRequestHandler;
pub use wav_writer::encode_wav;

/// Version information for the voxstage-core crate
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
