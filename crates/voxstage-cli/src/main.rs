//! Voxstage CLI - inspect the voice catalog and stage model assets.
//!
//! ## Commands
//!
//! | Command | Description |
//! |---------|-------------|
//! | `voices` | List the voice catalog grouped by language |
//! | `manifest` | Show the asset manifest |
//! | `stage` | Mount a model and its dependencies into the staging root |
//! | `encode-tone` | Write a test tone through the WAV encoder |

use std::f32::consts::TAU;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use tracing::info;
use tracing_subscriber::EnvFilter;
use voxstage_core::{
    encode_wav, source_from_config, AssetStager, ManifestStore, ModelCatalog, StudioConfig,
};

/// Voxstage - model staging for embedded speech synthesis
#[derive(Parser)]
#[command(name = "voxstage", version)]
#[command(about = "Inspect voices and stage speech model assets", long_about = None)]
struct Cli {
    /// TOML configuration file
    #[arg(short, long, global = true, env = "VOXSTAGE_CONFIG", value_name = "FILE")]
    config: Option<PathBuf>,

    /// Override the asset base (URL or directory)
    #[arg(long, global = true, value_name = "BASE")]
    asset_base: Option<String>,

    /// Override the staging root
    #[arg(long, global = true, value_name = "DIR")]
    staging_dir: Option<PathBuf>,

    /// JSON voice registry replacing the bundled voices
    #[arg(long, global = true, value_name = "FILE")]
    voices: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// List the voice catalog grouped by language
    Voices,
    /// Show the directories listed in the asset manifest
    Manifest,
    /// Mount a model and its dependencies into the staging root
    Stage {
        /// Model ID (e.g. "sv-lisa")
        #[arg(value_name = "ID")]
        model: String,
    },
    /// Write a sine test tone as a 16-bit PCM WAV file
    EncodeTone {
        /// Output file
        #[arg(short, long, value_name = "FILE", default_value = "tone.wav")]
        output: PathBuf,

        /// Tone frequency in Hz
        #[arg(long, default_value_t = 440.0)]
        frequency: f32,

        /// Duration in seconds
        #[arg(long, default_value_t = 1.0)]
        seconds: f32,

        /// Sample rate in Hz
        #[arg(long, default_value_t = 22_050)]
        sample_rate: u32,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("info,hyper=warn,reqwest=warn"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .init();

    let cli = Cli::parse();
    let config = load_config(&cli)?;

    match cli.command {
        Commands::Voices => list_voices(&load_catalog(&cli, &config)?),
        Commands::Manifest => show_manifest(&config).await,
        Commands::Stage { ref model } => stage(&config, load_catalog(&cli, &config)?, model).await,
        Commands::EncodeTone {
            ref output,
            frequency,
            seconds,
            sample_rate,
        } => encode_tone(output, frequency, seconds, sample_rate),
    }
}

fn load_config(cli: &Cli) -> Result<StudioConfig> {
    let mut config = match &cli.config {
        Some(path) => StudioConfig::from_file(path)
            .with_context(|| format!("loading {}", path.display()))?,
        None => StudioConfig::default(),
    };

    if let Some(base) = &cli.asset_base {
        config = config.with_asset_base(base.clone());
    }
    if let Some(dir) = &cli.staging_dir {
        config = config.with_staging_root(dir.clone());
    }
    config.validate()?;
    Ok(config)
}

fn load_catalog(cli: &Cli, config: &StudioConfig) -> Result<ModelCatalog> {
    let catalog = match &cli.voices {
        Some(path) => {
            let json = std::fs::read(path)
                .with_context(|| format!("reading voice registry {}", path.display()))?;
            ModelCatalog::builtin_with_voices_json(&json, &config.default_model_id)?
        }
        None => ModelCatalog::builtin()?,
    };
    Ok(catalog)
}

fn list_voices(catalog: &ModelCatalog) -> Result<()> {
    for language in catalog.languages() {
        println!("{language}");
        for voice in catalog.voices_for_language(language) {
            println!("  {:<24} {}", voice.key, catalog.voice_details(voice));
            if let Some(docs) = &voice.docs {
                println!("  {:<24} {docs}", "");
            }
        }
    }
    Ok(())
}

async fn show_manifest(config: &StudioConfig) -> Result<()> {
    let source = source_from_config(config)?;
    let store = ManifestStore::new(source, config.manifest_path.clone());
    let manifest = store.load().await?;

    for directory in manifest.directories() {
        let files = manifest.files_for(directory).map_or(0, <[String]>::len);
        println!("{directory:<48} {files:>5} files");
    }
    Ok(())
}

async fn stage(config: &StudioConfig, catalog: ModelCatalog, model: &str) -> Result<()> {
    let source = source_from_config(config)?;
    let manifest = Arc::new(ManifestStore::new(Arc::clone(&source), config.manifest_path.clone()));
    let catalog = Arc::new(catalog);
    let stager = AssetStager::new(
        Arc::clone(&catalog),
        manifest,
        source,
        config.staging_root.clone(),
        config.max_concurrent_transfers,
    );

    info!(model, root = %config.staging_root.display(), "staging");
    stager
        .mount(model)
        .await
        .with_context(|| format!("staging {model}"))?;

    let definition = catalog
        .definition(model)
        .with_context(|| format!("model {model} vanished from the catalog"))?;
    println!("{}", stager.model_dir(definition).display());
    Ok(())
}

fn encode_tone(output: &Path, frequency: f32, seconds: f32, sample_rate: u32) -> Result<()> {
    anyhow::ensure!(seconds.is_finite() && seconds > 0.0, "duration must be positive");

    let len = (seconds * sample_rate as f32) as usize;
    let samples: Vec<f32> = (0..len)
        .map(|i| (TAU * frequency * i as f32 / sample_rate as f32).sin() * 0.5)
        .collect();

    let wav = encode_wav(&samples, sample_rate)?;
    std::fs::write(output, &wav).with_context(|| format!("writing {}", output.display()))?;
    info!(path = %output.display(), samples = len, bytes = wav.len(), "wrote tone");
    Ok(())
}
