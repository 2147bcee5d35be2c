//! Shared fixtures for integration tests: an in-memory asset source and a
//! scripted engine factory.

#![allow(dead_code)]

use std::collections::HashMap;
use std::path::Path;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use parking_lot::Mutex;
use voxstage_core::{
    AssetSource, AudioClip, EngineConfig, EngineFactory, GenerationRequest, ModelCatalog,
    StudioConfig, SynthesisEngine, VoxError, VoxResult,
};

pub const MANIFEST_PATH: &str = "models/manifest.json";

/// Asset source serving files from memory, with optional latency and
/// scripted failures
#[derive(Default)]
pub struct MemorySource {
    files: Mutex<HashMap<String, Bytes>>,
    failures: Mutex<HashMap<String, usize>>,
    fetches: Mutex<HashMap<String, usize>>,
    events: Mutex<Vec<String>>,
    delay: Mutex<Option<Duration>>,
    in_flight: AtomicUsize,
    max_in_flight: AtomicUsize,
}

impl MemorySource {
    pub fn new() -> Self {
        Self::default()
    }

    /// Source laid out like the web root for the builtin catalog
    pub fn builtin() -> Self {
        let source = Self::new();
        let catalog = ModelCatalog::builtin().unwrap();

        let mut manifest = serde_json::Map::new();
        for model in catalog.models() {
            let files: Vec<String> = match (&model.model_file, &model.tokens_file) {
                (Some(model_file), Some(tokens)) => vec![model_file.clone(), tokens.clone()],
                _ => vec![
                    "espeak-ng-data/phontab".to_string(),
                    "espeak-ng-data/phonindex".to_string(),
                    "espeak-ng-data/lang/gmw/en".to_string(),
                ],
            };
            for file in &files {
                source.insert(&model.source_path(file), format!("{}/{file}", model.dir));
            }
            manifest.insert(model.dir.clone(), serde_json::json!(files));
        }

        source.insert(
            MANIFEST_PATH,
            serde_json::Value::Object(manifest).to_string(),
        );
        source
    }

    pub fn insert<B: Into<Bytes>>(&self, path: &str, contents: B) {
        self.files.lock().insert(path.to_string(), contents.into());
    }

    pub fn remove(&self, path: &str) {
        self.files.lock().remove(path);
    }

    /// Make the next `times` fetches of `path` fail
    pub fn fail_next(&self, path: &str, times: usize) {
        self.failures.lock().insert(path.to_string(), times);
    }

    pub fn set_delay(&self, delay: Duration) {
        *self.delay.lock() = Some(delay);
    }

    pub fn fetch_count(&self, path: &str) -> usize {
        self.fetches.lock().get(path).copied().unwrap_or(0)
    }

    pub fn total_fetches(&self) -> usize {
        self.fetches.lock().values().sum()
    }

    pub fn max_in_flight(&self) -> usize {
        self.max_in_flight.load(Ordering::SeqCst)
    }

    /// `start:<path>` / `end:<path>` in the order they happened
    pub fn events(&self) -> Vec<String> {
        self.events.lock().clone()
    }
}

#[async_trait]
impl AssetSource for MemorySource {
    async fn fetch(&self, path: &str) -> VoxResult<Bytes> {
        *self.fetches.lock().entry(path.to_string()).or_default() += 1;
        self.events.lock().push(format!("start:{path}"));
        let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_in_flight.fetch_max(now, Ordering::SeqCst);

        let delay = *self.delay.lock();
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }

        let result = {
            let mut failures = self.failures.lock();
            match failures.get_mut(path) {
                Some(remaining) if *remaining > 0 => {
                    *remaining -= 1;
                    Err(VoxError::network(format!("Failed to fetch {path} (503)")))
                }
                _ => self
                    .files
                    .lock()
                    .get(path)
                    .cloned()
                    .ok_or_else(|| VoxError::network(format!("Failed to fetch {path} (404)"))),
            }
        };

        self.in_flight.fetch_sub(1, Ordering::SeqCst);
        self.events.lock().push(format!("end:{path}"));
        result
    }

    fn describe(&self, path: &str) -> String {
        format!("memory://{path}")
    }
}

/// Engine factory that records what it builds and tracks live instances
pub struct MockFactory {
    speakers: u32,
    fail_dirs: Mutex<Vec<String>>,
    fail_release: Arc<AtomicBool>,
    creates: AtomicUsize,
    live: Arc<AtomicUsize>,
    max_live: Arc<AtomicUsize>,
    events: Arc<Mutex<Vec<String>>>,
}

impl MockFactory {
    pub fn new(speakers: u32) -> Self {
        Self {
            speakers,
            fail_dirs: Mutex::new(Vec::new()),
            fail_release: Arc::new(AtomicBool::new(false)),
            creates: AtomicUsize::new(0),
            live: Arc::new(AtomicUsize::new(0)),
            max_live: Arc::new(AtomicUsize::new(0)),
            events: Arc::new(Mutex::new(Vec::new())),
        }
    }

    /// Fail construction for models whose directory is `dir`
    pub fn fail_for(&self, dir: &str) {
        self.fail_dirs.lock().push(dir.to_string());
    }

    /// Make `release` fail on every engine, including ones already built
    pub fn fail_releases(&self) {
        self.fail_release.store(true, Ordering::SeqCst);
    }

    pub fn creates(&self) -> usize {
        self.creates.load(Ordering::SeqCst)
    }

    pub fn live(&self) -> usize {
        self.live.load(Ordering::SeqCst)
    }

    pub fn max_live(&self) -> usize {
        self.max_live.load(Ordering::SeqCst)
    }

    /// `create:<dir>` / `release:<dir>` in order
    pub fn events(&self) -> Vec<String> {
        self.events.lock().clone()
    }
}

fn model_dir(config: &EngineConfig) -> String {
    Path::new(&config.model.vits.model)
        .parent()
        .and_then(Path::file_name)
        .map(|name| name.to_string_lossy().into_owned())
        .unwrap_or_default()
}

impl EngineFactory for MockFactory {
    fn create(&self, config: &EngineConfig) -> VoxResult<Box<dyn SynthesisEngine>> {
        let dir = model_dir(config);
        if self.fail_dirs.lock().contains(&dir) {
            return Err(VoxError::synthesis(format!("cannot load {dir}")));
        }

        // Every file the engine reads must already be staged.
        assert!(Path::new(&config.model.vits.model).exists(), "model file not staged");
        assert!(Path::new(&config.model.vits.tokens).exists(), "tokens file not staged");
        assert!(Path::new(&config.model.vits.data_dir).exists(), "data dir not staged");

        self.creates.fetch_add(1, Ordering::SeqCst);
        let now = self.live.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_live.fetch_max(now, Ordering::SeqCst);
        self.events.lock().push(format!("create:{dir}"));

        Ok(Box::new(MockEngine {
            dir,
            speakers: self.speakers,
            fail_release: Arc::clone(&self.fail_release),
            live: Arc::clone(&self.live),
            events: Arc::clone(&self.events),
        }))
    }
}

struct MockEngine {
    dir: String,
    speakers: u32,
    fail_release: Arc<AtomicBool>,
    live: Arc<AtomicUsize>,
    events: Arc<Mutex<Vec<String>>>,
}

impl SynthesisEngine for MockEngine {
    fn num_speakers(&self) -> u32 {
        self.speakers
    }

    fn sample_rate(&self) -> u32 {
        22_050
    }

    fn generate(&self, request: &GenerationRequest) -> VoxResult<AudioClip> {
        if request.text.contains("boom") {
            return Err(VoxError::synthesis("engine crashed"));
        }
        let len = request.text.chars().count() * 10;
        Ok(AudioClip::new(22_050, vec![0.25; len]))
    }

    fn release(&mut self) -> VoxResult<()> {
        self.events.lock().push(format!("release:{}", self.dir));
        if self.fail_release.load(Ordering::SeqCst) {
            return Err(VoxError::synthesis(format!("cannot release {}", self.dir)));
        }
        Ok(())
    }
}

impl Drop for MockEngine {
    fn drop(&mut self) {
        self.live.fetch_sub(1, Ordering::SeqCst);
    }
}

pub fn config_for(staging: &Path) -> StudioConfig {
    StudioConfig::default()
        .with_staging_root(staging)
        .with_max_concurrent_transfers(4)
}
