//! Integration tests for manifest-driven asset staging

mod common;

use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use common::{MemorySource, MANIFEST_PATH};
use tempfile::TempDir;
use voxstage_core::{
    AssetSource, AssetStager, DirSource, ManifestStore, ModelCatalog, ModelDefinition, MountState,
    VoxError,
};

fn stager_with(
    source: Arc<MemorySource>,
    catalog: ModelCatalog,
    root: &Path,
    limit: usize,
) -> AssetStager {
    let source: Arc<dyn AssetSource> = source;
    let manifest = Arc::new(ManifestStore::new(Arc::clone(&source), MANIFEST_PATH));
    AssetStager::new(Arc::new(catalog), manifest, source, root.to_path_buf(), limit)
}

fn builtin_stager(source: Arc<MemorySource>, root: &Path) -> AssetStager {
    stager_with(source, ModelCatalog::builtin().unwrap(), root, 4)
}

const LISA_DIR: &str = "vits-piper-sv_SE-lisa-medium";

#[test_log::test(tokio::test)]
async fn test_mount_stages_model_and_dependency() {
    let staging = TempDir::new().unwrap();
    let source = Arc::new(MemorySource::builtin());
    let stager = builtin_stager(Arc::clone(&source), staging.path());

    stager.mount("sv-lisa").await.unwrap();

    let models = staging.path().join("models");
    assert_eq!(
        std::fs::read_to_string(models.join(LISA_DIR).join("tokens.txt")).unwrap(),
        format!("{LISA_DIR}/tokens.txt")
    );
    assert!(models.join(LISA_DIR).join("sv_SE-lisa-medium.onnx").exists());
    assert!(models.join("common/espeak-ng-data/lang/gmw/en").exists());
    assert_eq!(stager.mount_state("sv-lisa"), MountState::Mounted);
    assert!(stager.is_mounted("common"));
    assert!(!stager.is_mounted("en-us-amy"));
}

#[tokio::test]
async fn test_second_mount_does_no_io() {
    let staging = TempDir::new().unwrap();
    let source = Arc::new(MemorySource::builtin());
    let stager = builtin_stager(Arc::clone(&source), staging.path());

    stager.mount("en-gb-cori").await.unwrap();
    let fetches = source.total_fetches();
    assert_eq!(source.fetch_count(MANIFEST_PATH), 1);

    stager.mount("en-gb-cori").await.unwrap();
    stager.mount("common").await.unwrap();
    assert_eq!(source.total_fetches(), fetches);
}

#[tokio::test]
async fn test_concurrent_mounts_coalesce() {
    let staging = TempDir::new().unwrap();
    let source = Arc::new(MemorySource::builtin());
    source.set_delay(Duration::from_millis(20));
    let stager = builtin_stager(Arc::clone(&source), staging.path());

    let mounts = (0..8).map(|_| {
        let stager = stager.clone();
        tokio::spawn(async move { stager.mount("sv-lisa").await })
    });
    for result in futures_util::future::join_all(mounts).await {
        result.unwrap().unwrap();
    }

    assert_eq!(source.fetch_count(MANIFEST_PATH), 1);
    assert_eq!(
        source.fetch_count(&format!("models/{LISA_DIR}/tokens.txt")),
        1
    );
    assert_eq!(source.fetch_count("common/espeak-ng-data/phontab"), 1);
}

#[tokio::test]
async fn test_coalesced_mounts_share_failure() {
    let staging = TempDir::new().unwrap();
    let source = Arc::new(MemorySource::builtin());
    source.set_delay(Duration::from_millis(20));
    let tokens = format!("models/{LISA_DIR}/tokens.txt");
    source.fail_next(&tokens, 1);
    let stager = builtin_stager(Arc::clone(&source), staging.path());

    let mounts = (0..8).map(|_| {
        let stager = stager.clone();
        tokio::spawn(async move { stager.mount("sv-lisa").await })
    });
    for result in futures_util::future::join_all(mounts).await {
        let err = result.unwrap().unwrap_err();
        assert!(matches!(err, VoxError::AssetStagingError { .. }), "{err}");
    }

    assert_eq!(source.fetch_count(&tokens), 1);
    assert_eq!(source.fetch_count(MANIFEST_PATH), 1);
    assert_eq!(stager.mount_state("sv-lisa"), MountState::Unmounted);
}

#[tokio::test]
async fn test_mount_state_visible_while_in_flight() {
    let staging = TempDir::new().unwrap();
    let source = Arc::new(MemorySource::builtin());
    source.set_delay(Duration::from_millis(30));
    let stager = builtin_stager(Arc::clone(&source), staging.path());

    let background = {
        let stager = stager.clone();
        tokio::spawn(async move { stager.mount("sv-nst").await })
    };
    tokio::time::sleep(Duration::from_millis(5)).await;
    assert_eq!(stager.mount_state("sv-nst"), MountState::Mounting);

    background.await.unwrap().unwrap();
    assert_eq!(stager.mount_state("sv-nst"), MountState::Mounted);
}

#[tokio::test]
async fn test_dependencies_finish_before_own_files() {
    let staging = TempDir::new().unwrap();
    let source = Arc::new(MemorySource::builtin());
    source.set_delay(Duration::from_millis(5));
    let stager = builtin_stager(Arc::clone(&source), staging.path());

    stager.mount("en-us-amy").await.unwrap();

    let events = source.events();
    let last_common_end = events
        .iter()
        .rposition(|event| event.starts_with("end:common/"))
        .unwrap();
    let first_own_start = events
        .iter()
        .position(|event| event.starts_with("start:models/vits-piper-en_US-amy-medium/"))
        .unwrap();
    assert!(last_common_end < first_own_start, "events: {events:?}");
}

#[tokio::test]
async fn test_transfers_respect_concurrency_limit() {
    let staging = TempDir::new().unwrap();
    let source = Arc::new(MemorySource::new());
    source.set_delay(Duration::from_millis(10));

    let files: Vec<String> = (0..20).map(|i| format!("chunk-{i:02}.bin")).collect();
    for file in &files {
        source.insert(&format!("models/bulk/{file}"), vec![0u8; 16]);
    }
    source.insert(
        MANIFEST_PATH,
        serde_json::json!({ "bulk": files }).to_string(),
    );

    let catalog = ModelCatalog::new(
        vec![ModelDefinition::local("bulk", "Bulk", "bulk", "chunk-00.bin", "chunk-01.bin")],
        &[],
        "bulk",
    )
    .unwrap();
    let stager = stager_with(Arc::clone(&source), catalog, staging.path(), 3);

    stager.mount("bulk").await.unwrap();

    assert_eq!(source.max_in_flight(), 3);
    let staged = std::fs::read_dir(staging.path().join("models/bulk")).unwrap().count();
    assert_eq!(staged, 20);
}

#[tokio::test]
async fn test_failed_transfer_can_be_retried() {
    let staging = TempDir::new().unwrap();
    let source = Arc::new(MemorySource::builtin());
    let tokens = format!("models/{LISA_DIR}/tokens.txt");
    source.fail_next(&tokens, 1);
    let stager = builtin_stager(Arc::clone(&source), staging.path());

    let err = stager.mount("sv-lisa").await.unwrap_err();
    assert!(matches!(err, VoxError::AssetStagingError { .. }), "{err}");
    assert!(err.is_retriable());
    assert_eq!(stager.mount_state("sv-lisa"), MountState::Unmounted);
    assert!(stager.is_mounted("common"));

    stager.mount("sv-lisa").await.unwrap();
    assert!(stager.is_mounted("sv-lisa"));
    assert_eq!(source.fetch_count(&tokens), 2);
    assert!(staging.path().join("models").join(LISA_DIR).join("tokens.txt").exists());
    // Common data staged by the first attempt is not fetched again.
    assert_eq!(source.fetch_count("common/espeak-ng-data/phontab"), 1);
}

#[tokio::test]
async fn test_manifest_failure_is_retried() {
    let staging = TempDir::new().unwrap();
    let source = Arc::new(MemorySource::builtin());
    source.fail_next(MANIFEST_PATH, 1);
    let stager = builtin_stager(Arc::clone(&source), staging.path());

    let err = stager.mount("en-gb-cori").await.unwrap_err();
    assert!(matches!(err, VoxError::ManifestUnavailable { .. }), "{err}");
    assert_eq!(stager.mount_state("common"), MountState::Unmounted);
    assert_eq!(stager.mount_state("en-gb-cori"), MountState::Unmounted);

    stager.mount("en-gb-cori").await.unwrap();
    assert_eq!(source.fetch_count(MANIFEST_PATH), 2);
}

#[tokio::test]
async fn test_missing_manifest_entry() {
    let staging = TempDir::new().unwrap();
    let source = Arc::new(MemorySource::builtin());
    source.insert(
        MANIFEST_PATH,
        serde_json::json!({ "common": ["espeak-ng-data/phontab"] }).to_string(),
    );
    let stager = builtin_stager(Arc::clone(&source), staging.path());

    let err = stager.mount("en-us-amy").await.unwrap_err();
    assert_eq!(
        err,
        VoxError::manifest_entry_missing("vits-piper-en_US-amy-medium")
    );
    assert!(stager.is_mounted("common"));
    assert_eq!(stager.mount_state("en-us-amy"), MountState::Unmounted);
}

#[tokio::test]
async fn test_unknown_model() {
    let staging = TempDir::new().unwrap();
    let stager = builtin_stager(Arc::new(MemorySource::builtin()), staging.path());

    let err = stager.mount("fr-fr-siwis").await.unwrap_err();
    assert_eq!(err, VoxError::model_not_found("fr-fr-siwis"));
}

#[tokio::test]
async fn test_existing_files_are_not_fetched() {
    let staging = TempDir::new().unwrap();
    let source = Arc::new(MemorySource::builtin());
    let existing = staging.path().join("models").join(LISA_DIR);
    std::fs::create_dir_all(&existing).unwrap();
    std::fs::write(existing.join("sv_SE-lisa-medium.onnx"), b"cached").unwrap();

    let stager = builtin_stager(Arc::clone(&source), staging.path());
    stager.mount("sv-lisa").await.unwrap();

    assert_eq!(
        source.fetch_count(&format!("models/{LISA_DIR}/sv_SE-lisa-medium.onnx")),
        0
    );
    assert_eq!(
        std::fs::read(existing.join("sv_SE-lisa-medium.onnx")).unwrap(),
        b"cached"
    );
}

#[tokio::test]
async fn test_manifest_path_escape_is_rejected() {
    let staging = TempDir::new().unwrap();
    let source = Arc::new(MemorySource::builtin());
    source.insert(
        MANIFEST_PATH,
        serde_json::json!({ "common": ["../../outside.txt"] }).to_string(),
    );
    let stager = builtin_stager(Arc::clone(&source), staging.path());

    let err = stager.mount("common").await.unwrap_err();
    assert!(matches!(err, VoxError::AssetStagingError { .. }));
    assert!(!staging.path().join("outside.txt").exists());
}

#[tokio::test]
async fn test_stage_from_directory_mirror() {
    let site = TempDir::new().unwrap();
    let staging = TempDir::new().unwrap();

    let write = |relative: &str, contents: &str| {
        let path = site.path().join(relative);
        std::fs::create_dir_all(path.parent().unwrap()).unwrap();
        std::fs::write(path, contents).unwrap();
    };
    write(
        "models/manifest.json",
        r#"{
            "common": ["espeak-ng-data/phontab"],
            "vits-piper-en_GB-cori-medium": ["en_GB-cori-medium.onnx", "tokens.txt"]
        }"#,
    );
    write("common/espeak-ng-data/phontab", "phonemes");
    write("models/vits-piper-en_GB-cori-medium/en_GB-cori-medium.onnx", "weights");
    write("models/vits-piper-en_GB-cori-medium/tokens.txt", "a 1\nb 2\n");

    let source: Arc<dyn AssetSource> = Arc::new(DirSource::new(site.path()));
    let manifest = Arc::new(ManifestStore::new(Arc::clone(&source), MANIFEST_PATH));
    let stager = AssetStager::new(
        Arc::new(ModelCatalog::builtin().unwrap()),
        manifest,
        source,
        staging.path().to_path_buf(),
        8,
    );

    stager.mount("en-gb-cori").await.unwrap();

    let cori = stager.model_dir(stager.catalog().definition("en-gb-cori").unwrap());
    assert_eq!(std::fs::read_to_string(cori.join("tokens.txt")).unwrap(), "a 1\nb 2\n");
    assert_eq!(
        std::fs::read_to_string(staging.path().join("models/common/espeak-ng-data/phontab"))
            .unwrap(),
        "phonemes"
    );
}
