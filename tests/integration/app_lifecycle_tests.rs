/*!
 * Controller workflows as driven by the CLI: translate, plan, merge
 */

use std::fs;

use c2rust_pipeline::app_config::{Config, PreprocessorKind, TranslationProvider};
use c2rust_pipeline::app_controller::{Controller, ISSUES_LOG_FILE};
use c2rust_pipeline::transpile::Manifest;

use crate::common::{create_temp_dir, create_test_file, SAMPLE_C, SAMPLE_ORDER};

/// Offline configuration: passthrough preprocessing and the mock translator
fn offline_config(storage_root: &std::path::Path) -> Config {
    let mut config = Config::default();
    config.preprocessor.kind = PreprocessorKind::Passthrough;
    config.translation.provider = TranslationProvider::Mock;
    config.pipeline.retry_backoff_ms = 1;
    config.storage.root = storage_root.to_path_buf();
    config
}

/// Translating a file writes `<stem>.rs` next to the requested output
#[tokio::test]
async fn test_run_withMockProvider_shouldWriteRustFile() {
    let input_dir = create_temp_dir().unwrap();
    let output_dir = create_temp_dir().unwrap();
    let storage = create_temp_dir().unwrap();
    let input = create_test_file(input_dir.path(), "geometry.c", SAMPLE_C).unwrap();

    let controller = Controller::with_config(offline_config(storage.path())).unwrap();
    let written = controller
        .run(input.clone(), output_dir.path().to_path_buf(), false)
        .await
        .unwrap()
        .unwrap();

    assert_eq!(written, output_dir.path().join("geometry.rs"));
    let text = fs::read_to_string(&written).unwrap();
    assert!(text.contains("pub struct point"));
    assert!(text.contains("pub fn main"));
    assert!(!output_dir.path().join(ISSUES_LOG_FILE).exists());

    // Existing output is kept unless forced
    let skipped = controller
        .run(input.clone(), output_dir.path().to_path_buf(), false)
        .await
        .unwrap();
    assert!(skipped.is_none());

    let forced = controller.run(input, output_dir.path().to_path_buf(), true).await.unwrap();
    assert!(forced.is_some());
}

/// Job failures are written to the issues log
#[tokio::test]
async fn test_run_withUnbalancedSource_shouldWriteIssuesLog() {
    let dir = create_temp_dir().unwrap();
    let storage = create_temp_dir().unwrap();
    let input = create_test_file(dir.path(), "bad.c", "int broken(void) {\n  if (1) {\n").unwrap();

    let controller = Controller::with_config(offline_config(storage.path())).unwrap();
    let result = controller.run(input, dir.path().to_path_buf(), false).await;

    assert!(result.is_err());
    let log = fs::read_to_string(dir.path().join(ISSUES_LOG_FILE)).unwrap();
    assert!(log.contains("bad.c"));
    assert!(log.contains("[ERROR]"));
    assert!(!dir.path().join("bad.rs").exists());
}

/// Directory mode translates every C file in place
#[tokio::test]
async fn test_run_folder_withSeveralSources_shouldTranslateEach() {
    let dir = create_temp_dir().unwrap();
    let storage = create_temp_dir().unwrap();
    create_test_file(dir.path(), "a.c", SAMPLE_C).unwrap();
    fs::create_dir_all(dir.path().join("nested")).unwrap();
    create_test_file(&dir.path().join("nested"), "b.c", "int one(void) {\n    return 1;\n}\n").unwrap();

    let controller = Controller::with_config(offline_config(storage.path())).unwrap();
    controller.run_folder(dir.path().to_path_buf(), false).await.unwrap();

    assert!(dir.path().join("a.rs").exists());
    assert!(dir.path().join("nested/b.rs").exists());
    let summary = fs::read_to_string(dir.path().join(ISSUES_LOG_FILE)).unwrap();
    assert!(summary.contains("2 processed, 0 skipped, 0 errors"));
}

/// Planning prints the dependency-ordered manifest
#[test]
fn test_plan_withSample_shouldReturnManifestJson() {
    let dir = create_temp_dir().unwrap();
    let storage = create_temp_dir().unwrap();
    let input = create_test_file(dir.path(), "geometry.c", SAMPLE_C).unwrap();

    let controller = Controller::with_config(offline_config(storage.path())).unwrap();
    let json = tokio_test::block_on(async { controller.plan(&input).await }).unwrap();

    let value: serde_json::Value = serde_json::from_str(&json).unwrap();
    let manifest: Manifest = serde_json::from_value(value["manifest"].clone()).unwrap();
    let ids: Vec<&str> = manifest.ordered_segment_ids.iter().map(|id| id.as_str()).collect();
    assert_eq!(ids, SAMPLE_ORDER.to_vec());
    assert_eq!(value["symbols"].as_array().unwrap().len(), 4);
}

/// A retained job directory can be merged again
#[tokio::test]
async fn test_merge_dir_withRetainedJob_shouldReproduceOutput() {
    let dir = create_temp_dir().unwrap();
    let storage = create_temp_dir().unwrap();
    let input = create_test_file(dir.path(), "geometry.c", SAMPLE_C).unwrap();

    let mut config = offline_config(storage.path());
    config.storage.retain_artifacts = true;
    let controller = Controller::with_config(config).unwrap();
    let written = controller.run(input, dir.path().to_path_buf(), false).await.unwrap().unwrap();

    let job_dir = fs::read_dir(storage.path()).unwrap().next().unwrap().unwrap().path();
    let remerged_path = dir.path().join("remerged.rs");
    let (path, artifact) = controller.merge_dir(&job_dir, Some(remerged_path.clone())).unwrap();

    assert_eq!(path, remerged_path);
    assert_eq!(artifact.ordered_unique_segments.len(), 4);
    assert_eq!(fs::read_to_string(&remerged_path).unwrap(), fs::read_to_string(&written).unwrap());
}

/// Merging something that is not a job directory fails
#[test]
fn test_merge_dir_withMissingDirectory_shouldFail() {
    let storage = create_temp_dir().unwrap();
    let controller = Controller::with_config(offline_config(storage.path())).unwrap();

    assert!(controller.merge_dir(&storage.path().join("job-missing"), None).is_err());
}
