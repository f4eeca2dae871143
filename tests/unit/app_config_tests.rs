/*!
 * Tests for application configuration functionality
 */

use c2rust_pipeline::app_config::{Config, LogLevel, PreprocessorKind, TranslationProvider};
use c2rust_pipeline::pipeline::FailurePolicy;

use crate::common::create_temp_dir;

/// Test default configuration values
#[test]
fn test_default_config_withNoParameters_shouldHaveCorrectDefaults() {
    let config = Config::default();

    assert_eq!(config.translation.provider, TranslationProvider::Ollama);
    assert_eq!(config.pipeline.failure_policy, FailurePolicy::Lenient);
    assert_eq!(config.pipeline.max_concurrent_translations, 4);
    assert_eq!(config.pipeline.retry_count, 3);
    assert_eq!(config.preprocessor.kind, PreprocessorKind::Gcc);
    assert_eq!(config.preprocessor.command, "gcc");
    assert!(!config.storage.retain_artifacts);
    assert_eq!(config.log_level, LogLevel::Info);

    let ollama_config = config
        .translation
        .get_provider_config(&TranslationProvider::Ollama)
        .expect("Ollama provider config should exist");
    assert_eq!(ollama_config.model, "codellama");
}

/// A missing file is created with defaults and loads back identically
#[test]
fn test_load_or_create_withMissingFile_shouldWriteDefaults() {
    let dir = create_temp_dir().unwrap();
    let path = dir.path().join("conf.json");

    let created = Config::load_or_create(&path).unwrap();
    assert!(path.exists());

    let loaded = Config::load_or_create(&path).unwrap();
    assert_eq!(loaded.pipeline.max_concurrent_translations, created.pipeline.max_concurrent_translations);
    assert_eq!(loaded.translation.get_model(), created.translation.get_model());
}

/// Saved overrides survive a reload
#[test]
fn test_save_withOverrides_shouldRoundTrip() {
    let dir = create_temp_dir().unwrap();
    let path = dir.path().join("conf.json");

    let mut config = Config::default();
    config.translation.provider = TranslationProvider::LMStudio;
    config.translation.active_provider_config_mut().model = "qwen2.5-coder".to_string();
    config.pipeline.failure_policy = FailurePolicy::Strict;
    config.preprocessor.include_paths.push("/opt/include".into());
    config.save(&path).unwrap();

    let loaded = Config::load_or_create(&path).unwrap();
    assert_eq!(loaded.translation.provider, TranslationProvider::LMStudio);
    assert_eq!(loaded.translation.get_model(), "qwen2.5-coder");
    assert_eq!(loaded.pipeline.failure_policy, FailurePolicy::Strict);
    assert_eq!(loaded.pipeline_options().include_paths.len(), 1);
}

/// Broken JSON is reported instead of silently replaced
#[test]
fn test_load_or_create_withInvalidJson_shouldFail() {
    let dir = create_temp_dir().unwrap();
    let path = dir.path().join("conf.json");
    std::fs::write(&path, "{ not json").unwrap();

    assert!(Config::load_or_create(&path).is_err());
}

/// Test configuration validation
#[test]
fn test_config_validation_withVariousConfigs_shouldValidateCorrectly() {
    let mut config = Config::default();
    assert!(config.validate().is_ok());

    config.pipeline.max_concurrent_translations = 0;
    assert!(config.validate().is_err());
    config.pipeline.max_concurrent_translations = 2;

    config.translation.prompt_template = String::new();
    assert!(config.validate().is_err());
    config.translation.prompt_template = "Port to Rust:\n{source}".to_string();
    assert!(config.validate().is_ok());

    config.preprocessor.command = "  ".to_string();
    assert!(config.validate().is_err());
    config.preprocessor.kind = PreprocessorKind::Passthrough;
    assert!(config.validate().is_ok());
}
