use anyhow::{anyhow, Context, Result};
use log::{warn, LevelFilter};
use serde::{Deserialize, Serialize};
use std::default::Default;
use std::fs::File;
use std::io::BufReader;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::pipeline::{FailurePolicy, PipelineOptions, RetryPolicy};
use crate::providers::{default_diagnostic_markers, PromptSettings, DEFAULT_PROMPT_TEMPLATE};

/// Application configuration module
/// This module handles the application configuration including loading,
/// validating and saving configuration settings.
/// Represents the application configuration
#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct Config {
    /// Pipeline scheduling settings
    #[serde(default)]
    pub pipeline: PipelineConfig,

    /// Source normalization settings
    #[serde(default)]
    pub preprocessor: PreprocessorConfig,

    /// Translation config
    #[serde(default)]
    pub translation: TranslationConfig,

    /// Job artifact storage
    #[serde(default)]
    pub storage: StorageConfig,

    /// Log level
    #[serde(default)]
    pub log_level: LogLevel,
}

/// Translation provider type
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Default)]
#[serde(rename_all = "lowercase")]
pub enum TranslationProvider {
    // @provider: Ollama
    #[default]
    Ollama,
    // @provider: OpenAI
    OpenAI,
    // @provider: LM Studio (OpenAI-compatible local server)
    LMStudio,
    // @provider: Scripted offline translator
    Mock,
}

impl TranslationProvider {
    // @returns: Capitalized provider name
    pub fn display_name(&self) -> &str {
        match self {
            Self::Ollama => "Ollama",
            Self::OpenAI => "OpenAI",
            Self::LMStudio => "LM Studio",
            Self::Mock => "Mock",
        }
    }

    // @returns: Lowercase provider identifier
    pub fn to_lowercase_string(&self) -> String {
        match self {
            Self::Ollama => "ollama".to_string(),
            Self::OpenAI => "openai".to_string(),
            Self::LMStudio => "lmstudio".to_string(),
            Self::Mock => "mock".to_string(),
        }
    }
}

// Implement Display trait for TranslationProvider
impl std::fmt::Display for TranslationProvider {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.to_lowercase_string())
    }
}

// Implement FromStr trait for TranslationProvider
impl std::str::FromStr for TranslationProvider {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_lowercase().as_str() {
            "ollama" => Ok(Self::Ollama),
            "openai" => Ok(Self::OpenAI),
            "lmstudio" => Ok(Self::LMStudio),
            "mock" => Ok(Self::Mock),
            _ => Err(anyhow!("Invalid provider type: {}", s)),
        }
    }
}

/// Provider configuration wrapper
#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct ProviderConfig {
    // @field: Provider type identifier
    #[serde(rename = "type")]
    pub provider_type: String,

    // @field: Model name
    #[serde(default = "String::new")]
    pub model: String,

    // @field: API key
    #[serde(default = "String::new")]
    pub api_key: String,

    // @field: Service URL
    #[serde(default = "String::new")]
    pub endpoint: String,

    // @field: HTTP timeout seconds
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
}

impl ProviderConfig {
    // @param provider_type: Provider enum
    // @returns: Provider config with defaults
    pub fn new(provider_type: TranslationProvider) -> Self {
        let (model, endpoint) = match provider_type {
            TranslationProvider::Ollama => (default_ollama_model(), default_ollama_endpoint()),
            TranslationProvider::OpenAI => (default_openai_model(), default_openai_endpoint()),
            TranslationProvider::LMStudio => (default_lmstudio_model(), default_lmstudio_endpoint()),
            TranslationProvider::Mock => ("mock".to_string(), String::new()),
        };
        Self {
            provider_type: provider_type.to_lowercase_string(),
            model,
            api_key: String::new(),
            endpoint,
            timeout_secs: default_timeout_secs(),
        }
    }
}

/// Pipeline scheduling configuration
#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct PipelineConfig {
    /// `strict` fails the job on the first failed segment, `lenient` keeps going
    #[serde(default)]
    pub failure_policy: FailurePolicy,

    /// Maximum number of segments translated at the same time
    #[serde(default = "default_max_concurrent_translations")]
    pub max_concurrent_translations: usize,

    /// Retry count for transient translation failures
    #[serde(default = "default_retry_count")]
    pub retry_count: u32,

    /// Base backoff for retries (in milliseconds), doubled on each retry
    #[serde(default = "default_retry_backoff_ms")]
    pub retry_backoff_ms: u64,

    /// Upper bound for one backoff (in milliseconds)
    #[serde(default = "default_max_backoff_ms")]
    pub max_backoff_ms: u64,

    /// Timeout for a single translation attempt, 0 disables it
    #[serde(default = "default_translation_timeout_secs")]
    pub translation_timeout_secs: u64,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            failure_policy: FailurePolicy::default(),
            max_concurrent_translations: default_max_concurrent_translations(),
            retry_count: default_retry_count(),
            retry_backoff_ms: default_retry_backoff_ms(),
            max_backoff_ms: default_max_backoff_ms(),
            translation_timeout_secs: default_translation_timeout_secs(),
        }
    }
}

/// Preprocessor kind
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Default)]
#[serde(rename_all = "lowercase")]
pub enum PreprocessorKind {
    /// Run the C preprocessor
    #[default]
    Gcc,
    /// Only strip include directives
    Passthrough,
}

/// Preprocessor configuration
#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct PreprocessorConfig {
    #[serde(default)]
    pub kind: PreprocessorKind,

    /// Preprocessor executable
    #[serde(default = "default_preprocessor_command")]
    pub command: String,

    /// Additional flags passed before the input
    #[serde(default)]
    pub extra_flags: Vec<String>,

    /// Extra include directories
    #[serde(default)]
    pub include_paths: Vec<PathBuf>,
}

impl Default for PreprocessorConfig {
    fn default() -> Self {
        Self {
            kind: PreprocessorKind::default(),
            command: default_preprocessor_command(),
            extra_flags: Vec::new(),
            include_paths: Vec::new(),
        }
    }
}

/// Translation service configuration
#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct TranslationConfig {
    /// Translation provider to use
    #[serde(default)]
    pub provider: TranslationProvider,

    /// Available translation providers
    #[serde(default = "default_available_providers")]
    pub available_providers: Vec<ProviderConfig>,

    /// Prompt template, `{source}` is replaced by the segment
    #[serde(default = "default_prompt_template")]
    pub prompt_template: String,

    /// Temperature parameter for text generation (0.0 to 1.0)
    #[serde(default = "default_temperature")]
    pub temperature: f32,

    /// First-line prefixes marking a translator diagnostic instead of code
    #[serde(default = "default_diagnostic_markers")]
    pub diagnostic_markers: Vec<String>,
}

impl Default for TranslationConfig {
    fn default() -> Self {
        Self {
            provider: TranslationProvider::default(),
            available_providers: default_available_providers(),
            prompt_template: default_prompt_template(),
            temperature: default_temperature(),
            diagnostic_markers: default_diagnostic_markers(),
        }
    }
}

/// Job artifact storage
#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct StorageConfig {
    /// Directory holding one sub-directory per job
    #[serde(default = "default_storage_root")]
    pub root: PathBuf,

    /// Keep job directories after completion
    #[serde(default)]
    pub retain_artifacts: bool,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            root: default_storage_root(),
            retain_artifacts: false,
        }
    }
}

/// Log verbosity level
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Default)]
#[serde(rename_all = "lowercase")]
pub enum LogLevel {
    Error,
    Warn,
    #[default]
    Info,
    Debug,
    Trace,
}

impl LogLevel {
    pub fn to_level_filter(&self) -> LevelFilter {
        match self {
            LogLevel::Error => LevelFilter::Error,
            LogLevel::Warn => LevelFilter::Warn,
            LogLevel::Info => LevelFilter::Info,
            LogLevel::Debug => LevelFilter::Debug,
            LogLevel::Trace => LevelFilter::Trace,
        }
    }
}

fn default_max_concurrent_translations() -> usize {
    4
}

fn default_timeout_secs() -> u64 {
    120
}

fn default_retry_count() -> u32 {
    3 // Default to 3 retries
}

fn default_retry_backoff_ms() -> u64 {
    1000 // 1 second base backoff time, doubled on each retry
}

fn default_max_backoff_ms() -> u64 {
    30_000
}

fn default_translation_timeout_secs() -> u64 {
    120
}

fn default_temperature() -> f32 {
    0.2
}

fn default_preprocessor_command() -> String {
    "gcc".to_string()
}

fn default_storage_root() -> PathBuf {
    std::env::temp_dir().join("c2rust-pipeline")
}

fn default_prompt_template() -> String {
    DEFAULT_PROMPT_TEMPLATE.to_string()
}

fn default_ollama_endpoint() -> String {
    "http://localhost:11434".to_string()
}

fn default_openai_endpoint() -> String {
    "https://api.openai.com/v1".to_string()
}

fn default_lmstudio_endpoint() -> String {
    // LM Studio default server (OpenAI compatible) runs on port 1234 under /v1
    "http://localhost:1234/v1".to_string()
}

fn default_ollama_model() -> String {
    "codellama".to_string()
}

fn default_openai_model() -> String {
    "gpt-4o-mini".to_string()
}

fn default_lmstudio_model() -> String {
    // Placeholder; users should set to the loaded model name in LM Studio
    "local-model".to_string()
}

fn default_available_providers() -> Vec<ProviderConfig> {
    vec![
        ProviderConfig::new(TranslationProvider::Ollama),
        ProviderConfig::new(TranslationProvider::OpenAI),
        ProviderConfig::new(TranslationProvider::LMStudio),
    ]
}

impl Config {
    /// Validate the configuration for consistency and required values
    pub fn validate(&self) -> Result<()> {
        if self.pipeline.max_concurrent_translations == 0 {
            return Err(anyhow!("pipeline.max_concurrent_translations must be at least 1"));
        }

        if self.translation.prompt_template.trim().is_empty() {
            return Err(anyhow!("translation.prompt_template must not be empty"));
        }
        if !self.translation.prompt_template.contains("{source}") {
            return Err(anyhow!("translation.prompt_template must contain the {{source}} placeholder"));
        }

        if self.preprocessor.kind == PreprocessorKind::Gcc && self.preprocessor.command.trim().is_empty() {
            return Err(anyhow!("preprocessor.command is required for the gcc preprocessor"));
        }

        // Validate API key for hosted providers
        if self.translation.provider == TranslationProvider::OpenAI && self.translation.get_api_key().is_empty() {
            return Err(anyhow!("Translation API key is required for OpenAI provider"));
        }

        Ok(())
    }

    /// Load a configuration file, creating it with defaults when missing
    pub fn load_or_create<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        if path.exists() {
            let file = File::open(path).context(format!("Failed to open config file: {:?}", path))?;
            let reader = BufReader::new(file);
            let config: Config =
                serde_json::from_reader(reader).context(format!("Failed to parse config file: {:?}", path))?;
            return Ok(config);
        }

        warn!("Config file not found at {:?}, creating default config.", path);
        let config = Config::default();
        config.save(path)?;
        Ok(config)
    }

    /// Write the configuration as pretty JSON
    pub fn save<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let path = path.as_ref();
        let config_json = serde_json::to_string_pretty(self).context("Failed to serialize config to JSON")?;
        std::fs::write(path, config_json).context(format!("Failed to write config to file: {:?}", path))?;
        Ok(())
    }

    /// Engine options derived from the pipeline and preprocessor sections
    pub fn pipeline_options(&self) -> PipelineOptions {
        let timeout = match self.pipeline.translation_timeout_secs {
            0 => None,
            secs => Some(Duration::from_secs(secs)),
        };
        PipelineOptions {
            failure_policy: self.pipeline.failure_policy,
            max_concurrent_translations: self.pipeline.max_concurrent_translations,
            retry: RetryPolicy::with_retries(
                self.pipeline.retry_count,
                self.pipeline.retry_backoff_ms,
                self.pipeline.max_backoff_ms,
            ),
            translation_timeout: timeout,
            include_paths: self.preprocessor.include_paths.clone(),
        }
    }
}

/// Default implementation for Config
impl Default for Config {
    fn default() -> Self {
        Config {
            pipeline: PipelineConfig::default(),
            preprocessor: PreprocessorConfig::default(),
            translation: TranslationConfig::default(),
            storage: StorageConfig::default(),
            log_level: LogLevel::default(),
        }
    }
}

impl TranslationConfig {
    /// Get the active provider configuration from the available_providers array
    pub fn get_active_provider_config(&self) -> Option<&ProviderConfig> {
        self.get_provider_config(&self.provider)
    }

    /// Get a specific provider configuration by type
    pub fn get_provider_config(&self, provider_type: &TranslationProvider) -> Option<&ProviderConfig> {
        let provider_str = provider_type.to_lowercase_string();
        self.available_providers.iter().find(|p| p.provider_type == provider_str)
    }

    /// Mutable access to the active provider's configuration, created on demand
    pub fn active_provider_config_mut(&mut self) -> &mut ProviderConfig {
        let provider_str = self.provider.to_lowercase_string();
        let index = match self.available_providers.iter().position(|p| p.provider_type == provider_str) {
            Some(index) => index,
            None => {
                self.available_providers.push(ProviderConfig::new(self.provider.clone()));
                self.available_providers.len() - 1
            }
        };
        &mut self.available_providers[index]
    }

    /// Get the model for the active provider
    pub fn get_model(&self) -> String {
        match self.get_active_provider_config() {
            Some(config) if !config.model.is_empty() => config.model.clone(),
            _ => ProviderConfig::new(self.provider.clone()).model,
        }
    }

    /// Get the API key for the active provider
    pub fn get_api_key(&self) -> String {
        self.get_active_provider_config()
            .map(|config| config.api_key.clone())
            .unwrap_or_default()
    }

    /// Get the endpoint for the active provider
    pub fn get_endpoint(&self) -> String {
        match self.get_active_provider_config() {
            Some(config) if !config.endpoint.is_empty() => config.endpoint.clone(),
            _ => ProviderConfig::new(self.provider.clone()).endpoint,
        }
    }

    /// Get the HTTP timeout for the active provider
    pub fn get_timeout_secs(&self) -> u64 {
        self.get_active_provider_config()
            .map(|config| config.timeout_secs)
            .unwrap_or_else(default_timeout_secs)
    }

    /// Prompt handling passed to LLM-backed translators
    pub fn prompt_settings(&self) -> PromptSettings {
        PromptSettings {
            template: self.prompt_template.clone(),
            temperature: self.temperature,
            diagnostic_markers: self.diagnostic_markers.clone(),
        }
    }
}
