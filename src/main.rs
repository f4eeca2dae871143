// Module-specific lints configuration
#![allow(clippy::uninlined_format_args)]

use anyhow::{anyhow, Context, Result};
use clap::{CommandFactory, Parser, Subcommand, ValueEnum};
use clap_complete::{generate, Shell};
use log::{error, info, Level, LevelFilter, Log, Metadata, Record, SetLoggerError};
use std::io::Write;
use std::path::{Path, PathBuf};

use c2rust_pipeline::app_config::{self, Config, TranslationProvider};
use c2rust_pipeline::app_controller::Controller;
use c2rust_pipeline::errors::{AppError, PipelineError};
use c2rust_pipeline::pipeline::FailurePolicy;

/// CLI Wrapper for TranslationProvider to implement ValueEnum
#[derive(Debug, Clone, ValueEnum)]
enum CliTranslationProvider {
    Ollama,
    OpenAI,
    LMStudio,
    Mock,
}

impl From<CliTranslationProvider> for TranslationProvider {
    fn from(cli_provider: CliTranslationProvider) -> Self {
        match cli_provider {
            CliTranslationProvider::Ollama => TranslationProvider::Ollama,
            CliTranslationProvider::OpenAI => TranslationProvider::OpenAI,
            CliTranslationProvider::LMStudio => TranslationProvider::LMStudio,
            CliTranslationProvider::Mock => TranslationProvider::Mock,
        }
    }
}

/// CLI Wrapper for FailurePolicy to implement ValueEnum
#[derive(Debug, Clone, ValueEnum)]
enum CliFailurePolicy {
    Strict,
    Lenient,
}

impl From<CliFailurePolicy> for FailurePolicy {
    fn from(cli_policy: CliFailurePolicy) -> Self {
        match cli_policy {
            CliFailurePolicy::Strict => FailurePolicy::Strict,
            CliFailurePolicy::Lenient => FailurePolicy::Lenient,
        }
    }
}

/// CLI Wrapper for LogLevel to implement ValueEnum
#[derive(Debug, Clone, ValueEnum)]
enum CliLogLevel {
    Error,
    Warn,
    Info,
    Debug,
    Trace,
}

impl From<CliLogLevel> for app_config::LogLevel {
    fn from(cli_level: CliLogLevel) -> Self {
        match cli_level {
            CliLogLevel::Error => app_config::LogLevel::Error,
            CliLogLevel::Warn => app_config::LogLevel::Warn,
            CliLogLevel::Info => app_config::LogLevel::Info,
            CliLogLevel::Debug => app_config::LogLevel::Debug,
            CliLogLevel::Trace => app_config::LogLevel::Trace,
        }
    }
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Translate a C file, or every C file in a directory, to Rust
    Translate(TranslateArgs),

    /// Print the ordered segment manifest for a C file without translating
    Plan(PlanArgs),

    /// Re-merge the segments of a retained job directory
    Merge(MergeArgs),

    /// Generate shell completions for c2rust-pipeline
    Completions {
        /// Shell to generate completions for
        #[arg(value_enum)]
        shell: Shell,
    },
}

/// Options shared by every subcommand that reads the configuration
#[derive(Parser, Debug)]
struct CommonArgs {
    /// Configuration file path
    #[arg(short, long, default_value = "conf.json")]
    config_path: String,

    /// Set logging level
    #[arg(short, long, value_enum)]
    log_level: Option<CliLogLevel>,
}

#[derive(Parser, Debug)]
struct TranslateArgs {
    /// Input C file or directory to process
    #[arg(value_name = "INPUT_PATH")]
    input_path: PathBuf,

    /// Output directory (defaults to the input's directory)
    #[arg(short, long)]
    output: Option<PathBuf>,

    /// Force overwrite of existing output files
    #[arg(short, long)]
    force_overwrite: bool,

    /// Translation provider to use
    #[arg(short, long, value_enum)]
    provider: Option<CliTranslationProvider>,

    /// Model name to use for translation
    #[arg(short, long)]
    model: Option<String>,

    /// What to do when a segment fails to translate
    #[arg(long, value_enum)]
    policy: Option<CliFailurePolicy>,

    /// Maximum number of concurrent segment translations
    #[arg(short = 'j', long)]
    jobs: Option<usize>,

    /// Keep the job directory with all intermediate artifacts
    #[arg(long)]
    keep_artifacts: bool,

    #[command(flatten)]
    common: CommonArgs,
}

#[derive(Parser, Debug)]
struct PlanArgs {
    /// Input C file
    #[arg(value_name = "INPUT_PATH")]
    input_path: PathBuf,

    #[command(flatten)]
    common: CommonArgs,
}

#[derive(Parser, Debug)]
struct MergeArgs {
    /// Retained job directory (contains metadata.json and segments/)
    #[arg(value_name = "JOB_DIR")]
    job_dir: PathBuf,

    /// Output file (defaults to final_output.rs inside the job directory)
    #[arg(short, long)]
    output: Option<PathBuf>,

    #[command(flatten)]
    common: CommonArgs,
}

/// c2rust-pipeline - segment-and-merge C to Rust translation
///
/// Splits a C source file into declaration segments, translates every
/// segment concurrently with an LLM backend, and merges the results into
/// one Rust file in dependency order.
#[derive(Parser, Debug)]
#[command(name = "c2rust-pipeline")]
#[command(version)]
#[command(about = "Segment-and-merge C to Rust translation")]
#[command(long_about = "c2rust-pipeline splits C sources into declaration segments, translates them concurrently and merges the results in dependency order.

EXAMPLES:
    c2rust-pipeline translate list.c                      # Translate using default config
    c2rust-pipeline translate -f list.c                   # Force overwrite existing output
    c2rust-pipeline translate -p openai -m gpt-4o list.c  # Use specific provider and model
    c2rust-pipeline translate --policy strict -j 8 src/   # Fail fast, 8 concurrent requests
    c2rust-pipeline translate --keep-artifacts list.c     # Keep the job directory
    c2rust-pipeline plan list.c                           # Print the segment manifest
    c2rust-pipeline merge /tmp/c2rust-pipeline/job-<id>   # Re-merge a kept job
    c2rust-pipeline completions bash > c2rust.bash        # Generate bash completions

CONFIGURATION:
    Configuration is stored in conf.json by default. You can specify a different
    config file with --config-path. If the config file doesn't exist, a default one
    will be created automatically.

SUPPORTED PROVIDERS:
    ollama    - Local Ollama server (default: codellama)
    openai    - OpenAI API (requires API key)
    lmstudio  - LM Studio local server (OpenAI-compatible on http://localhost:1234/v1)
    mock      - Offline stub translator for dry runs")]
struct CommandLineOptions {
    #[command(subcommand)]
    command: Commands,
}

// @struct: Custom logger implementation
struct CustomLogger {
    level: LevelFilter,
}

impl CustomLogger {
    // @creates: New logger with specified level
    fn new(level: LevelFilter) -> Self {
        CustomLogger { level }
    }

    // @initializes: Global logger
    fn init(level: LevelFilter) -> Result<(), SetLoggerError> {
        let logger = Box::new(CustomLogger::new(level));
        log::set_boxed_logger(logger)?;
        log::set_max_level(level);
        Ok(())
    }

    // @returns: Emoji for log level
    fn get_emoji_for_level(level: Level) -> &'static str {
        match level {
            Level::Error => "❌ ",
            Level::Warn => "🚧 ",
            Level::Info => " ",
            Level::Debug => "🔍 ",
            Level::Trace => "📋 ",
        }
    }

    // @returns: ANSI color code for log level
    fn get_color_for_level(level: Level) -> &'static str {
        match level {
            Level::Error => "1;31",
            Level::Warn => "1;33",
            Level::Info => "1;32",
            Level::Debug => "1;36",
            Level::Trace => "1;35",
        }
    }
}

impl Log for CustomLogger {
    fn enabled(&self, metadata: &Metadata) -> bool {
        metadata.level() <= self.level
    }

    fn log(&self, record: &Record) {
        if self.enabled(record.metadata()) {
            let now = chrono::Local::now().format("%H:%M:%S.%3f");
            let level = record.level();

            let mut stderr = std::io::stderr();
            let _ = writeln!(
                stderr,
                "\x1B[{}m{} {} {}\x1B[0m",
                Self::get_color_for_level(level),
                now,
                Self::get_emoji_for_level(level),
                record.args()
            );
        }
    }

    fn flush(&self) {
        let _ = std::io::stderr().flush();
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize the logger with the most verbose level; the effective level
    // is set with log::set_max_level once the config is known
    CustomLogger::init(LevelFilter::Trace)?;
    log::set_max_level(LevelFilter::Info);

    let cli = CommandLineOptions::parse();

    let result = match cli.command {
        Commands::Completions { shell } => {
            let mut cmd = CommandLineOptions::command();
            generate(shell, &mut cmd, "c2rust-pipeline", &mut std::io::stdout());
            Ok(())
        }
        Commands::Translate(args) => run_translate(args).await,
        Commands::Plan(args) => run_plan(args).await,
        Commands::Merge(args) => run_merge(args),
    };

    if let Err(e) = result {
        let app_error = match e.downcast::<PipelineError>() {
            Ok(pipeline_error) => AppError::from(pipeline_error),
            Err(other) => AppError::Unknown(format!("{:#}", other)),
        };
        error!("{}", app_error);
        std::process::exit(1);
    }

    Ok(())
}

/// Load the config and apply the log level, CLI first
fn load_config(common: &CommonArgs) -> Result<Config> {
    if let Some(cmd_log_level) = &common.log_level {
        let level: app_config::LogLevel = cmd_log_level.clone().into();
        log::set_max_level(level.to_level_filter());
    }

    let mut config = Config::load_or_create(&common.config_path)?;

    if let Some(log_level) = &common.log_level {
        config.log_level = log_level.clone().into();
    } else {
        log::set_max_level(config.log_level.to_level_filter());
    }

    Ok(config)
}

async fn run_translate(options: TranslateArgs) -> Result<()> {
    let mut config = load_config(&options.common)?;

    // Override config with CLI options if provided
    if let Some(provider) = &options.provider {
        config.translation.provider = provider.clone().into();
    }
    if let Some(model) = &options.model {
        config.translation.active_provider_config_mut().model = model.clone();
    }
    if let Some(policy) = &options.policy {
        config.pipeline.failure_policy = policy.clone().into();
    }
    if let Some(jobs) = options.jobs {
        config.pipeline.max_concurrent_translations = jobs;
    }
    if options.keep_artifacts {
        config.storage.retain_artifacts = true;
    }

    // Validate the configuration after loading and overriding
    config.validate().context("Configuration validation failed")?;

    let controller = Controller::with_config(config)?;

    if options.input_path.is_file() {
        let output_dir = match &options.output {
            Some(dir) => dir.clone(),
            None => options.input_path.parent().unwrap_or(Path::new(".")).to_path_buf(),
        };
        controller
            .run(options.input_path.clone(), output_dir, options.force_overwrite)
            .await?;
    } else if options.input_path.is_dir() {
        if options.output.is_some() {
            info!("Directory mode writes each translation next to its source, ignoring --output");
        }
        controller
            .run_folder(options.input_path.clone(), options.force_overwrite)
            .await?;
    } else {
        return Err(anyhow!("Input path does not exist: {:?}", options.input_path));
    }

    Ok(())
}

async fn run_plan(options: PlanArgs) -> Result<()> {
    let config = load_config(&options.common)?;
    let controller = Controller::with_config(config)?;
    let plan = controller.plan(&options.input_path).await?;
    println!("{}", plan);
    Ok(())
}

fn run_merge(options: MergeArgs) -> Result<()> {
    let config = load_config(&options.common)?;
    let controller = Controller::with_config(config)?;
    let (output_path, _) = controller.merge_dir(&options.job_dir, options.output.clone())?;
    info!("Success: {}", output_path.display());
    Ok(())
}
