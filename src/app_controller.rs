use anyhow::{anyhow, Context, Result};
use indicatif::{MultiProgress, ProgressBar, ProgressStyle};
use log::{error, info, warn};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::mpsc;

use crate::app_config::{Config, PreprocessorKind, TranslationProvider};
use crate::file_utils::FileManager;
use crate::pipeline::workspace::{FINAL_OUTPUT_FILE, METADATA_FILE, SEGMENTS_DIR};
use crate::pipeline::{Diagnostic, FinalArtifact, JobManager, PipelineEngine, PipelineEvent, Severity, SubmitOptions};
use crate::providers::{
    CDeclarationScanner, GccPreprocessor, MockTranslator, OllamaTranslator, OpenAiTranslator,
    PassthroughPreprocessor, Preprocessor, Translator,
};
use crate::transpile::merge::{MergeArtifact, Merger};

// @module: Application controller for C to Rust translation jobs

/// Name of the issues log written next to translated files
pub const ISSUES_LOG_FILE: &str = "c2rust-pipeline.issues.log";

/// Grace period for the result once the event stream has closed
const RESULT_GRACE: Duration = Duration::from_secs(30);

/// Main application controller wiring configuration, adapters and the job manager
pub struct Controller {
    // @field: App configuration
    config: Config,
}

impl Controller {
    // @method: Create a new controller with the given configuration
    pub fn with_config(config: Config) -> Result<Self> {
        config.validate()?;
        Ok(Self { config })
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Build a pipeline engine from the configured adapters
    pub fn build_engine(&self) -> Result<PipelineEngine> {
        let preprocessor: Arc<dyn Preprocessor> = match self.config.preprocessor.kind {
            PreprocessorKind::Gcc => Arc::new(
                GccPreprocessor::new(self.config.preprocessor.command.clone())
                    .with_extra_flags(self.config.preprocessor.extra_flags.clone()),
            ),
            PreprocessorKind::Passthrough => Arc::new(PassthroughPreprocessor),
        };

        Ok(PipelineEngine::new(
            preprocessor,
            Arc::new(CDeclarationScanner::new()),
            self.build_translator()?,
            self.config.pipeline_options(),
        ))
    }

    /// Build the translator for the active provider
    pub fn build_translator(&self) -> Result<Arc<dyn Translator>> {
        let translation = &self.config.translation;
        let settings = translation.prompt_settings();
        let translator: Arc<dyn Translator> = match translation.provider {
            TranslationProvider::Ollama => Arc::new(
                OllamaTranslator::new(&translation.get_endpoint(), translation.get_model(), translation.get_timeout_secs())
                    .with_settings(settings),
            ),
            TranslationProvider::OpenAI | TranslationProvider::LMStudio => {
                let endpoint = translation.get_endpoint();
                if translation.provider == TranslationProvider::LMStudio && endpoint.is_empty() {
                    return Err(anyhow!("An endpoint is required for the LM Studio provider"));
                }
                Arc::new(
                    OpenAiTranslator::new(
                        translation.get_api_key(),
                        &endpoint,
                        translation.get_model(),
                        translation.get_timeout_secs(),
                    )
                    .with_settings(settings),
                )
            }
            TranslationProvider::Mock => Arc::new(MockTranslator::working()),
        };
        Ok(translator)
    }

    /// Translate one C file into `<output_dir>/<stem>.rs`
    pub async fn run(&self, input_file: PathBuf, output_dir: PathBuf, force_overwrite: bool) -> Result<Option<PathBuf>> {
        let multi_progress = MultiProgress::new();
        let engine = Arc::new(self.build_engine()?);
        self.run_with_progress(&engine, &input_file, &output_dir, &multi_progress, force_overwrite)
            .await
    }

    /// Run one file through a fresh job, reporting segment progress
    async fn run_with_progress(
        &self,
        engine: &Arc<PipelineEngine>,
        input_file: &Path,
        output_dir: &Path,
        multi_progress: &MultiProgress,
        force_overwrite: bool,
    ) -> Result<Option<PathBuf>> {
        let start_time = Instant::now();

        FileManager::require_file(input_file)?;
        FileManager::ensure_dir(output_dir)?;

        let output_path = FileManager::generate_output_path(input_file, output_dir, "rs");
        if output_path.exists() && !force_overwrite {
            warn!("Skipping file, translation already exists (use -f to force overwrite)");
            return Ok(None);
        }

        let source = FileManager::read_to_string(input_file)?;

        info!(
            "c2rust-pipeline: {} - {}",
            self.config.translation.provider.display_name(),
            self.config.translation.get_model()
        );

        let manager = JobManager::new(
            Arc::clone(engine),
            &self.config.storage.root,
            self.config.storage.retain_artifacts,
        );
        let (event_tx, mut event_rx) = mpsc::unbounded_channel();
        let job_id = manager.submit_with(
            source,
            SubmitOptions {
                events: Some(event_tx),
                ..SubmitOptions::default()
            },
        )?;

        let progress_bar = multi_progress.add(ProgressBar::new(0));
        let template_result = ProgressStyle::default_bar()
            .template("{spinner:.green} [{elapsed_precise}] [{bar:40.cyan/blue}] {pos}/{len} segments ({percent}%) {msg} {eta}")
            .or_else(|_| ProgressStyle::default_bar().template("{spinner} [{elapsed_precise}] [{bar:40}] {pos}/{len} ({percent}%) {msg}"))
            .unwrap_or_else(|_| ProgressStyle::default_bar());
        progress_bar.set_style(template_result.progress_chars("█▓▒░"));

        // The event stream closes when the job has ended
        loop {
            tokio::select! {
                event = event_rx.recv() => match event {
                    Some(PipelineEvent::StageChanged(stage)) => progress_bar.set_message(stage.to_string()),
                    Some(PipelineEvent::SegmentsPlanned { total }) => progress_bar.set_length(total as u64),
                    Some(PipelineEvent::SegmentFinished { finished, .. }) => progress_bar.set_position(finished as u64),
                    Some(PipelineEvent::Diagnostic(_)) => {}
                    None => break,
                },
                _ = tokio::signal::ctrl_c() => {
                    warn!("Interrupted, cancelling job {}", job_id);
                    manager.cancel(&job_id)?;
                }
            }
        }
        progress_bar.finish_and_clear();

        let result = manager.await_result(&job_id, RESULT_GRACE).await;
        let artifact = match result {
            Ok(artifact) => artifact,
            Err(e) => {
                self.write_issues(output_dir, input_file, &manager.status(&job_id)?.diagnostics)?;
                return Err(e).with_context(|| format!("Translation of {:?} failed", input_file));
            }
        };

        FileManager::write_to_file(&output_path, artifact.final_text())?;
        self.report(&artifact, start_time.elapsed());
        self.write_issues(output_dir, input_file, &artifact.diagnostics)?;
        info!("Success: {}", output_path.display());

        Ok(Some(output_path))
    }

    /// Log a short summary of a finished job
    fn report(&self, artifact: &FinalArtifact, elapsed: Duration) {
        let merge = &artifact.merge;
        if merge.failed_segments.is_empty() {
            info!(
                "Translated {} segment(s) in {} ({} duplicate(s) removed)",
                artifact.manifest.len(),
                Self::format_duration(elapsed),
                merge.duplicates_removed.len()
            );
        } else {
            warn!(
                "Translated {} segment(s) in {} with {} placeholder(s): {}",
                artifact.manifest.len(),
                Self::format_duration(elapsed),
                merge.failed_segments.len(),
                merge.failed_segments.iter().map(|id| id.to_string()).collect::<Vec<_>>().join(", ")
            );
        }
        if let Some(path) = &artifact.output_path {
            info!("Job artifacts kept at {}", path.display());
        }
    }

    /// Append job diagnostics to the issues log in `output_dir`
    fn write_issues(&self, output_dir: &Path, input_file: &Path, diagnostics: &[Diagnostic]) -> Result<()> {
        if diagnostics.is_empty() {
            return Ok(());
        }
        let log_path = output_dir.join(ISSUES_LOG_FILE);
        FileManager::append_to_log_file(
            &log_path,
            &format!(
                "{} ({} - {})",
                input_file.display(),
                self.config.translation.provider.display_name(),
                self.config.translation.get_model()
            ),
        )?;
        for diagnostic in diagnostics {
            let level = match diagnostic.severity {
                Severity::Warning => "WARN",
                Severity::Error => "ERROR",
            };
            FileManager::append_to_log_file(
                &log_path,
                &format!("[{}] {}: {}", level, diagnostic.stage, diagnostic.message),
            )?;
        }
        info!("Issues written to {}", log_path.display());
        Ok(())
    }

    /// Translate every `.c` file under `input_dir`, writing next to each source
    pub async fn run_folder(&self, input_dir: PathBuf, force_overwrite: bool) -> Result<()> {
        let start_time = Instant::now();

        if !FileManager::dir_exists(&input_dir) {
            return Err(anyhow!("Input directory does not exist: {:?}", input_dir));
        }

        let source_files = FileManager::find_files(&input_dir, "c")?;
        if source_files.is_empty() {
            return Err(anyhow!("No C source files found in directory: {:?}", input_dir));
        }

        let engine = Arc::new(self.build_engine()?);
        let multi_progress = MultiProgress::new();
        let folder_pb = multi_progress.add(ProgressBar::new(source_files.len() as u64));
        let template_result = ProgressStyle::default_bar()
            .template("{spinner:.green} [{elapsed_precise}] [{bar:40.cyan/blue}] {pos}/{len} files ({percent}%) {msg} {eta}")
            .or_else(|_| ProgressStyle::default_bar().template("{spinner} [{elapsed_precise}] [{bar:40}] {pos}/{len} ({percent}%) {msg}"))
            .unwrap_or_else(|_| ProgressStyle::default_bar());
        folder_pb.set_style(template_result.progress_chars("█▓▒░"));

        let mut success_count = 0;
        let mut error_count = 0;
        let mut skip_count = 0;

        for source_file in &source_files {
            let file_name = source_file
                .file_name()
                .map(|f| f.to_string_lossy().to_string())
                .unwrap_or_else(|| "unknown".to_string());
            folder_pb.set_message(format!("Processing: {}", file_name));

            let output_dir = source_file.parent().map(Path::to_path_buf).unwrap_or_else(|| input_dir.clone());
            match self
                .run_with_progress(&engine, source_file, &output_dir, &multi_progress, force_overwrite)
                .await
            {
                Ok(Some(_)) => success_count += 1,
                Ok(None) => skip_count += 1,
                Err(e) => {
                    error!("Error processing file {}: {:#}", file_name, e);
                    error_count += 1;
                }
            }
            folder_pb.inc(1);
        }

        folder_pb.finish_with_message("Folder processing complete");

        let summary_message = format!(
            "Folder processing completed: {} processed, {} skipped, {} errors",
            success_count, skip_count, error_count
        );
        info!("{}", summary_message);
        FileManager::append_to_log_file(
            input_dir.join(ISSUES_LOG_FILE),
            &format!("{} - Duration: {}", summary_message, Self::format_duration(start_time.elapsed())),
        )?;

        Ok(())
    }

    /// Run the planning stages only and render the manifest as JSON
    pub async fn plan(&self, input_file: &Path) -> Result<String> {
        FileManager::require_file(input_file)?;
        let source = FileManager::read_to_string(input_file)?;
        let engine = self.build_engine()?;
        let report = engine
            .plan(&source)
            .await
            .with_context(|| format!("Planning {:?} failed", input_file))?;
        for diagnostic in &report.diagnostics {
            warn!("{}", diagnostic.message);
        }
        serde_json::to_string_pretty(&report).context("Failed to serialize plan")
    }

    /// Re-merge the segments of a retained job directory
    pub fn merge_dir(&self, job_dir: &Path, output: Option<PathBuf>) -> Result<(PathBuf, MergeArtifact)> {
        if !FileManager::dir_exists(job_dir) {
            return Err(anyhow!("Job directory does not exist: {:?}", job_dir));
        }
        let artifact = Merger::new()
            .merge_directory(&job_dir.join(SEGMENTS_DIR), &job_dir.join(METADATA_FILE))
            .with_context(|| format!("Failed to merge job directory {:?}", job_dir))?;

        let output_path = output.unwrap_or_else(|| job_dir.join(FINAL_OUTPUT_FILE));
        FileManager::write_to_file(&output_path, &artifact.final_text)?;
        info!(
            "Merged {} segment(s) into {} ({} duplicate(s) removed)",
            artifact.ordered_unique_segments.len(),
            output_path.display(),
            artifact.duplicates_removed.len()
        );
        Ok((output_path, artifact))
    }

    // Format duration in a human-readable format (HH:MM:SS)
    pub fn format_duration(duration: Duration) -> String {
        let total_seconds = duration.as_secs();
        let hours = total_seconds / 3600;
        let minutes = (total_seconds % 3600) / 60;
        let seconds = total_seconds % 60;

        if hours > 0 {
            format!("{}h {}m {}s", hours, minutes, seconds)
        } else if minutes > 0 {
            format!("{}m {}s", minutes, seconds)
        } else {
            format!("{}.{:03}s", seconds, duration.subsec_millis())
        }
    }
}
