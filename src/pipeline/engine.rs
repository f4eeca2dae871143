/*!
 * Pipeline engine.
 *
 * Runs the declared stages in order for one job: normalize, extract, build
 * the dependency graph, segment, generate the manifest, translate every
 * segment concurrently, wait on the fan-in barrier, and merge. Every stage
 * writes its artifact into the job workspace.
 */

use log::{debug, error, info, warn};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc::UnboundedSender;
use tokio::sync::{watch, Semaphore};
use tokio::task::JoinSet;

use crate::errors::PipelineError;
use crate::providers::{Preprocessor, SymbolExtractor, Translator};
use crate::transpile::graph::DependencyGraph;
use crate::transpile::manifest::{self, Manifest};
use crate::transpile::merge::{MergeArtifact, Merger, TranslatedSegment};
use crate::transpile::outcome::{OutcomeStatus, TranslationOutcome};
use crate::transpile::segmenter::{self, SegmentMap};
use crate::transpile::symbols::Symbol;

use super::barrier::FanInBarrier;
use super::retry::{translate_with_retry, RetryPolicy};
use super::stages::{JobStage, StageGraph, StageNode};
use super::workspace::{self, JobWorkspace};

/// What to do when a segment fails to translate
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FailurePolicy {
    /// The first failure fails the whole job
    Strict,
    /// Failures become placeholders in the merged output
    #[default]
    Lenient,
}

impl fmt::Display for FailurePolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Strict => write!(f, "strict"),
            Self::Lenient => write!(f, "lenient"),
        }
    }
}

impl FromStr for FailurePolicy {
    type Err = PipelineError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "strict" => Ok(Self::Strict),
            "lenient" => Ok(Self::Lenient),
            other => Err(PipelineError::Config(format!(
                "Unknown failure policy '{}', expected 'strict' or 'lenient'",
                other
            ))),
        }
    }
}

/// Severity of a job diagnostic
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Warning,
    Error,
}

/// A message attached to a job
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Diagnostic {
    pub stage: JobStage,
    pub severity: Severity,
    pub message: String,
}

/// Progress notifications emitted while a job runs
#[derive(Debug, Clone, PartialEq)]
pub enum PipelineEvent {
    /// The job entered a new stage
    StageChanged(JobStage),
    /// The manifest is known; `total` segments will be translated
    SegmentsPlanned { total: usize },
    /// One segment reached a terminal outcome
    SegmentFinished {
        segment_id: String,
        success: bool,
        finished: usize,
        total: usize,
    },
    Diagnostic(Diagnostic),
}

/// Engine tuning
#[derive(Debug, Clone)]
pub struct PipelineOptions {
    pub failure_policy: FailurePolicy,
    /// Upper bound on concurrently running translations
    pub max_concurrent_translations: usize,
    pub retry: RetryPolicy,
    /// Per-attempt translation timeout
    pub translation_timeout: Option<Duration>,
    /// Extra include directories for the preprocessor
    pub include_paths: Vec<PathBuf>,
}

impl Default for PipelineOptions {
    fn default() -> Self {
        Self {
            failure_policy: FailurePolicy::default(),
            max_concurrent_translations: 4,
            retry: RetryPolicy::default(),
            translation_timeout: Some(Duration::from_secs(120)),
            include_paths: Vec::new(),
        }
    }
}

/// Everything a single run needs besides the source text
#[derive(Debug)]
pub struct JobContext {
    pub job_id: String,
    pub workspace: JobWorkspace,
    pub cancel: watch::Receiver<bool>,
    pub events: Option<UnboundedSender<PipelineEvent>>,
    /// Overrides the engine's failure policy for this job
    pub failure_policy: Option<FailurePolicy>,
}

impl JobContext {
    pub fn new(job_id: impl Into<String>, workspace: JobWorkspace, cancel: watch::Receiver<bool>) -> Self {
        Self {
            job_id: job_id.into(),
            workspace,
            cancel,
            events: None,
            failure_policy: None,
        }
    }

    pub fn with_events(mut self, events: UnboundedSender<PipelineEvent>) -> Self {
        self.events = Some(events);
        self
    }

    pub fn with_failure_policy(mut self, policy: FailurePolicy) -> Self {
        self.failure_policy = Some(policy);
        self
    }
}

/// Result of a completed job
#[derive(Debug, Clone)]
pub struct FinalArtifact {
    pub job_id: String,
    pub merge: MergeArtifact,
    pub manifest: Manifest,
    /// `final_output.rs` inside the workspace, when the workspace was retained
    pub output_path: Option<PathBuf>,
    pub diagnostics: Vec<Diagnostic>,
}

impl FinalArtifact {
    pub fn final_text(&self) -> &str {
        &self.merge.final_text
    }
}

/// Output of the planning stages only
#[derive(Debug, Clone, Serialize)]
pub struct PlanReport {
    pub symbols: Vec<Symbol>,
    pub manifest: Manifest,
    pub diagnostics: Vec<Diagnostic>,
}

/// Intermediate results carried between stages
#[derive(Debug, Default)]
struct JobState {
    normalized: Option<String>,
    symbols: Option<Vec<Symbol>>,
    graph: Option<DependencyGraph>,
    segments: Option<SegmentMap>,
    manifest: Option<Manifest>,
    outcomes: Option<Vec<TranslationOutcome>>,
    merge: Option<MergeArtifact>,
}

fn missing(node: StageNode, input: &str) -> PipelineError {
    PipelineError::Internal(format!("stage {} ran before {} was available", node, input))
}

/// Tracks the job stage and forwards events
#[derive(Debug)]
struct Progress {
    stage: JobStage,
    events: Option<UnboundedSender<PipelineEvent>>,
    diagnostics: Vec<Diagnostic>,
}

impl Progress {
    fn new(events: Option<UnboundedSender<PipelineEvent>>) -> Self {
        Self {
            stage: JobStage::Pending,
            events,
            diagnostics: Vec::new(),
        }
    }

    fn emit(&self, event: PipelineEvent) {
        if let Some(events) = &self.events {
            // A listener that went away is not an error for the job
            let _ = events.send(event);
        }
    }

    fn enter(&mut self, next: JobStage) -> Result<(), PipelineError> {
        if next == self.stage {
            return Ok(());
        }
        if !self.stage.can_transition_to(next) {
            return Err(PipelineError::Internal(format!(
                "invalid stage transition {} -> {}",
                self.stage, next
            )));
        }
        debug!("Job stage {} -> {}", self.stage, next);
        self.stage = next;
        self.emit(PipelineEvent::StageChanged(next));
        Ok(())
    }

    fn diagnostic(&mut self, severity: Severity, message: impl Into<String>) {
        let diagnostic = Diagnostic {
            stage: self.stage,
            severity,
            message: message.into(),
        };
        self.emit(PipelineEvent::Diagnostic(diagnostic.clone()));
        self.diagnostics.push(diagnostic);
    }

    fn fail(&mut self, err: &PipelineError) {
        if let Some(stage) = err.stage() {
            if stage != self.stage && self.stage.can_transition_to(stage) {
                self.stage = stage;
            }
        }
        self.diagnostic(Severity::Error, format!("{} failed: {}", self.stage, err));
        if self.stage.can_transition_to(JobStage::Failed) {
            self.stage = JobStage::Failed;
            self.emit(PipelineEvent::StageChanged(JobStage::Failed));
        }
    }
}

/// Resolve when the cancel flag becomes true; never if the sender is gone
async fn cancelled(cancel: &mut watch::Receiver<bool>) {
    loop {
        if *cancel.borrow_and_update() {
            return;
        }
        if cancel.changed().await.is_err() {
            std::future::pending::<()>().await;
        }
    }
}

/// Sequences the pipeline stages over pluggable adapters
#[derive(Debug)]
pub struct PipelineEngine {
    preprocessor: Arc<dyn Preprocessor>,
    extractor: Arc<dyn SymbolExtractor>,
    translator: Arc<dyn Translator>,
    merger: Merger,
    options: PipelineOptions,
    stages: StageGraph,
}

impl PipelineEngine {
    pub fn new(
        preprocessor: Arc<dyn Preprocessor>,
        extractor: Arc<dyn SymbolExtractor>,
        translator: Arc<dyn Translator>,
        options: PipelineOptions,
    ) -> Self {
        Self {
            preprocessor,
            extractor,
            translator,
            merger: Merger::new(),
            options,
            stages: StageGraph::standard(),
        }
    }

    pub fn options(&self) -> &PipelineOptions {
        &self.options
    }

    pub fn translator_name(&self) -> String {
        self.translator.name()
    }

    /// Run the planning stages (normalize through manifest) without translating
    pub async fn plan(&self, raw_source: &str) -> Result<PlanReport, PipelineError> {
        let normalized = self.preprocessor.normalize(raw_source, &self.options.include_paths).await?;
        let symbols = self.extractor.extract(&normalized)?;
        let graph = DependencyGraph::build(&symbols);
        let segmentation = segmenter::segment(&normalized, &symbols);
        let manifest = manifest::generate(&symbols, &segmentation.segments, &graph)?;

        let diagnostics = segmentation
            .skipped
            .iter()
            .map(|skip| Diagnostic {
                stage: JobStage::Segmenting,
                severity: Severity::Warning,
                message: skip.to_string(),
            })
            .collect();

        Ok(PlanReport { symbols, manifest, diagnostics })
    }

    /// Run a whole job.
    ///
    /// The workspace is released when the run ends, whatever the outcome.
    pub async fn run(&self, raw_source: &str, context: JobContext) -> Result<FinalArtifact, PipelineError> {
        let JobContext {
            job_id,
            workspace,
            mut cancel,
            events,
            failure_policy,
        } = context;
        let policy = failure_policy.unwrap_or(self.options.failure_policy);
        let mut progress = Progress::new(events);

        info!("Starting job {} with translator {} ({} policy)", job_id, self.translator.name(), policy);

        let result = self.run_stages(raw_source, &workspace, &mut cancel, &mut progress, policy).await;

        let result = match result {
            Ok((merge, manifest)) => workspace
                .release()
                .map(|retained| (merge, manifest, retained))
                .map_err(PipelineError::from),
            Err(err) => {
                if let Err(release_err) = workspace.release() {
                    warn!("Failed to release workspace of job {}: {}", job_id, release_err);
                }
                Err(err)
            }
        };

        match result {
            Ok((merge, manifest, retained)) => {
                progress.enter(JobStage::Completed)?;
                info!("Job {} completed", job_id);
                Ok(FinalArtifact {
                    job_id,
                    merge,
                    manifest,
                    output_path: retained.map(|root| root.join(workspace::FINAL_OUTPUT_FILE)),
                    diagnostics: progress.diagnostics,
                })
            }
            Err(err) => {
                error!("Job {} failed: {}", job_id, err);
                progress.fail(&err);
                Err(err)
            }
        }
    }

    async fn run_stages(
        &self,
        raw_source: &str,
        workspace: &JobWorkspace,
        cancel: &mut watch::Receiver<bool>,
        progress: &mut Progress,
        policy: FailurePolicy,
    ) -> Result<(MergeArtifact, Manifest), PipelineError> {
        workspace.write(workspace::INPUT_FILE, raw_source)?;
        let mut state = JobState::default();

        for node in self.stages.execution_order().iter().copied() {
            if *cancel.borrow() {
                return Err(PipelineError::Cancelled);
            }
            progress.enter(node.job_stage())?;
            debug!("Running stage {}", node);

            match node {
                StageNode::Normalize => {
                    let normalized = tokio::select! {
                        result = self.preprocessor.normalize(raw_source, &self.options.include_paths) => result?,
                        _ = cancelled(cancel) => return Err(PipelineError::Cancelled),
                    };
                    workspace.write(workspace::NORMALIZED_FILE, &normalized)?;
                    state.normalized = Some(normalized);
                }
                StageNode::Extract => {
                    let normalized = state.normalized.as_deref().ok_or_else(|| missing(node, "normalized source"))?;
                    let symbols = self.extractor.extract(normalized)?;
                    info!("Extracted {} symbol(s)", symbols.len());
                    workspace.write_json(workspace::SYMBOLS_FILE, &symbols)?;
                    state.symbols = Some(symbols);
                }
                StageNode::BuildGraph => {
                    let symbols = state.symbols.as_deref().ok_or_else(|| missing(node, "symbols"))?;
                    let graph = DependencyGraph::build(symbols);
                    // Surface cycles while the job is still in the graph stage
                    graph.topological_order()?;
                    state.graph = Some(graph);
                }
                StageNode::Segment => {
                    let normalized = state.normalized.as_deref().ok_or_else(|| missing(node, "normalized source"))?;
                    let symbols = state.symbols.as_deref().ok_or_else(|| missing(node, "symbols"))?;
                    let segmentation = segmenter::segment(normalized, symbols);
                    for skip in &segmentation.skipped {
                        progress.diagnostic(Severity::Warning, skip.to_string());
                    }
                    for segment in segmentation.segments.iter() {
                        workspace.write_segment(&manifest::source_file_name(&segment.id), &segment.source_text)?;
                    }
                    state.segments = Some(segmentation.segments);
                }
                StageNode::GenerateManifest => {
                    let symbols = state.symbols.as_deref().ok_or_else(|| missing(node, "symbols"))?;
                    let graph = state.graph.as_ref().ok_or_else(|| missing(node, "dependency graph"))?;
                    let segments = state.segments.as_ref().ok_or_else(|| missing(node, "segments"))?;
                    let manifest = manifest::generate(symbols, segments, graph)?;
                    workspace.write(workspace::METADATA_FILE, &manifest_json(&manifest, workspace)?)?;
                    state.manifest = Some(manifest);
                }
                StageNode::Translate => {
                    let manifest = state.manifest.as_ref().ok_or_else(|| missing(node, "manifest"))?;
                    let segments = state.segments.as_ref().ok_or_else(|| missing(node, "segments"))?;
                    let outcomes = self.translate_all(manifest, segments, cancel, progress, policy).await?;
                    for outcome in &outcomes {
                        let text = match &outcome.status {
                            OutcomeStatus::Success(text) => text.clone(),
                            OutcomeStatus::Failed(reason) => {
                                let origin = segments.get(&outcome.segment_id).map(|s| s.origin_symbol.clone());
                                TranslatedSegment::placeholder(outcome.segment_id.clone(), origin, reason).text
                            }
                        };
                        workspace.write_segment(&manifest::target_file_name(&outcome.segment_id), &text)?;
                    }
                    state.outcomes = Some(outcomes);
                }
                StageNode::Merge => {
                    let manifest = state.manifest.as_ref().ok_or_else(|| missing(node, "manifest"))?;
                    let outcomes = state.outcomes.as_deref().ok_or_else(|| missing(node, "translation outcomes"))?;
                    let merge = self.merger.merge(outcomes, manifest);
                    workspace.write(workspace::FINAL_OUTPUT_FILE, &merge.final_text)?;
                    state.merge = Some(merge);
                }
            }
        }

        let merge = state.merge.ok_or_else(|| missing(StageNode::Merge, "merge artifact"))?;
        let manifest = state.manifest.ok_or_else(|| missing(StageNode::Merge, "manifest"))?;
        Ok((merge, manifest))
    }

    /// Fan out one task per manifest entry and fan back in through the barrier
    async fn translate_all(
        &self,
        manifest: &Manifest,
        segments: &SegmentMap,
        cancel: &mut watch::Receiver<bool>,
        progress: &mut Progress,
        policy: FailurePolicy,
    ) -> Result<Vec<TranslationOutcome>, PipelineError> {
        let total = manifest.len();
        progress.emit(PipelineEvent::SegmentsPlanned { total });
        info!(
            "Translating {} segment(s) with up to {} concurrent request(s)",
            total, self.options.max_concurrent_translations
        );

        let semaphore = Arc::new(Semaphore::new(self.options.max_concurrent_translations.max(1)));
        let (mut barrier, reporters) = FanInBarrier::new(manifest.ordered_segment_ids.clone());
        let mut tasks = JoinSet::new();

        for reporter in reporters {
            let Some(segment) = segments.get(reporter.segment_id()) else {
                let reason = format!("segment {} is missing from the segment map", reporter.segment_id());
                reporter.report_failure(reason, 0);
                continue;
            };
            let source = segment.source_text.clone();
            let translator = Arc::clone(&self.translator);
            let semaphore = Arc::clone(&semaphore);
            let retry = self.options.retry.clone();
            let timeout = self.options.translation_timeout;
            let task_cancel = cancel.clone();

            tasks.spawn(async move {
                let _permit = match semaphore.acquire_owned().await {
                    Ok(permit) => permit,
                    Err(_) => {
                        reporter.report_failure("translation worker pool closed", 0);
                        return;
                    }
                };
                if *task_cancel.borrow() {
                    reporter.report_failure("job cancelled", 0);
                    return;
                }

                let (result, attempts) = translate_with_retry(translator.as_ref(), &source, &retry, timeout).await;
                match result {
                    Ok(text) => reporter.report(OutcomeStatus::Success(text), attempts),
                    Err(e) => reporter.report(OutcomeStatus::Failed(e.to_string()), attempts),
                }
            });
        }

        let mut finished = 0;
        loop {
            let outcome = tokio::select! {
                outcome = barrier.next_outcome() => outcome,
                _ = cancelled(cancel) => {
                    info!("Cancellation requested, aborting {} translation task(s)", tasks.len());
                    tasks.abort_all();
                    return Err(PipelineError::Cancelled);
                }
            };
            let Some(outcome) = outcome else { break };

            finished += 1;
            progress.emit(PipelineEvent::SegmentFinished {
                segment_id: outcome.segment_id.to_string(),
                success: outcome.is_success(),
                finished,
                total,
            });

            if let Some(reason) = outcome.failure_reason() {
                match policy {
                    FailurePolicy::Strict => {
                        semaphore.close();
                        tasks.abort_all();
                        return Err(PipelineError::TranslationFailure {
                            segment_id: outcome.segment_id.to_string(),
                            reason: reason.to_string(),
                        });
                    }
                    FailurePolicy::Lenient => {
                        warn!("Segment {} failed after {} attempt(s): {}", outcome.segment_id, outcome.attempts, reason);
                        progress.diagnostic(
                            Severity::Warning,
                            format!("segment {} failed: {}", outcome.segment_id, reason),
                        );
                    }
                }
            }
        }

        // Every task has reported; reap them so panics show up in the log
        while let Some(joined) = tasks.join_next().await {
            if let Err(e) = joined {
                warn!("Translation task ended abnormally: {}", e);
            }
        }

        Ok(barrier.into_outcomes())
    }
}

/// `metadata.json` contents: the manifest plus the job's source file
fn manifest_json(manifest: &Manifest, workspace: &JobWorkspace) -> Result<String, PipelineError> {
    let mut value = serde_json::to_value(manifest).map_err(|e| PipelineError::Internal(e.to_string()))?;
    if let Some(object) = value.as_object_mut() {
        object.insert(
            "source_file".to_string(),
            serde_json::Value::String(workspace.path().join(workspace::INPUT_FILE).display().to_string()),
        );
    }
    serde_json::to_string_pretty(&value).map_err(|e| PipelineError::Internal(e.to_string()))
}
