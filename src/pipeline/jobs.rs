/*!
 * Job control surface.
 *
 * `JobManager` runs pipeline jobs in the background and lets callers poll
 * their status, wait for results with a timeout, and cancel them. Each job
 * gets its own workspace directory and cancellation signal.
 */

use log::{debug, info};
use parking_lot::RwLock;
use serde::Serialize;
use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc::{self, UnboundedSender};
use tokio::sync::watch;
use uuid::Uuid;

use crate::errors::PipelineError;

use super::engine::{Diagnostic, FailurePolicy, FinalArtifact, JobContext, PipelineEngine, PipelineEvent};
use super::stages::JobStage;
use super::workspace::JobWorkspace;

/// Identifier handed out by `submit`
pub type JobId = String;

type JobResult = Result<FinalArtifact, PipelineError>;

/// Per-submission overrides
#[derive(Debug, Clone, Default)]
pub struct SubmitOptions {
    /// Keep the job directory after completion
    pub retain_artifacts: Option<bool>,
    /// Override the engine's failure policy
    pub failure_policy: Option<FailurePolicy>,
    /// Also forward pipeline events here
    pub events: Option<UnboundedSender<PipelineEvent>>,
}

/// Snapshot of a job's progress
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct JobStatus {
    pub job_id: JobId,
    pub stage: JobStage,
    pub diagnostics: Vec<Diagnostic>,
    pub segments_total: usize,
    pub segments_finished: usize,
}

impl JobStatus {
    fn new(job_id: &str) -> Self {
        Self {
            job_id: job_id.to_string(),
            stage: JobStage::Pending,
            diagnostics: Vec::new(),
            segments_total: 0,
            segments_finished: 0,
        }
    }

    fn apply(&mut self, event: &PipelineEvent) {
        match event {
            PipelineEvent::StageChanged(stage) => self.stage = *stage,
            PipelineEvent::SegmentsPlanned { total } => self.segments_total = *total,
            PipelineEvent::SegmentFinished { finished, total, .. } => {
                self.segments_finished = *finished;
                self.segments_total = *total;
            }
            PipelineEvent::Diagnostic(diagnostic) => self.diagnostics.push(diagnostic.clone()),
        }
    }
}

#[derive(Debug)]
struct JobRecord {
    status: Arc<RwLock<JobStatus>>,
    cancel: watch::Sender<bool>,
    result: watch::Receiver<Option<JobResult>>,
}

/// Runs and tracks pipeline jobs.
///
/// Finished jobs stay registered so their status and result can be read
/// repeatedly. Long-lived callers remove them with `forget` or
/// `prune_finished`.
#[derive(Debug)]
pub struct JobManager {
    engine: Arc<PipelineEngine>,
    storage_root: PathBuf,
    retain_artifacts: bool,
    jobs: RwLock<HashMap<JobId, JobRecord>>,
}

impl JobManager {
    pub fn new(engine: Arc<PipelineEngine>, storage_root: impl Into<PathBuf>, retain_artifacts: bool) -> Self {
        Self {
            engine,
            storage_root: storage_root.into(),
            retain_artifacts,
            jobs: RwLock::new(HashMap::new()),
        }
    }

    /// Start a job with default options
    pub fn submit(&self, source_text: impl Into<String>) -> Result<JobId, PipelineError> {
        self.submit_with(source_text, SubmitOptions::default())
    }

    /// Start a job in the background and return its id immediately
    pub fn submit_with(&self, source_text: impl Into<String>, options: SubmitOptions) -> Result<JobId, PipelineError> {
        let job_id = Uuid::new_v4().to_string();
        let retain = options.retain_artifacts.unwrap_or(self.retain_artifacts);
        let workspace = JobWorkspace::create(&self.storage_root, &job_id, retain)?;

        let status = Arc::new(RwLock::new(JobStatus::new(&job_id)));
        let (cancel_tx, cancel_rx) = watch::channel(false);
        let (result_tx, result_rx) = watch::channel(None);
        let (event_tx, mut event_rx) = mpsc::unbounded_channel::<PipelineEvent>();

        let mut context = JobContext::new(job_id.clone(), workspace, cancel_rx).with_events(event_tx);
        if let Some(policy) = options.failure_policy {
            context = context.with_failure_policy(policy);
        }

        // Status listener ends when the engine drops its event sender
        let listener_status = Arc::clone(&status);
        let forward = options.events;
        let listener = tokio::spawn(async move {
            while let Some(event) = event_rx.recv().await {
                listener_status.write().apply(&event);
                if let Some(forward) = &forward {
                    let _ = forward.send(event);
                }
            }
        });

        let engine = Arc::clone(&self.engine);
        let source_text = source_text.into();
        let task_job_id = job_id.clone();
        tokio::spawn(async move {
            let result = engine.run(&source_text, context).await;
            if let Err(e) = listener.await {
                debug!("Status listener for job {} ended abnormally: {}", task_job_id, e);
            }
            let _ = result_tx.send(Some(result));
        });

        info!("Submitted job {}", job_id);
        self.jobs.write().insert(
            job_id.clone(),
            JobRecord {
                status,
                cancel: cancel_tx,
                result: result_rx,
            },
        );
        Ok(job_id)
    }

    /// Current status of a job
    pub fn status(&self, job_id: &str) -> Result<JobStatus, PipelineError> {
        let jobs = self.jobs.read();
        let record = jobs.get(job_id).ok_or_else(|| PipelineError::UnknownJob(job_id.to_string()))?;
        let status = record.status.read().clone();
        Ok(status)
    }

    /// Wait for a job's result.
    ///
    /// On timeout the job keeps running and can be awaited again.
    pub async fn await_result(&self, job_id: &str, timeout: Duration) -> Result<FinalArtifact, PipelineError> {
        let mut result = {
            let jobs = self.jobs.read();
            let record = jobs.get(job_id).ok_or_else(|| PipelineError::UnknownJob(job_id.to_string()))?;
            record.result.clone()
        };

        let finished = tokio::time::timeout(timeout, result.wait_for(|r| r.is_some())).await;
        match finished {
            Err(_) => Err(PipelineError::Timeout(timeout)),
            Ok(Err(_)) => Err(PipelineError::ResultUnavailable(job_id.to_string())),
            Ok(Ok(value)) => match value.as_ref() {
                Some(outcome) => outcome.clone(),
                None => Err(PipelineError::ResultUnavailable(job_id.to_string())),
            },
        }
    }

    /// Request cancellation; a job that already finished is left as is
    pub fn cancel(&self, job_id: &str) -> Result<(), PipelineError> {
        let jobs = self.jobs.read();
        let record = jobs.get(job_id).ok_or_else(|| PipelineError::UnknownJob(job_id.to_string()))?;
        if record.status.read().stage.is_terminal() {
            debug!("Job {} already finished, ignoring cancel", job_id);
            return Ok(());
        }
        info!("Cancelling job {}", job_id);
        // Receivers only disappear once the job has ended
        let _ = record.cancel.send(true);
        Ok(())
    }

    /// Drop a job from the registry, cancelling it if still running
    pub fn forget(&self, job_id: &str) -> Result<(), PipelineError> {
        let record = self
            .jobs
            .write()
            .remove(job_id)
            .ok_or_else(|| PipelineError::UnknownJob(job_id.to_string()))?;
        let _ = record.cancel.send(true);
        Ok(())
    }

    /// Drop every job whose result has been published; returns how many
    pub fn prune_finished(&self) -> usize {
        let mut jobs = self.jobs.write();
        let before = jobs.len();
        jobs.retain(|_, record| record.result.borrow().is_none());
        let pruned = before - jobs.len();
        if pruned > 0 {
            debug!("Pruned {} finished job(s)", pruned);
        }
        pruned
    }

    /// Ids of all known jobs
    pub fn job_ids(&self) -> Vec<JobId> {
        self.jobs.read().keys().cloned().collect()
    }
}
