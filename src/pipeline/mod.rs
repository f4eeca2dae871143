/*!
 * Job orchestration.
 *
 * - `stages`: Declared stage DAG and the job state machine
 * - `barrier`: Fan-in barrier collecting one outcome per segment
 * - `retry`: Retry policy with exponential backoff for translations
 * - `workspace`: Per-job artifact directory
 * - `engine`: Runs the stages for one job
 * - `jobs`: Background job manager (submit, status, await, cancel)
 */

pub mod barrier;
pub mod engine;
pub mod jobs;
pub mod retry;
pub mod stages;
pub mod workspace;

pub use self::barrier::{FanInBarrier, OutcomeReporter};
pub use self::engine::{
    Diagnostic, FailurePolicy, FinalArtifact, JobContext, PipelineEngine, PipelineEvent, PipelineOptions, PlanReport,
    Severity,
};
pub use self::jobs::{JobId, JobManager, JobStatus, SubmitOptions};
pub use self::retry::RetryPolicy;
pub use self::stages::{JobStage, StageGraph, StageNode};
pub use self::workspace::JobWorkspace;
