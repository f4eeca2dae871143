/*!
 * Tests for background job control: submit, status, await, cancel
 */

use std::sync::Arc;
use std::time::Duration;

use c2rust_pipeline::errors::PipelineError;
use c2rust_pipeline::pipeline::{FailurePolicy, JobManager, JobStage, PipelineEvent, SubmitOptions};
use c2rust_pipeline::providers::MockTranslator;

use crate::common::{create_temp_dir, engine_with, entry_count, fast_options, CYCLIC_C, SAMPLE_C};

fn manager_with(translator: MockTranslator, root: &std::path::Path) -> JobManager {
    JobManager::new(Arc::new(engine_with(translator, fast_options())), root, false)
}

/// Poll until the job reaches `stage` or the deadline passes
async fn wait_for_stage(manager: &JobManager, job_id: &str, stage: JobStage) {
    for _ in 0..200 {
        if manager.status(job_id).unwrap().stage == stage {
            return;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    panic!("job {} never reached {}", job_id, stage);
}

/// A submitted job completes and reports its progress
#[tokio::test]
async fn test_submit_withWorkingTranslator_shouldComplete() {
    let root = create_temp_dir().unwrap();
    let manager = manager_with(MockTranslator::working(), root.path());

    let job_id = manager.submit(SAMPLE_C).unwrap();
    let artifact = manager.await_result(&job_id, Duration::from_secs(10)).await.unwrap();

    assert_eq!(artifact.job_id, job_id);
    assert_eq!(artifact.merge.ordered_unique_segments.len(), 4);

    let status = manager.status(&job_id).unwrap();
    assert_eq!(status.stage, JobStage::Completed);
    assert_eq!(status.segments_total, 4);
    assert_eq!(status.segments_finished, 4);
    assert!(status.diagnostics.is_empty());
    assert_eq!(entry_count(root.path()), 0);
}

/// Results can be awaited more than once
#[tokio::test]
async fn test_await_result_calledTwice_shouldReturnSameArtifact() {
    let root = create_temp_dir().unwrap();
    let manager = manager_with(MockTranslator::working(), root.path());

    let job_id = manager.submit(SAMPLE_C).unwrap();
    let first = manager.await_result(&job_id, Duration::from_secs(10)).await.unwrap();
    let second = manager.await_result(&job_id, Duration::from_secs(1)).await.unwrap();

    assert_eq!(first.merge, second.merge);
}

/// A wait that times out leaves the job running
#[tokio::test]
async fn test_await_result_withShortTimeout_shouldTimeOutWithoutCancelling() {
    let root = create_temp_dir().unwrap();
    let manager = manager_with(MockTranslator::working().with_delay(Duration::from_millis(300)), root.path());

    let job_id = manager.submit(SAMPLE_C).unwrap();
    let err = manager.await_result(&job_id, Duration::from_millis(20)).await.unwrap_err();
    assert!(matches!(err, PipelineError::Timeout(_)));
    assert!(!err.is_fatal());

    let artifact = manager.await_result(&job_id, Duration::from_secs(10)).await.unwrap();
    assert!(artifact.merge.failed_segments.is_empty());
}

/// Cancelling a running job ends it as cancelled and failed
#[tokio::test]
async fn test_cancel_whileTranslating_shouldEndJobAsCancelled() {
    let root = create_temp_dir().unwrap();
    let manager = manager_with(MockTranslator::working().with_delay(Duration::from_secs(5)), root.path());

    let job_id = manager.submit(SAMPLE_C).unwrap();
    wait_for_stage(&manager, &job_id, JobStage::Translating).await;
    manager.cancel(&job_id).unwrap();

    let err = manager.await_result(&job_id, Duration::from_secs(2)).await.unwrap_err();
    assert!(matches!(err, PipelineError::Cancelled));
    assert_eq!(manager.status(&job_id).unwrap().stage, JobStage::Failed);
    assert_eq!(entry_count(root.path()), 0);
}

/// Cancelling a finished job changes nothing
#[tokio::test]
async fn test_cancel_afterCompletion_shouldBeNoOp() {
    let root = create_temp_dir().unwrap();
    let manager = manager_with(MockTranslator::working(), root.path());

    let job_id = manager.submit(SAMPLE_C).unwrap();
    manager.await_result(&job_id, Duration::from_secs(10)).await.unwrap();

    manager.cancel(&job_id).unwrap();
    assert_eq!(manager.status(&job_id).unwrap().stage, JobStage::Completed);
    assert!(manager.await_result(&job_id, Duration::from_secs(1)).await.is_ok());
}

/// Fatal pipeline errors show up in status and result
#[tokio::test]
async fn test_submit_withCyclicSource_shouldFailWithDiagnostic() {
    let root = create_temp_dir().unwrap();
    let manager = manager_with(MockTranslator::working(), root.path());

    let job_id = manager.submit(CYCLIC_C).unwrap();
    let err = manager.await_result(&job_id, Duration::from_secs(10)).await.unwrap_err();
    assert!(matches!(err, PipelineError::Cycle(_)));

    let status = manager.status(&job_id).unwrap();
    assert_eq!(status.stage, JobStage::Failed);
    assert_eq!(status.diagnostics.len(), 1);
    assert_eq!(status.diagnostics[0].stage, JobStage::GraphBuilding);
    assert!(status.diagnostics[0].message.contains("is_even"));
}

/// Per-submission options override the manager defaults
#[tokio::test]
async fn test_submit_with_withStrictPolicyAndRetain_shouldApplyOverrides() {
    let root = create_temp_dir().unwrap();
    let manager = manager_with(MockTranslator::working().failing_on("printf"), root.path());
    let (events_tx, mut events_rx) = tokio::sync::mpsc::unbounded_channel();

    let strict_id = manager
        .submit_with(
            SAMPLE_C,
            SubmitOptions {
                failure_policy: Some(FailurePolicy::Strict),
                events: Some(events_tx),
                ..SubmitOptions::default()
            },
        )
        .unwrap();
    let err = manager.await_result(&strict_id, Duration::from_secs(10)).await.unwrap_err();
    assert!(matches!(err, PipelineError::TranslationFailure { .. }));

    let mut forwarded = Vec::new();
    while let Ok(event) = events_rx.try_recv() {
        forwarded.push(event);
    }
    assert!(forwarded.contains(&PipelineEvent::StageChanged(JobStage::Translating)));
    assert_eq!(forwarded.last(), Some(&PipelineEvent::StageChanged(JobStage::Failed)));

    let kept_id = manager
        .submit_with(
            SAMPLE_C,
            SubmitOptions {
                retain_artifacts: Some(true),
                ..SubmitOptions::default()
            },
        )
        .unwrap();
    let artifact = manager.await_result(&kept_id, Duration::from_secs(10)).await.unwrap();
    let output_path = artifact.output_path.unwrap();
    assert!(output_path.exists());
    assert!(output_path.starts_with(root.path()));
    assert_eq!(artifact.merge.failed_segments.len(), 1);
}

/// Unknown and forgotten ids are rejected
#[tokio::test]
async fn test_unknown_job_shouldBeRejectedEverywhere() {
    let root = create_temp_dir().unwrap();
    let manager = manager_with(MockTranslator::working(), root.path());

    assert!(matches!(manager.status("nope"), Err(PipelineError::UnknownJob(_))));
    assert!(matches!(manager.cancel("nope"), Err(PipelineError::UnknownJob(_))));
    assert!(matches!(
        manager.await_result("nope", Duration::from_millis(10)).await,
        Err(PipelineError::UnknownJob(_))
    ));

    let job_id = manager.submit(SAMPLE_C).unwrap();
    manager.await_result(&job_id, Duration::from_secs(10)).await.unwrap();
    assert_eq!(manager.job_ids(), vec![job_id.clone()]);

    manager.forget(&job_id).unwrap();
    assert!(manager.job_ids().is_empty());
    assert!(matches!(manager.status(&job_id), Err(PipelineError::UnknownJob(_))));
}

/// Pruning removes finished jobs and leaves running ones registered
#[tokio::test]
async fn test_prune_finished_withFinishedAndRunningJobs_shouldKeepOnlyRunning() {
    let root = create_temp_dir().unwrap();
    let fast = manager_with(MockTranslator::working(), root.path());

    let done_id = fast.submit(SAMPLE_C).unwrap();
    fast.await_result(&done_id, Duration::from_secs(10)).await.unwrap();
    assert_eq!(fast.prune_finished(), 1);
    assert!(matches!(fast.status(&done_id), Err(PipelineError::UnknownJob(_))));
    assert_eq!(fast.prune_finished(), 0);

    let slow = manager_with(MockTranslator::working().with_delay(Duration::from_secs(5)), root.path());
    let running_id = slow.submit(SAMPLE_C).unwrap();
    wait_for_stage(&slow, &running_id, JobStage::Translating).await;
    assert_eq!(slow.prune_finished(), 0);
    assert_eq!(slow.job_ids(), vec![running_id.clone()]);
    slow.cancel(&running_id).unwrap();
}
