/*!
 * End-to-end tests for the pipeline engine.
 *
 * Every test runs the real stage sequence over the passthrough
 * preprocessor, the C declaration scanner (or a fixed extractor) and the
 * mock translator, with workspaces in a temporary directory.
 */

use std::sync::Arc;
use std::time::Duration;

use c2rust_pipeline::errors::PipelineError;
use c2rust_pipeline::pipeline::workspace::{FINAL_OUTPUT_FILE, METADATA_FILE, SEGMENTS_DIR};
use c2rust_pipeline::pipeline::{FailurePolicy, JobStage, PipelineEngine, PipelineEvent, PipelineOptions, Severity};
use c2rust_pipeline::providers::{CDeclarationScanner, MockTranslator};
use c2rust_pipeline::transpile::merge::FAILURE_MARKER;
use c2rust_pipeline::transpile::{Merger, SegmentId, Symbol, SymbolKind};

use crate::common::mock_providers::{BrokenPreprocessor, FixedExtractor};
use crate::common::{
    create_temp_dir, engine_with, engine_with_extractor, entry_count, fast_options, job_context, CYCLIC_C, SAMPLE_C,
    SAMPLE_ORDER,
};

/// Full run with a working translator: every segment merged in dependency order
#[tokio::test]
async fn test_run_withWorkingTranslator_shouldMergeInDependencyOrder() {
    let root = create_temp_dir().unwrap();
    let engine = engine_with(MockTranslator::working(), fast_options());
    let (context, _cancel) = job_context(root.path(), "ok", false);

    let artifact = engine.run(SAMPLE_C, context).await.unwrap();

    let ids: Vec<&str> = artifact.manifest.ordered_segment_ids.iter().map(|id| id.as_str()).collect();
    assert_eq!(ids, SAMPLE_ORDER.to_vec());
    assert_eq!(artifact.merge.ordered_unique_segments.len(), 4);
    assert!(artifact.merge.failed_segments.is_empty());
    assert!(artifact.diagnostics.is_empty());
    assert!(artifact.output_path.is_none());

    let text = artifact.final_text();
    assert!(text.starts_with("use std::os::raw::c_int;\n"));
    assert_eq!(text.matches("use std::os::raw::c_int;").count(), 1);
    let point = text.find("pub struct point").unwrap();
    let square = text.find("pub fn square").unwrap();
    let norm = text.find("pub fn norm").unwrap();
    let main = text.find("pub fn main").unwrap();
    assert!(point < square && square < norm && norm < main);
}

/// Lenient policy replaces the failed segment and keeps the rest
#[tokio::test]
async fn test_run_withLenientPolicyAndOneFailure_shouldInsertPlaceholder() {
    let root = create_temp_dir().unwrap();
    let translator = MockTranslator::working().failing_on("return v * v");
    let engine = engine_with(translator, fast_options());
    let (context, _cancel) = job_context(root.path(), "lenient", false);

    let artifact = engine.run(SAMPLE_C, context).await.unwrap();

    assert_eq!(artifact.merge.failed_segments, vec![SegmentId::from("segment_1_square")]);
    assert_eq!(artifact.final_text().matches(FAILURE_MARKER).count(), 1);
    assert!(artifact.final_text().contains("segment_1_square (square)"));
    assert!(artifact.final_text().contains("pub fn norm"));
    assert_eq!(artifact.diagnostics.len(), 1);
    assert_eq!(artifact.diagnostics[0].severity, Severity::Warning);
    assert_eq!(artifact.diagnostics[0].stage, JobStage::Translating);
}

/// Strict policy fails the job on the first failed segment
#[tokio::test]
async fn test_run_withStrictPolicyAndOneFailure_shouldFailWithoutArtifact() {
    let root = create_temp_dir().unwrap();
    let translator = MockTranslator::working().failing_on("return v * v");
    let engine = engine_with(translator, fast_options());
    let (context, _cancel) = job_context(root.path(), "strict", false);
    let context = context.with_failure_policy(FailurePolicy::Strict);

    let err = engine.run(SAMPLE_C, context).await.unwrap_err();

    match err {
        PipelineError::TranslationFailure { segment_id, reason } => {
            assert_eq!(segment_id, "segment_1_square");
            assert!(reason.contains("return v * v"));
        }
        other => panic!("unexpected error: {:?}", other),
    }
    assert_eq!(entry_count(root.path()), 0);
}

/// A dependency cycle is fatal and reported at the graph stage
#[tokio::test]
async fn test_run_withMutualRecursion_shouldFailAtGraphBuilding() {
    let root = create_temp_dir().unwrap();
    let translator = MockTranslator::working();
    let engine = engine_with(translator.clone(), fast_options());
    let (context, _cancel) = job_context(root.path(), "cycle", false);
    let (events_tx, mut events_rx) = tokio::sync::mpsc::unbounded_channel();

    let err = engine.run(CYCLIC_C, context.with_events(events_tx)).await.unwrap_err();

    match &err {
        PipelineError::Cycle(cycle) => assert_eq!(cycle.participants, vec!["is_even", "is_odd"]),
        other => panic!("unexpected error: {:?}", other),
    }
    assert_eq!(err.stage(), Some(JobStage::GraphBuilding));
    assert_eq!(translator.request_count(), 0);

    let mut stages = Vec::new();
    while let Ok(event) = events_rx.try_recv() {
        if let PipelineEvent::StageChanged(stage) = event {
            stages.push(stage);
        }
    }
    assert_eq!(
        stages,
        vec![JobStage::Normalizing, JobStage::Extracting, JobStage::GraphBuilding, JobStage::Failed]
    );
}

/// Source without any declaration completes with an empty artifact
#[tokio::test]
async fn test_run_withNoDeclarations_shouldCompleteEmpty() {
    let root = create_temp_dir().unwrap();
    let translator = MockTranslator::working();
    let engine = engine_with(translator.clone(), fast_options());
    let (context, _cancel) = job_context(root.path(), "empty", false);

    let artifact = engine.run("int counter = 0;\n", context).await.unwrap();

    assert!(artifact.manifest.is_empty());
    assert!(artifact.final_text().is_empty());
    assert_eq!(translator.request_count(), 0);
}

/// Symbols outside the source are skipped with a warning
#[tokio::test]
async fn test_run_withOutOfRangeSymbol_shouldSkipWithDiagnostic() {
    let root = create_temp_dir().unwrap();
    let extractor = FixedExtractor::new(vec![
        Symbol::new("first", SymbolKind::Function, 1, 1),
        Symbol::new("beyond", SymbolKind::Function, 2, 40),
    ]);
    let engine = engine_with_extractor(extractor, MockTranslator::working(), fast_options());
    let (context, _cancel) = job_context(root.path(), "skip", false);

    let artifact = engine.run("int first(void) { return 1; }\nint second;\n", context).await.unwrap();

    assert_eq!(artifact.manifest.len(), 1);
    assert_eq!(artifact.diagnostics.len(), 1);
    assert_eq!(artifact.diagnostics[0].stage, JobStage::Segmenting);
    assert!(artifact.diagnostics[0].message.contains("beyond"));
}

/// Transient failures are retried until the translation succeeds
#[tokio::test]
async fn test_run_withTransientFailures_shouldRetryAndSucceed() {
    let root = create_temp_dir().unwrap();
    let translator = MockTranslator::working().with_transient_failures(2);
    let engine = engine_with(translator.clone(), fast_options());
    let (context, _cancel) = job_context(root.path(), "retry", false);

    let artifact = engine.run(SAMPLE_C, context).await.unwrap();

    assert!(artifact.merge.failed_segments.is_empty());
    assert_eq!(translator.request_count(), 4 * 3);
}

/// Exhausted retries become a placeholder under the lenient policy
#[tokio::test]
async fn test_run_withMoreTransientFailuresThanRetries_shouldGiveUp() {
    let root = create_temp_dir().unwrap();
    let translator = MockTranslator::working().with_transient_failures(5);
    let engine = engine_with(translator.clone(), fast_options());
    let (context, _cancel) = job_context(root.path(), "exhausted", false);

    let artifact = engine.run(SAMPLE_C, context).await.unwrap();

    assert_eq!(artifact.merge.failed_segments.len(), 4);
    assert_eq!(translator.request_count(), 4 * 3);
}

/// Diagnostic text from the translator counts as a failure, not as code
#[tokio::test]
async fn test_run_withDiagnosticOutput_shouldTreatAsFailure() {
    let root = create_temp_dir().unwrap();
    let engine = engine_with(MockTranslator::diagnostic(), fast_options());
    let (context, _cancel) = job_context(root.path(), "diagnostic", false);

    let artifact = engine.run(SAMPLE_C, context).await.unwrap();

    assert_eq!(artifact.merge.failed_segments.len(), 4);
    assert!(!artifact.final_text().contains("pub fn"));
    assert_eq!(artifact.final_text().matches(FAILURE_MARKER).count(), 4);
    assert!(artifact.diagnostics.iter().all(|d| d.message.contains("diagnostic")));
}

/// Identical translations collapse into one segment
#[tokio::test]
async fn test_run_withIdenticalTranslations_shouldDeduplicate() {
    let root = create_temp_dir().unwrap();
    let translator = MockTranslator::working().with_custom_response(|_| "pub fn shared() -> i32 {\n    1\n}\n".to_string());
    let engine = engine_with(translator, fast_options());
    let (context, _cancel) = job_context(root.path(), "dedup", false);

    let artifact = engine.run(SAMPLE_C, context).await.unwrap();

    assert_eq!(artifact.merge.ordered_unique_segments, vec![SegmentId::from("segment_0_point")]);
    assert_eq!(artifact.merge.duplicates_removed.len(), 3);
    assert_eq!(artifact.final_text().matches("pub fn shared").count(), 1);
}

/// Preprocessor failures end the job in the normalize stage
#[tokio::test]
async fn test_run_withFailingPreprocessor_shouldFailAtNormalizing() {
    let root = create_temp_dir().unwrap();
    let engine = PipelineEngine::new(
        Arc::new(BrokenPreprocessor),
        Arc::new(CDeclarationScanner::new()),
        Arc::new(MockTranslator::working()),
        fast_options(),
    );
    let (context, _cancel) = job_context(root.path(), "broken", false);

    let err = engine.run(SAMPLE_C, context).await.unwrap_err();

    assert!(matches!(err, PipelineError::Preprocess(_)));
    assert_eq!(err.stage(), Some(JobStage::Normalizing));
}

/// Cancelling mid-translation aborts the job and removes its workspace
#[tokio::test]
async fn test_run_withCancellation_shouldStopAndCleanUp() {
    let root = create_temp_dir().unwrap();
    let options = PipelineOptions {
        max_concurrent_translations: 1,
        ..fast_options()
    };
    let translator = MockTranslator::working().with_delay(Duration::from_secs(3));
    let engine = Arc::new(engine_with(translator.clone(), options));
    let (context, cancel) = job_context(root.path(), "cancel", false);
    let (events_tx, mut events_rx) = tokio::sync::mpsc::unbounded_channel();

    let task_engine = Arc::clone(&engine);
    let handle = tokio::spawn(async move { task_engine.run(SAMPLE_C, context.with_events(events_tx)).await });

    while let Some(event) = events_rx.recv().await {
        if event == PipelineEvent::StageChanged(JobStage::Translating) {
            break;
        }
    }
    cancel.send(true).unwrap();

    let result = tokio::time::timeout(Duration::from_secs(2), handle).await.unwrap().unwrap();
    assert!(matches!(result, Err(PipelineError::Cancelled)));
    assert!(translator.request_count() <= 1);
    assert_eq!(entry_count(root.path()), 0);
}

/// Retained workspaces hold every artifact and can be re-merged
#[tokio::test]
async fn test_run_withRetainedWorkspace_shouldKeepArtifactsForRemerge() {
    let root = create_temp_dir().unwrap();
    let engine = engine_with(MockTranslator::working().failing_on("printf"), fast_options());
    let (context, _cancel) = job_context(root.path(), "kept", true);

    let artifact = engine.run(SAMPLE_C, context).await.unwrap();

    let output_path = artifact.output_path.clone().unwrap();
    assert!(output_path.ends_with(FINAL_OUTPUT_FILE));
    assert_eq!(std::fs::read_to_string(&output_path).unwrap(), artifact.final_text());

    let job_dir = output_path.parent().unwrap();
    let segments_dir = job_dir.join(SEGMENTS_DIR);
    for id in SAMPLE_ORDER {
        assert!(segments_dir.join(format!("{}.c", id)).exists());
        assert!(segments_dir.join(format!("{}.rs", id)).exists());
    }

    let remerged = Merger::new()
        .merge_directory(&segments_dir, &job_dir.join(METADATA_FILE))
        .unwrap();
    assert_eq!(remerged.final_text, artifact.merge.final_text);
    assert_eq!(remerged.failed_segments, vec![SegmentId::from("segment_3_main")]);
}

/// Planning stops before translation
#[tokio::test]
async fn test_plan_withSample_shouldNotTranslate() {
    let translator = MockTranslator::working();
    let engine = engine_with(translator.clone(), fast_options());

    let report = engine.plan(SAMPLE_C).await.unwrap();

    assert_eq!(report.symbols.len(), 4);
    assert_eq!(report.manifest.len(), 4);
    assert!(report.diagnostics.is_empty());
    assert_eq!(translator.request_count(), 0);
}
