/*!
 * Common test utilities for the c2rust-pipeline test suite
 */

use anyhow::Result;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tempfile::TempDir;
use tokio::sync::watch;

use c2rust_pipeline::pipeline::{JobContext, JobWorkspace, PipelineEngine, PipelineOptions, RetryPolicy};
use c2rust_pipeline::providers::{CDeclarationScanner, PassthroughPreprocessor, SymbolExtractor, Translator};

// Re-export the mock providers module
pub mod mock_providers;

/// A small C program: one struct, three functions, one libc call
pub const SAMPLE_C: &str = r#"#include <stdio.h>

struct point {
    int x;
    int y;
};

int square(int v) {
    return v * v;
}

int norm(struct point p) {
    return square(p.x) + square(p.y);
}

int main(void) {
    struct point p = { 3, 4 };
    printf("%d\n", norm(p));
    return 0;
}
"#;

/// Segment ids of `SAMPLE_C` in dependency order
pub const SAMPLE_ORDER: [&str; 4] = ["segment_0_point", "segment_1_square", "segment_2_norm", "segment_3_main"];

/// Two mutually recursive functions
pub const CYCLIC_C: &str = r#"int is_even(int n) {
    return n == 0 ? 1 : is_odd(n - 1);
}

int is_odd(int n) {
    return n == 0 ? 0 : is_even(n - 1);
}
"#;

/// Creates a temporary directory for test files
pub fn create_temp_dir() -> Result<TempDir> {
    Ok(TempDir::new()?)
}

/// Creates a test file with the given content in the specified directory
pub fn create_test_file(dir: &Path, filename: &str, content: &str) -> Result<PathBuf> {
    let file_path = dir.join(filename);
    fs::write(&file_path, content)?;
    Ok(file_path)
}

/// Engine options with millisecond backoff so retries stay fast
pub fn fast_options() -> PipelineOptions {
    PipelineOptions {
        retry: RetryPolicy::with_retries(2, 1, 5),
        translation_timeout: Some(Duration::from_secs(5)),
        ..PipelineOptions::default()
    }
}

/// Engine over the passthrough preprocessor and the C declaration scanner
pub fn engine_with<T: Translator + 'static>(translator: T, options: PipelineOptions) -> PipelineEngine {
    PipelineEngine::new(
        Arc::new(PassthroughPreprocessor),
        Arc::new(CDeclarationScanner::new()),
        Arc::new(translator),
        options,
    )
}

/// Engine with a custom extractor
pub fn engine_with_extractor<E, T>(extractor: E, translator: T, options: PipelineOptions) -> PipelineEngine
where
    E: SymbolExtractor + 'static,
    T: Translator + 'static,
{
    PipelineEngine::new(Arc::new(PassthroughPreprocessor), Arc::new(extractor), Arc::new(translator), options)
}

/// Job context with a fresh workspace under `root`, plus its cancel switch
pub fn job_context(root: &Path, job_id: &str, retain: bool) -> (JobContext, watch::Sender<bool>) {
    let workspace = JobWorkspace::create(root, job_id, retain).expect("workspace should be created");
    let (cancel_tx, cancel_rx) = watch::channel(false);
    (JobContext::new(job_id, workspace, cancel_rx), cancel_tx)
}

/// Number of entries directly under `root`
pub fn entry_count(root: &Path) -> usize {
    fs::read_dir(root).map(|entries| entries.count()).unwrap_or(0)
}
