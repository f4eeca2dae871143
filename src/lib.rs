/*!
 * # c2rust-pipeline - segment-and-merge C to Rust translation
 *
 * A Rust library that translates C source files to Rust by splitting them
 * into declaration-level segments, translating every segment concurrently,
 * and merging the results back in dependency order.
 *
 * ## Features
 *
 * - Preprocess C sources with gcc (or pass them through unchanged)
 * - Extract top-level functions, structs, unions and their dependencies
 * - Order segments topologically and reject dependency cycles
 * - Translate segments concurrently using various backends:
 *   - Ollama (local LLM)
 *   - OpenAI-compatible APIs (OpenAI, LM Studio)
 *   - A scripted mock for tests and dry runs
 * - Retries with exponential backoff and per-attempt timeouts
 * - Strict or lenient failure handling with placeholders for failed segments
 * - Deduplication and import consolidation in the merged output
 * - Background jobs with status polling, timed waits and cancellation
 *
 * ## Architecture
 *
 * The library is organized in these main modules:
 * - `transpile`: Pure data model and algorithms:
 *   - `transpile::symbols`: Extracted declarations
 *   - `transpile::graph`: Dependency graph and topological order
 *   - `transpile::segmenter`: Symbol-aligned source segments
 *   - `transpile::manifest`: Ordered segment manifest
 *   - `transpile::merge`: Deduplication, import consolidation and assembly
 * - `providers`: Preprocessor, symbol extractor and translator adapters
 * - `pipeline`: Stage graph, fan-in barrier, retry, workspace, engine and job manager
 * - `app_config`: Configuration management
 * - `app_controller`: Main application controller
 * - `file_utils`: File system operations
 * - `errors`: Custom error types for the application
 *
 * ## License
 *
 * This project is licensed under the MIT License
 */

// Global lints configuration
#![allow(clippy::uninlined_format_args)]
#![allow(clippy::redundant_closure_for_method_calls)]

// Public modules
pub mod app_config;
pub mod app_controller;
pub mod errors;
pub mod file_utils;
pub mod pipeline;
pub mod providers;
pub mod transpile;

// Re-export main types for easier usage
pub use app_config::Config;
pub use errors::{AppError, PipelineError, ProviderError, TranslationError};
pub use pipeline::{FailurePolicy, FinalArtifact, JobManager, JobStage, PipelineEngine, PipelineOptions};
pub use transpile::graph::DependencyGraph;
pub use transpile::manifest::Manifest;
pub use transpile::merge::{MergeArtifact, Merger};
