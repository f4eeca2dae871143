/*!
 * Pure transformation stages of the pipeline.
 *
 * Nothing in here performs I/O against external tools; the stages operate on
 * in-memory data and are driven by `crate::pipeline`:
 *
 * - `symbols`: Symbol model produced by extraction
 * - `graph`: Dependency graph and its topological order
 * - `segmenter`: Per-symbol source segments with stable ids
 * - `manifest`: Dependency-ordered segment manifest
 * - `outcome`: Per-segment translation outcomes
 * - `merge`: Deduplication, import consolidation and final assembly
 */

pub mod graph;
pub mod manifest;
pub mod merge;
pub mod outcome;
pub mod segmenter;
pub mod symbols;

// Re-export main types for easier usage
pub use self::graph::DependencyGraph;
pub use self::manifest::{Manifest, ManifestEntry};
pub use self::merge::{MergeArtifact, Merger, TranslatedSegment};
pub use self::outcome::{OutcomeStatus, TranslationOutcome};
pub use self::segmenter::{Segment, SegmentId, SegmentMap, SegmentationResult};
pub use self::symbols::{Symbol, SymbolKind};
