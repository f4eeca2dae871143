/*!
 * Merge and deduplication of translated segments.
 *
 * The merger works only on already translated texts plus the manifest:
 * 1. Failed translations become placeholder blocks
 * 2. Structurally identical segments are collapsed (first one wins)
 * 3. Imports are pulled out of every segment and consolidated
 * 4. Segments are ordered by the manifest; unknown segments go last
 * 5. Everything is concatenated behind a single import block
 */

use log::{debug, info, warn};
use std::collections::HashSet;
use std::fs;
use std::path::Path;
use walkdir::WalkDir;

use crate::errors::MergeIoError;

use super::manifest::Manifest;
use super::outcome::{OutcomeStatus, TranslationOutcome};
use super::segmenter::SegmentId;

pub mod imports;
pub mod signature;

pub use imports::{consolidate_imports, extract_imports, strip_imports};
pub use signature::compute_signature;

/// First line of every placeholder written for a failed translation
pub const FAILURE_MARKER: &str = "// TRANSLATION FAILED:";

/// A translated (or placeholder) segment on its way to the final file
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TranslatedSegment {
    pub id: SegmentId,
    /// Symbol the segment was cut for, when known
    pub origin: Option<String>,
    pub text: String,
    /// Placeholder standing in for a failed translation
    pub failed: bool,
}

impl TranslatedSegment {
    pub fn new(id: SegmentId, origin: Option<String>, text: impl Into<String>) -> Self {
        Self { id, origin, text: text.into(), failed: false }
    }

    /// Build the placeholder for a failed segment
    pub fn placeholder(id: SegmentId, origin: Option<String>, reason: &str) -> Self {
        let label = match &origin {
            Some(origin) => format!("{} ({})", id, origin),
            None => id.to_string(),
        };
        let reason = reason.lines().next().unwrap_or_default();
        let text = format!("{} {}\n// reason: {}", FAILURE_MARKER, label, reason);
        Self { id, origin, text, failed: true }
    }

    /// Comment line emitted above the segment body
    pub fn origin_marker(&self) -> String {
        match &self.origin {
            Some(origin) => format!("// {} ({})", self.id, origin),
            None => format!("// {}", self.id),
        }
    }
}

/// Segments that survived deduplication, plus what was dropped
#[derive(Debug, Clone, Default)]
pub struct DedupResult {
    pub unique: Vec<TranslatedSegment>,
    pub removed: Vec<SegmentId>,
}

/// Final merged output and its bookkeeping
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MergeArtifact {
    pub ordered_unique_segments: Vec<SegmentId>,
    pub consolidated_imports: Vec<String>,
    pub final_text: String,
    /// Segments dropped as structural duplicates
    pub duplicates_removed: Vec<SegmentId>,
    /// Segments replaced by a failure placeholder
    pub failed_segments: Vec<SegmentId>,
}

/// Drop segments whose structural signature was already seen.
///
/// Placeholders are never considered duplicates of anything.
pub fn remove_duplicates(segments: Vec<TranslatedSegment>) -> DedupResult {
    let mut seen = HashSet::new();
    let mut result = DedupResult::default();

    for segment in segments {
        if segment.failed {
            result.unique.push(segment);
            continue;
        }
        let signature = compute_signature(&segment.text);
        if seen.insert(signature) {
            result.unique.push(segment);
        } else {
            debug!("Dropping {} as a structural duplicate", segment.id);
            result.removed.push(segment.id);
        }
    }

    result
}

/// Order segments by the manifest; segments it does not list keep their
/// encounter order and are appended at the end.
pub fn order(segments: Vec<TranslatedSegment>, manifest_order: &[SegmentId]) -> Vec<TranslatedSegment> {
    let mut slots: Vec<Option<TranslatedSegment>> = segments.into_iter().map(Some).collect();
    let mut ordered = Vec::with_capacity(slots.len());

    for id in manifest_order {
        if let Some(slot) = slots.iter_mut().find(|s| s.as_ref().is_some_and(|seg| &seg.id == id)) {
            if let Some(segment) = slot.take() {
                ordered.push(segment);
            }
        }
    }

    let orphans: Vec<TranslatedSegment> = slots.into_iter().flatten().collect();
    if !orphans.is_empty() {
        warn!("{} segment(s) missing from the manifest, appending them last", orphans.len());
    }
    ordered.extend(orphans);
    ordered
}

/// Concatenate the import block and the ordered segment bodies
pub fn assemble(final_order: &[TranslatedSegment], imports: &[String]) -> String {
    let mut blocks: Vec<String> = Vec::with_capacity(final_order.len() + 1);

    if !imports.is_empty() {
        blocks.push(imports.join("\n"));
    }

    for segment in final_order {
        let body = segment.text.trim();
        if body.is_empty() {
            blocks.push(segment.origin_marker());
        } else {
            blocks.push(format!("{}\n{}", segment.origin_marker(), body));
        }
    }

    if blocks.is_empty() {
        return String::new();
    }

    let mut text = blocks.join("\n\n");
    text.push('\n');
    text
}

/// Merges translation outcomes into the final artifact
#[derive(Debug, Default, Clone, Copy)]
pub struct Merger;

impl Merger {
    pub fn new() -> Self {
        Self
    }

    /// Merge outcomes in the order they are given, using the manifest for
    /// final ordering and origin markers.
    pub fn merge(&self, outcomes: &[TranslationOutcome], manifest: &Manifest) -> MergeArtifact {
        let segments = outcomes
            .iter()
            .map(|outcome| {
                let origin = manifest
                    .entry(&outcome.segment_id)
                    .and_then(|e| e.contained_symbols.first().cloned());
                match &outcome.status {
                    OutcomeStatus::Success(text) => {
                        TranslatedSegment::new(outcome.segment_id.clone(), origin, text.clone())
                    }
                    OutcomeStatus::Failed(reason) => {
                        TranslatedSegment::placeholder(outcome.segment_id.clone(), origin, reason)
                    }
                }
            })
            .collect();

        self.merge_segments(segments, &manifest.ordered_segment_ids)
    }

    /// Merge already materialized segments
    pub fn merge_segments(&self, segments: Vec<TranslatedSegment>, manifest_order: &[SegmentId]) -> MergeArtifact {
        let failed_segments: Vec<SegmentId> = segments
            .iter()
            .filter(|s| s.failed)
            .map(|s| s.id.clone())
            .collect();

        let dedup = remove_duplicates(segments);

        let mut unique_imports: Vec<String> = Vec::new();
        let mut cleaned = Vec::with_capacity(dedup.unique.len());
        for mut segment in dedup.unique {
            if !segment.failed {
                let (imports, stripped) = consolidate_imports([segment.text.as_str()]);
                for import in imports {
                    if !unique_imports.contains(&import) {
                        unique_imports.push(import);
                    }
                }
                segment.text = stripped.into_iter().next().unwrap_or_default();
            }
            cleaned.push(segment);
        }

        let final_order = order(cleaned, manifest_order);
        let final_text = assemble(&final_order, &unique_imports);

        info!(
            "Merged {} segment(s), {} duplicate(s) removed, {} import(s), {} failure placeholder(s)",
            final_order.len(),
            dedup.removed.len(),
            unique_imports.len(),
            failed_segments.len()
        );

        MergeArtifact {
            ordered_unique_segments: final_order.into_iter().map(|s| s.id).collect(),
            consolidated_imports: unique_imports,
            final_text,
            duplicates_removed: dedup.removed,
            failed_segments,
        }
    }

    /// Re-merge the translated segment files of a retained job directory.
    ///
    /// Every `*.rs` file directly inside `segment_dir` is one segment, named
    /// after its id. Files are read in file name order.
    pub fn merge_directory(&self, segment_dir: &Path, manifest_path: &Path) -> Result<MergeArtifact, MergeIoError> {
        let manifest_json = fs::read_to_string(manifest_path).map_err(|e| MergeIoError::new(manifest_path, e))?;
        let manifest = Manifest::from_json(&manifest_json).map_err(|e| {
            MergeIoError::new(manifest_path, std::io::Error::new(std::io::ErrorKind::InvalidData, e))
        })?;

        let mut files = Vec::new();
        for entry in WalkDir::new(segment_dir).min_depth(1).max_depth(1).sort_by_file_name() {
            let entry = entry.map_err(|e| {
                let path = e.path().map(Path::to_path_buf).unwrap_or_else(|| segment_dir.to_path_buf());
                MergeIoError::new(path, std::io::Error::other(e.to_string()))
            })?;
            let path = entry.path();
            if path.is_file() && path.extension().is_some_and(|ext| ext == "rs") {
                files.push(path.to_path_buf());
            }
        }

        let mut segments = Vec::with_capacity(files.len());
        for path in files {
            let text = fs::read_to_string(&path).map_err(|e| MergeIoError::new(&path, e))?;
            let stem = path.file_stem().map(|s| s.to_string_lossy().to_string()).unwrap_or_default();
            let id = SegmentId::from_raw(stem);
            let origin = manifest.entry(&id).and_then(|e| e.contained_symbols.first().cloned());
            let failed = text.trim_start().starts_with(FAILURE_MARKER);
            segments.push(TranslatedSegment { id, origin, text, failed });
        }

        debug!("Loaded {} translated segment file(s) from {:?}", segments.len(), segment_dir);

        Ok(self.merge_segments(segments, &manifest.ordered_segment_ids))
    }
}
