/*!
 * Ordering manifest generation.
 *
 * The manifest ties the dependency order to the segments that were actually
 * cut. It is persisted as `metadata.json` next to the segment files and is the
 * only ordering input the merge stage relies on.
 */

use log::debug;
use serde::{Deserialize, Serialize};

use crate::errors::CycleError;

use super::graph::DependencyGraph;
use super::segmenter::{SegmentId, SegmentMap};
use super::symbols::Symbol;

/// One manifest line per segment
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ManifestEntry {
    pub segment_id: SegmentId,

    /// Segment source artifact, relative to the job's segment directory
    #[serde(rename = "file")]
    pub source_file: String,

    /// Translated artifact, relative to the job's segment directory
    #[serde(rename = "rust_file")]
    pub target_file: String,

    pub contained_symbols: Vec<String>,

    /// Names the segment's symbol depends on
    pub dependencies: Vec<String>,
}

/// Dependency-ordered description of a job's segments
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Manifest {
    #[serde(rename = "segments")]
    pub entries: Vec<ManifestEntry>,

    #[serde(rename = "sorted_segments")]
    pub ordered_segment_ids: Vec<SegmentId>,
}

impl Manifest {
    /// Look up the entry for a segment
    pub fn entry(&self, id: &SegmentId) -> Option<&ManifestEntry> {
        self.entries.iter().find(|e| &e.segment_id == id)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn to_json(&self) -> serde_json::Result<String> {
        serde_json::to_string_pretty(self)
    }

    pub fn from_json(json: &str) -> serde_json::Result<Self> {
        serde_json::from_str(json)
    }
}

/// File name of a segment's source artifact
pub fn source_file_name(id: &SegmentId) -> String {
    format!("{}.c", id)
}

/// File name of a segment's translated artifact
pub fn target_file_name(id: &SegmentId) -> String {
    format!("{}.rs", id)
}

/// Build the manifest by walking the graph's topological order.
///
/// Names without a segment (external references or skipped symbols) produce
/// no entry. A cycle aborts generation with the graph's error unchanged.
pub fn generate(
    symbols: &[Symbol],
    segments: &SegmentMap,
    graph: &DependencyGraph,
) -> Result<Manifest, CycleError> {
    let order = graph.topological_order()?;
    let mut manifest = Manifest::default();

    for name in &order {
        for segment in segments.by_origin(name) {
            let entry = ManifestEntry {
                segment_id: segment.id.clone(),
                source_file: source_file_name(&segment.id),
                target_file: target_file_name(&segment.id),
                contained_symbols: vec![name.clone()],
                dependencies: graph.dependencies_of(name),
            };
            manifest.ordered_segment_ids.push(entry.segment_id.clone());
            manifest.entries.push(entry);
        }
    }

    debug!(
        "Manifest lists {} of {} segments for {} symbols",
        manifest.len(),
        segments.len(),
        symbols.len()
    );

    Ok(manifest)
}
