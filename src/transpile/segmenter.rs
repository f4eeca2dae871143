/*!
 * Source segmentation.
 *
 * Slices the normalized source into one segment per extracted symbol. Every
 * segment gets an id built from the symbol's position in the extraction order
 * and its name, so two symbols sharing a name never share an id and the id
 * stays the same from segmentation through translation to the final merge.
 */

use log::{debug, warn};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;

use crate::errors::SegmentRangeError;

use super::symbols::Symbol;

/// Stable identifier of a segment
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SegmentId(String);

impl SegmentId {
    /// Build the id for the symbol at `position` in extraction order
    pub fn new(position: usize, name: &str) -> Self {
        let safe_name: String = name
            .chars()
            .map(|c| if c.is_ascii_alphanumeric() || c == '_' { c } else { '_' })
            .collect();
        Self(format!("segment_{}_{}", position, safe_name))
    }

    /// Wrap an id read back from an artifact
    pub fn from_raw(raw: impl Into<String>) -> Self {
        Self(raw.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for SegmentId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for SegmentId {
    fn from(raw: &str) -> Self {
        Self(raw.to_string())
    }
}

/// A contiguous slice of source text belonging to one symbol
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Segment {
    pub id: SegmentId,
    /// Name of the symbol this segment was cut for
    pub origin_symbol: String,
    /// Index of the symbol in extraction order
    pub position: usize,
    pub start_line: usize,
    pub end_line: usize,
    pub source_text: String,
}

/// Segments in extraction order with lookup by id
#[derive(Debug, Clone, Default)]
pub struct SegmentMap {
    segments: Vec<Segment>,
    index: HashMap<SegmentId, usize>,
}

impl SegmentMap {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert a segment; a segment with the same id replaces the earlier one
    pub fn insert(&mut self, segment: Segment) {
        match self.index.get(&segment.id) {
            Some(&slot) => self.segments[slot] = segment,
            None => {
                self.index.insert(segment.id.clone(), self.segments.len());
                self.segments.push(segment);
            }
        }
    }

    pub fn get(&self, id: &SegmentId) -> Option<&Segment> {
        self.index.get(id).map(|&slot| &self.segments[slot])
    }

    pub fn contains(&self, id: &SegmentId) -> bool {
        self.index.contains_key(id)
    }

    /// All segments cut for a given symbol name, in extraction order
    pub fn by_origin(&self, name: &str) -> Vec<&Segment> {
        self.segments.iter().filter(|s| s.origin_symbol == name).collect()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Segment> {
        self.segments.iter()
    }

    pub fn len(&self) -> usize {
        self.segments.len()
    }

    pub fn is_empty(&self) -> bool {
        self.segments.is_empty()
    }
}

/// Outcome of segmenting one source file
#[derive(Debug, Clone, Default)]
pub struct SegmentationResult {
    pub segments: SegmentMap,
    /// Symbols that were dropped because their range did not fit
    pub skipped: Vec<SegmentRangeError>,
}

/// Cut the normalized source into per-symbol segments.
///
/// Line terminators are kept so that a segment is a faithful copy of the
/// original text. Symbols whose range does not fit are skipped and reported.
pub fn segment(normalized_source: &str, symbols: &[Symbol]) -> SegmentationResult {
    let lines: Vec<&str> = normalized_source.split_inclusive('\n').collect();
    let line_count = lines.len();
    let mut result = SegmentationResult::default();

    for (position, symbol) in symbols.iter().enumerate() {
        let valid = symbol.start_line >= 1
            && symbol.end_line >= symbol.start_line
            && symbol.end_line <= line_count;

        if !valid {
            let skipped = SegmentRangeError {
                symbol: symbol.name.clone(),
                start_line: symbol.start_line,
                end_line: symbol.end_line,
                line_count,
            };
            warn!("{}", skipped);
            result.skipped.push(skipped);
            continue;
        }

        let source_text = lines[symbol.start_line - 1..symbol.end_line].concat();
        let segment = Segment {
            id: SegmentId::new(position, &symbol.name),
            origin_symbol: symbol.name.clone(),
            position,
            start_line: symbol.start_line,
            end_line: symbol.end_line,
            source_text,
        };
        debug!(
            "Cut {} from lines {}-{}",
            segment.id, segment.start_line, segment.end_line
        );
        result.segments.insert(segment);
    }

    result
}
