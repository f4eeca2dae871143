/*!
 * Tests for segmentation and manifest generation
 */

use c2rust_pipeline::providers::{CDeclarationScanner, SymbolExtractor};
use c2rust_pipeline::transpile::manifest::{self, Manifest};
use c2rust_pipeline::transpile::segmenter::segment;
use c2rust_pipeline::transpile::{DependencyGraph, SegmentId, Symbol, SymbolKind};

use crate::common::{SAMPLE_C, SAMPLE_ORDER};

fn sample_manifest() -> Manifest {
    let symbols = CDeclarationScanner::new().extract(SAMPLE_C).unwrap();
    let segmentation = segment(SAMPLE_C, &symbols);
    let graph = DependencyGraph::build(&symbols);
    manifest::generate(&symbols, &segmentation.segments, &graph).unwrap()
}

/// Each extracted symbol gets exactly its own lines
#[test]
fn test_segment_withScannedProgram_shouldCutOneSegmentPerSymbol() {
    let symbols = CDeclarationScanner::new().extract(SAMPLE_C).unwrap();
    let result = segment(SAMPLE_C, &symbols);

    assert_eq!(result.segments.len(), 4);
    assert!(result.skipped.is_empty());

    let square = result.segments.get(&SegmentId::new(1, "square")).unwrap();
    assert_eq!(square.source_text, "int square(int v) {\n    return v * v;\n}\n");
    assert_eq!(square.origin_symbol, "square");

    let main = &result.segments.by_origin("main")[0];
    assert!(main.source_text.starts_with("int main(void) {"));
    assert!(main.source_text.ends_with("}\n"));
}

/// Two symbols sharing a name keep distinct ids
#[test]
fn test_segment_withDuplicateNames_shouldKeepBothSegments() {
    let source = "struct node { int v; };\nstruct node { int v; };\n";
    let symbols = vec![
        Symbol::new("node", SymbolKind::Struct, 1, 1),
        Symbol::new("node", SymbolKind::Struct, 2, 2),
    ];
    let result = segment(source, &symbols);

    assert_eq!(result.segments.len(), 2);
    assert_eq!(result.segments.by_origin("node").len(), 2);
    assert!(result.segments.contains(&SegmentId::new(0, "node")));
    assert!(result.segments.contains(&SegmentId::new(1, "node")));
}

/// Out-of-range symbols are reported, the rest is kept
#[test]
fn test_segment_withRangePastEnd_shouldSkipAndReport() {
    let source = "int a(void) { return 0; }\n";
    let symbols = vec![
        Symbol::new("a", SymbolKind::Function, 1, 1),
        Symbol::new("ghost", SymbolKind::Function, 3, 9),
    ];
    let result = segment(source, &symbols);

    assert_eq!(result.segments.len(), 1);
    assert_eq!(result.skipped.len(), 1);
    assert_eq!(result.skipped[0].symbol, "ghost");
    assert_eq!(result.skipped[0].line_count, 1);
}

/// The manifest lists every segment once, in dependency order
#[test]
fn test_generate_withScannedProgram_shouldFollowDependencyOrder() {
    let manifest = sample_manifest();

    let ids: Vec<&str> = manifest.ordered_segment_ids.iter().map(|id| id.as_str()).collect();
    assert_eq!(ids, SAMPLE_ORDER.to_vec());
    assert_eq!(manifest.entries.len(), manifest.ordered_segment_ids.len());

    let norm = manifest.entry(&SegmentId::from("segment_2_norm")).unwrap();
    assert!(norm.dependencies.contains(&"square".to_string()));
    assert!(norm.dependencies.contains(&"point".to_string()));
}

/// Manifests survive a JSON round trip unchanged
#[test]
fn test_manifest_json_withSample_shouldPreserveOrder() {
    let manifest = sample_manifest();
    let json = manifest.to_json().unwrap();
    let parsed = Manifest::from_json(&json).unwrap();

    assert_eq!(parsed, manifest);
}
