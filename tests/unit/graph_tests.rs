/*!
 * Tests for dependency graph construction over extracted C symbols
 */

use c2rust_pipeline::providers::{CDeclarationScanner, SymbolExtractor};
use c2rust_pipeline::transpile::{DependencyGraph, Symbol, SymbolKind};

use crate::common::{CYCLIC_C, SAMPLE_C};

fn position(order: &[String], name: &str) -> usize {
    order.iter().position(|n| n == name).unwrap()
}

/// Extracted symbols from a real program order dependencies first
#[test]
fn test_topological_order_withScannedProgram_shouldPlaceDependenciesFirst() {
    let symbols = CDeclarationScanner::new().extract(SAMPLE_C).unwrap();
    let graph = DependencyGraph::build(&symbols);
    let order = graph.topological_order().unwrap();

    assert!(position(&order, "point") < position(&order, "norm"));
    assert!(position(&order, "square") < position(&order, "norm"));
    assert!(position(&order, "norm") < position(&order, "main"));
    assert!(graph.is_external("printf"));
    assert_eq!(graph.dependents_of("square"), vec!["norm"]);
}

/// Mutual recursion is reported with both participants
#[test]
fn test_topological_order_withMutualRecursion_shouldReportCycle() {
    let symbols = CDeclarationScanner::new().extract(CYCLIC_C).unwrap();
    let err = DependencyGraph::build(&symbols).topological_order().unwrap_err();

    assert_eq!(err.participants, vec!["is_even", "is_odd"]);
}

/// Every name, external ones included, appears exactly once in the order
#[test]
fn test_topological_order_withSharedDependencies_shouldListEachNodeOnce() {
    let symbols = vec![
        Symbol::new("list_push", SymbolKind::Function, 1, 5).with_dependencies(["list", "malloc"]),
        Symbol::new("list_pop", SymbolKind::Function, 6, 9).with_dependencies(["list", "free"]),
        Symbol::new("list", SymbolKind::Struct, 10, 13),
    ];
    let graph = DependencyGraph::build(&symbols);
    let order = graph.topological_order().unwrap();

    assert_eq!(order.len(), graph.node_count());
    assert_eq!(order.len(), 5);
    assert_eq!(order.iter().filter(|n| n.as_str() == "list").count(), 1);
    assert!(position(&order, "list") < position(&order, "list_push"));
    assert!(position(&order, "free") < position(&order, "list_pop"));
}

/// Duplicate references collapse into a single edge
#[test]
fn test_build_withRepeatedDependency_shouldCollapseEdges() {
    let symbols = vec![
        Symbol::new("area", SymbolKind::Function, 1, 3).with_dependencies(["square", "square"]),
        Symbol::new("square", SymbolKind::Function, 4, 6),
    ];
    let graph = DependencyGraph::build(&symbols);

    assert_eq!(graph.edge_count(), 1);
    assert_eq!(graph.dependencies_of("area"), vec!["square"]);
}
