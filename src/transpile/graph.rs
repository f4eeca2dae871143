/*!
 * Dependency graph over extracted symbol names.
 *
 * An edge `a -> b` always means "a depends on b". The topological order
 * produced here lists dependencies before their dependents, so a struct is
 * emitted before the functions that use it. Ties between independent nodes
 * are broken by insertion order, which makes the order deterministic for a
 * given symbol list.
 */

use log::debug;
use petgraph::algo::tarjan_scc;
use petgraph::graph::{DiGraph, NodeIndex};
use petgraph::Direction;
use std::cmp::Reverse;
use std::collections::{BinaryHeap, HashMap, HashSet};

use crate::errors::CycleError;

use super::symbols::Symbol;

/// Directed "depends on" graph keyed by symbol name
#[derive(Debug, Clone, Default)]
pub struct DependencyGraph {
    /// Graph storage; node weights are names
    graph: DiGraph<String, ()>,

    /// Name -> node index mapping for O(1) lookups
    name_to_node: HashMap<String, NodeIndex>,

    /// Names that were declared as symbols (everything else is external)
    declared: HashSet<String>,
}

impl DependencyGraph {
    /// Create an empty graph
    pub fn new() -> Self {
        Self::default()
    }

    /// Build a graph from an extracted symbol list.
    ///
    /// Every symbol name becomes a node in first-seen order. Dependencies that
    /// are not symbols themselves still become nodes, without outgoing edges.
    /// A symbol depending on itself (plain recursion) does not constrain the
    /// order and is left out of the graph.
    pub fn build(symbols: &[Symbol]) -> Self {
        let mut graph = Self::new();

        for symbol in symbols {
            graph.add_node(&symbol.name);
            graph.declared.insert(symbol.name.clone());
        }

        for symbol in symbols {
            for dependency in &symbol.dependencies {
                if dependency == &symbol.name {
                    debug!("Ignoring self reference in `{}`", symbol.name);
                    continue;
                }
                graph.add_edge(&symbol.name, dependency);
            }
        }

        debug!(
            "Built dependency graph with {} nodes and {} edges",
            graph.node_count(),
            graph.edge_count()
        );

        graph
    }

    /// Add a node if it is not present yet and return its index
    pub fn add_node(&mut self, name: &str) -> NodeIndex {
        if let Some(&idx) = self.name_to_node.get(name) {
            return idx;
        }
        let idx = self.graph.add_node(name.to_string());
        self.name_to_node.insert(name.to_string(), idx);
        idx
    }

    /// Record that `from` depends on `to`; repeated edges are collapsed
    pub fn add_edge(&mut self, from: &str, to: &str) {
        let from_idx = self.add_node(from);
        let to_idx = self.add_node(to);
        if self.graph.find_edge(from_idx, to_idx).is_none() {
            self.graph.add_edge(from_idx, to_idx, ());
        }
    }

    pub fn contains(&self, name: &str) -> bool {
        self.name_to_node.contains_key(name)
    }

    pub fn node_count(&self) -> usize {
        self.graph.node_count()
    }

    pub fn edge_count(&self) -> usize {
        self.graph.edge_count()
    }

    /// True when the name is only known as somebody's dependency
    pub fn is_external(&self, name: &str) -> bool {
        self.contains(name) && !self.declared.contains(name)
    }

    /// Direct dependencies of a node, in insertion order
    pub fn dependencies_of(&self, name: &str) -> Vec<String> {
        self.neighbors(name, Direction::Outgoing)
    }

    /// Direct dependents of a node, in insertion order
    pub fn dependents_of(&self, name: &str) -> Vec<String> {
        self.neighbors(name, Direction::Incoming)
    }

    fn neighbors(&self, name: &str, direction: Direction) -> Vec<String> {
        let Some(&idx) = self.name_to_node.get(name) else {
            return Vec::new();
        };
        let mut nodes: Vec<NodeIndex> = self.graph.neighbors_directed(idx, direction).collect();
        nodes.sort();
        nodes.dedup();
        nodes.into_iter().map(|n| self.graph[n].clone()).collect()
    }

    /// Linearize the graph with Kahn's algorithm, dependencies first.
    ///
    /// Fails with every member of every cycle when the graph is not a DAG;
    /// no partial order is returned in that case.
    pub fn topological_order(&self) -> Result<Vec<String>, CycleError> {
        // Number of dependencies not yet emitted, per node
        let mut pending: Vec<usize> = self
            .graph
            .node_indices()
            .map(|idx| self.dependencies_count(idx))
            .collect();

        let mut ready: BinaryHeap<Reverse<usize>> = pending
            .iter()
            .enumerate()
            .filter(|(_, count)| **count == 0)
            .map(|(i, _)| Reverse(i))
            .collect();

        let mut order = Vec::with_capacity(self.graph.node_count());

        while let Some(Reverse(i)) = ready.pop() {
            let idx = NodeIndex::new(i);
            order.push(self.graph[idx].clone());

            for dependent in self.graph.neighbors_directed(idx, Direction::Incoming) {
                let slot = &mut pending[dependent.index()];
                *slot -= 1;
                if *slot == 0 {
                    ready.push(Reverse(dependent.index()));
                }
            }
        }

        if order.len() != self.graph.node_count() {
            return Err(CycleError {
                participants: self.cycle_participants(),
            });
        }

        Ok(order)
    }

    /// Members of all non-trivial strongly connected components, in insertion order
    pub fn cycle_participants(&self) -> Vec<String> {
        let mut members: Vec<NodeIndex> = tarjan_scc(&self.graph)
            .into_iter()
            .filter(|scc| scc.len() > 1 || scc.iter().any(|&n| self.graph.contains_edge(n, n)))
            .flatten()
            .collect();
        members.sort();
        members.into_iter().map(|n| self.graph[n].clone()).collect()
    }

    fn dependencies_count(&self, idx: NodeIndex) -> usize {
        self.graph.neighbors_directed(idx, Direction::Outgoing).count()
    }
}
