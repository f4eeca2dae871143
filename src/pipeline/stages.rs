/*!
 * Stage declarations and the job state machine.
 *
 * The pipeline's stages are declared explicitly with their upstream
 * dependencies and stored in a small DAG; the engine executes them in the
 * DAG's topological order. `JobStage` is the externally visible state of a
 * job and only moves forward.
 */

use petgraph::algo::toposort;
use petgraph::graph::DiGraph;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;

use crate::errors::CycleError;

/// Externally visible state of a job
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobStage {
    Pending,
    Normalizing,
    Extracting,
    GraphBuilding,
    Segmenting,
    Translating,
    Merging,
    Completed,
    Failed,
}

impl JobStage {
    fn ordinal(self) -> u8 {
        match self {
            Self::Pending => 0,
            Self::Normalizing => 1,
            Self::Extracting => 2,
            Self::GraphBuilding => 3,
            Self::Segmenting => 4,
            Self::Translating => 5,
            Self::Merging => 6,
            Self::Completed => 7,
            Self::Failed => 8,
        }
    }

    /// Completed and Failed accept no further transitions
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Completed | Self::Failed)
    }

    /// Whether a job may move from `self` to `next`.
    ///
    /// Any non-terminal stage may fail; otherwise only the immediate
    /// successor is allowed.
    pub fn can_transition_to(self, next: JobStage) -> bool {
        if self.is_terminal() {
            return false;
        }
        if next == Self::Failed {
            return true;
        }
        next.ordinal() == self.ordinal() + 1
    }
}

impl fmt::Display for JobStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Pending => "pending",
            Self::Normalizing => "normalizing",
            Self::Extracting => "extracting",
            Self::GraphBuilding => "graph_building",
            Self::Segmenting => "segmenting",
            Self::Translating => "translating",
            Self::Merging => "merging",
            Self::Completed => "completed",
            Self::Failed => "failed",
        };
        write!(f, "{}", name)
    }
}

/// A unit of work in the pipeline
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum StageNode {
    Normalize,
    Extract,
    BuildGraph,
    Segment,
    GenerateManifest,
    /// Fan-out over all segments
    Translate,
    /// Fan-in after the barrier
    Merge,
}

impl StageNode {
    /// Job stage reported while this node runs
    pub fn job_stage(self) -> JobStage {
        match self {
            Self::Normalize => JobStage::Normalizing,
            Self::Extract => JobStage::Extracting,
            Self::BuildGraph => JobStage::GraphBuilding,
            Self::Segment | Self::GenerateManifest => JobStage::Segmenting,
            Self::Translate => JobStage::Translating,
            Self::Merge => JobStage::Merging,
        }
    }
}

impl fmt::Display for StageNode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:?}", self)
    }
}

/// Declared stages and their execution order
#[derive(Debug, Clone)]
pub struct StageGraph {
    graph: DiGraph<StageNode, ()>,
    order: Vec<StageNode>,
}

impl StageGraph {
    /// Stage declarations: each node with the nodes it consumes output from
    pub const STANDARD: &'static [(StageNode, &'static [StageNode])] = &[
        (StageNode::Normalize, &[]),
        (StageNode::Extract, &[StageNode::Normalize]),
        (StageNode::BuildGraph, &[StageNode::Extract]),
        (StageNode::Segment, &[StageNode::Normalize, StageNode::Extract]),
        (StageNode::GenerateManifest, &[StageNode::Extract, StageNode::BuildGraph, StageNode::Segment]),
        (StageNode::Translate, &[StageNode::Segment, StageNode::GenerateManifest]),
        (StageNode::Merge, &[StageNode::Translate, StageNode::GenerateManifest]),
    ];

    /// Build a stage graph from declarations, rejecting cycles
    pub fn from_declarations(declarations: &[(StageNode, &[StageNode])]) -> Result<Self, CycleError> {
        let mut graph = DiGraph::new();
        let mut index = HashMap::new();

        for (node, _) in declarations {
            index.entry(*node).or_insert_with(|| graph.add_node(*node));
        }
        for (node, upstream) in declarations {
            for dep in upstream.iter() {
                let from = *index.entry(*dep).or_insert_with(|| graph.add_node(*dep));
                graph.update_edge(from, index[node], ());
            }
        }

        let order = toposort(&graph, None)
            .map_err(|cycle| CycleError {
                participants: vec![graph[cycle.node_id()].to_string()],
            })?
            .into_iter()
            .map(|idx| graph[idx])
            .collect();

        Ok(Self { graph, order })
    }

    /// The pipeline's standard stages
    pub fn standard() -> Self {
        Self::from_declarations(Self::STANDARD).expect("standard stage declarations are acyclic")
    }

    /// Stages in execution order
    pub fn execution_order(&self) -> &[StageNode] {
        &self.order
    }

    /// Direct upstream stages of `node`
    pub fn upstream_of(&self, node: StageNode) -> Vec<StageNode> {
        let Some(idx) = self.graph.node_indices().find(|i| self.graph[*i] == node) else {
            return Vec::new();
        };
        let mut upstream: Vec<_> = self
            .graph
            .neighbors_directed(idx, petgraph::Direction::Incoming)
            .collect();
        upstream.sort();
        upstream.into_iter().map(|i| self.graph[i]).collect()
    }
}

impl Default for StageGraph {
    fn default() -> Self {
        Self::standard()
    }
}
