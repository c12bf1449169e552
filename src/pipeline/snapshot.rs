//! Serializable topology snapshots.

use crate::pipeline::id::{EdgeId, NodeId};
use crate::pipeline::node::NodeKind;
use serde::{Deserialize, Serialize};

/// Snapshot of a single pipeline node.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NodeSnapshot {
    pub id: NodeId,
    pub name: String,
    pub kind: NodeKind,
}

/// Snapshot of a single pipeline edge.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EdgeSnapshot {
    pub id: EdgeId,
    pub from_node: NodeId,
    pub to_node: NodeId,
}

/// Complete topology snapshot of the pipeline graph.
///
/// Edges are listed per source node, in connection order.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TopologySnapshot {
    pub nodes: Vec<NodeSnapshot>,
    pub edges: Vec<EdgeSnapshot>,
}

impl TopologySnapshot {
    /// Nodes without downstream edges.
    pub fn sinks(&self) -> Vec<NodeId> {
        self.nodes
            .iter()
            .map(|n| n.id)
            .filter(|id| !self.edges.iter().any(|e| e.from_node == *id))
            .collect()
    }

    /// Nodes without upstream edges.
    pub fn sources(&self) -> Vec<NodeId> {
        self.nodes
            .iter()
            .map(|n| n.id)
            .filter(|id| !self.edges.iter().any(|e| e.to_node == *id))
            .collect()
    }

    pub fn to_json(&self) -> serde_json::Result<String> {
        serde_json::to_string_pretty(self)
    }
}
