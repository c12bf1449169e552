//! Pipeline-specific error types.

use crate::pipeline::id::NodeId;
use thiserror::Error;

/// Broad classification of a [`PipelineError`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// Raised while wiring the graph. The graph is left unmodified.
    Topology,
    /// A split node received a payload of the wrong shape.
    Shape,
    /// A stage failed while processing a payload.
    Transform,
    /// Worker or queue failures.
    Runtime,
}

/// Errors that can occur within the pipeline system.
#[derive(Error, Debug)]
pub enum PipelineError {
    #[error("Unknown node {0}")]
    UnknownNode(NodeId),

    #[error("Connecting {from} -> {to} would create a cycle")]
    CycleDetected { from: NodeId, to: NodeId },

    #[error("Cannot connect a group of {left} outputs to a group of {right} inputs")]
    GroupSizeMismatch { left: usize, right: usize },

    #[error("Cannot connect an empty group")]
    EmptyGroup,

    #[error("Split node {node_id} has {expected} outputs but the payload {}", describe_found(.found))]
    ShapeMismatch {
        node_id: NodeId,
        expected: usize,
        /// Number of parts the payload decomposed into, `None` if it is not a sequence.
        found: Option<usize>,
    },

    #[error("Node {node_id} ({name}) failed: {source}")]
    Node {
        node_id: NodeId,
        name: String,
        #[source]
        source: anyhow::Error,
    },

    #[error("Node {node_id} ({name}) panicked: {message}")]
    Panicked {
        node_id: NodeId,
        name: String,
        message: String,
    },

    #[error("Failed to spawn worker for {name}: {source}")]
    Spawn {
        name: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Async boundary {0} is shut down")]
    BoundaryClosed(NodeId),
}

fn describe_found(found: &Option<usize>) -> String {
    match found {
        Some(n) => format!("has {} parts", n),
        None => "is not a sequence".to_string(),
    }
}

impl PipelineError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            PipelineError::UnknownNode(_)
            | PipelineError::CycleDetected { .. }
            | PipelineError::GroupSizeMismatch { .. }
            | PipelineError::EmptyGroup => ErrorKind::Topology,
            PipelineError::ShapeMismatch { .. } => ErrorKind::Shape,
            PipelineError::Node { .. } | PipelineError::Panicked { .. } => ErrorKind::Transform,
            PipelineError::Spawn { .. } | PipelineError::BoundaryClosed(_) => ErrorKind::Runtime,
        }
    }
}

pub type PipelineResult<T> = std::result::Result<T, PipelineError>;
