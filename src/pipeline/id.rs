//! Node and edge identifiers.
//!
//! A `NodeId` is the node's position in the builder's arena and stays the
//! same after `build`, so ids handed out while wiring remain valid on the
//! running pipeline.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Arena index of a node, assigned in insertion order.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default, Serialize, Deserialize)]
pub struct NodeId(pub u32);

impl NodeId {
    #[inline]
    pub fn index(self) -> usize {
        self.0 as usize
    }
}

impl fmt::Debug for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "NodeId({})", self.0)
    }
}

impl fmt::Display for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Label for an edge in a [`TopologySnapshot`](super::TopologySnapshot).
///
/// The runtime stores edges only as per-node downstream lists, so there is
/// no edge table to index. Snapshots number edges by source node, then by
/// connection order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct EdgeId(pub u32);
