//! Dataflow graph runtime.
//!
//! A pipeline is a directed acyclic graph of nodes. Writing a payload into a
//! node runs that node and synchronously propagates its outputs to every
//! downstream node, in connection order, on the caller's thread. Async
//! boundaries cut the graph: a write into a boundary only enqueues the
//! payload, and the boundary's worker thread continues propagation.
//!
//! # Architecture
//!
//! ```text
//! [source] ──► [async] ┄┄ worker ┄┄► [lowpass] ──► [split] ──► [ch0 sink]
//!                                                         └──► [ch1 sink]
//! ```
//!
//! # Design
//!
//! - **Arena graph**: nodes live in a `Vec`, `NodeId` is the index.
//! - **Composites**: `connect` wires groups as broadcast, merge, or pairwise.
//! - **Acyclic by construction**: cycles are rejected at connect time.
//! - **Transitive barriers**: every queued job holds a ticket chained to the
//!   job that produced it, so `wait` covers work spawned by nested boundaries.

pub mod boundary;
pub mod builder;
pub mod error;
pub mod executor;
pub mod id;
pub mod node;
pub mod nodes;
pub mod payload;
pub mod pending;
pub mod snapshot;

pub use boundary::{BoundaryState, BoundaryStats};
pub use builder::{Composite, PipelineBuilder};
pub use error::{ErrorKind, PipelineError, PipelineResult};
pub use executor::{AsyncFailure, NodeHandle, Pipeline};
pub use id::{EdgeId, NodeId};
pub use node::{FnNode, NodeContext, NodeKind, Stage};
pub use payload::{Frame, FrameError, Payload};
pub use snapshot::{EdgeSnapshot, NodeSnapshot, TopologySnapshot};
