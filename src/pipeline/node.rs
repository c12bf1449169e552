//! Node abstraction for the pipeline.
//!
//! Two-layer design:
//! - **`Stage` trait**: the contract any transform implements: take one
//!   payload, emit zero or more outputs through a [`NodeContext`].
//! - **`AnyNode` enum**: the runtime representation of a built node. The
//!   structural kinds (pass-through, split, async boundary) are handled by
//!   the runtime directly; only `AnyNode::Stage` calls user code.

use crate::pipeline::boundary::AsyncBoundary;
use crate::pipeline::id::NodeId;
use crate::pipeline::payload::Payload;
use serde::{Deserialize, Serialize};
use std::sync::Mutex;

/// Context passed to a stage for each payload.
pub struct NodeContext<'a, P> {
    node_id: NodeId,
    outputs: &'a mut Vec<P>,
}

impl<'a, P> NodeContext<'a, P> {
    pub(crate) fn new(node_id: NodeId, outputs: &'a mut Vec<P>) -> Self {
        Self { node_id, outputs }
    }

    /// Id of the node currently running.
    pub fn node_id(&self) -> NodeId {
        self.node_id
    }

    /// Queue an output for every downstream node.
    ///
    /// Outputs are forwarded in emission order once `on_data` returns `Ok`.
    pub fn emit(&mut self, output: P) {
        self.outputs.push(output);
    }

    /// Number of outputs emitted so far for this input.
    pub fn emitted(&self) -> usize {
        self.outputs.len()
    }
}

/// A transform stage.
///
/// Stages own their running state (filter history, counters, ...). The
/// runtime guarantees that only one cascade at a time calls `on_data` on a
/// given stage.
pub trait Stage<P>: Send {
    /// Human-readable name of this stage.
    fn name(&self) -> &str;

    /// Process one payload.
    ///
    /// An error aborts the cascade: nothing emitted for this input is
    /// forwarded.
    fn on_data(&mut self, input: P, ctx: &mut NodeContext<'_, P>) -> anyhow::Result<()>;
}

/// A stage backed by a closure.
pub struct FnNode<F> {
    name: String,
    f: F,
}

impl<F> FnNode<F> {
    pub fn new<P>(name: impl Into<String>, f: F) -> Self
    where
        F: FnMut(P, &mut NodeContext<'_, P>) -> anyhow::Result<()> + Send,
    {
        Self {
            name: name.into(),
            f,
        }
    }
}

impl<P, F> Stage<P> for FnNode<F>
where
    F: FnMut(P, &mut NodeContext<'_, P>) -> anyhow::Result<()> + Send,
{
    fn name(&self) -> &str {
        &self.name
    }

    fn on_data(&mut self, input: P, ctx: &mut NodeContext<'_, P>) -> anyhow::Result<()> {
        (self.f)(input, ctx)
    }
}

/// Structural kind of a node, as reported in snapshots.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum NodeKind {
    Passthrough,
    Stage,
    Split,
    Async,
}

/// Runtime representation of a built node.
pub(crate) enum AnyNode<P: Payload> {
    Passthrough,
    Stage(Mutex<Box<dyn Stage<P>>>),
    Split,
    Async(AsyncBoundary<P>),
}

impl<P: Payload> AnyNode<P> {
    pub fn kind(&self) -> NodeKind {
        match self {
            AnyNode::Passthrough => NodeKind::Passthrough,
            AnyNode::Stage(_) => NodeKind::Stage,
            AnyNode::Split => NodeKind::Split,
            AnyNode::Async(_) => NodeKind::Async,
        }
    }
}
