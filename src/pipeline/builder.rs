//! Declarative graph construction.
//!
//! Nodes are added to a [`PipelineBuilder`] and wired with
//! [`connect`](PipelineBuilder::connect), which takes a left and a right
//! operand, each a single node, an ordered group, or a composite returned by
//! an earlier `connect`:
//!
//! ```text
//! single → single      one edge
//! single → group       broadcast: one edge to every entry of the group
//! group  → single      merge: one edge from every exit of the group
//! group  → group       pairwise, both groups must have the same size
//! ```
//!
//! The result is a [`Composite`] whose entries are the left operand's entries
//! and whose exits are the right operand's exits, so chains evaluate left to
//! right. Every edge is checked for cycles before anything is committed.

use crate::config::RuntimeConfig;
use crate::pipeline::boundary::AsyncBoundary;
use crate::pipeline::error::{PipelineError, PipelineResult};
use crate::pipeline::executor::{NodeSlot, Pipeline, PipelineInner};
use crate::pipeline::id::NodeId;
use crate::pipeline::node::{AnyNode, FnNode, NodeContext, Stage};
use crate::pipeline::payload::Payload;
use std::sync::Mutex;

/// A wired sub-graph: where payloads enter and where they leave.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Composite {
    entries: Vec<NodeId>,
    exits: Vec<NodeId>,
}

impl Composite {
    pub fn node(id: NodeId) -> Self {
        Self {
            entries: vec![id],
            exits: vec![id],
        }
    }

    /// Ordered group of members. Entries and exits are concatenated in
    /// member order.
    pub fn group<I, C>(members: I) -> Self
    where
        I: IntoIterator<Item = C>,
        C: Into<Composite>,
    {
        let mut group = Composite::default();
        for member in members {
            let member = member.into();
            group.entries.extend(member.entries);
            group.exits.extend(member.exits);
        }
        group
    }

    pub fn entries(&self) -> &[NodeId] {
        &self.entries
    }

    pub fn exits(&self) -> &[NodeId] {
        &self.exits
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty() && self.exits.is_empty()
    }
}

impl From<NodeId> for Composite {
    fn from(id: NodeId) -> Self {
        Composite::node(id)
    }
}

impl From<&Composite> for Composite {
    fn from(c: &Composite) -> Self {
        c.clone()
    }
}

impl From<Vec<NodeId>> for Composite {
    fn from(ids: Vec<NodeId>) -> Self {
        Composite::group(ids)
    }
}

impl From<&[NodeId]> for Composite {
    fn from(ids: &[NodeId]) -> Self {
        Composite::group(ids.iter().copied())
    }
}

impl<const N: usize> From<[NodeId; N]> for Composite {
    fn from(ids: [NodeId; N]) -> Self {
        Composite::group(ids)
    }
}

enum NodeSpec<P> {
    Passthrough,
    Stage(Box<dyn Stage<P>>),
    Split,
    Async,
}

struct PendingNode<P> {
    name: String,
    spec: NodeSpec<P>,
    downstream: Vec<NodeId>,
}

/// Builds an immutable [`Pipeline`].
pub struct PipelineBuilder<P: Payload> {
    nodes: Vec<PendingNode<P>>,
    config: RuntimeConfig,
}

impl<P: Payload> Default for PipelineBuilder<P> {
    fn default() -> Self {
        Self::new()
    }
}

impl<P: Payload> PipelineBuilder<P> {
    pub fn new() -> Self {
        Self::with_config(RuntimeConfig::default())
    }

    pub fn with_config(config: RuntimeConfig) -> Self {
        Self {
            nodes: Vec::new(),
            config,
        }
    }

    // ── Nodes ──

    fn push(&mut self, name: String, spec: NodeSpec<P>) -> NodeId {
        let id = NodeId(self.nodes.len() as u32);
        self.nodes.push(PendingNode {
            name,
            spec,
            downstream: Vec::new(),
        });
        id
    }

    /// Node that forwards its input unchanged. Useful as a source.
    pub fn add_passthrough(&mut self, name: impl Into<String>) -> NodeId {
        self.push(name.into(), NodeSpec::Passthrough)
    }

    /// Add a stage, named after [`Stage::name`].
    pub fn add_stage<S>(&mut self, stage: S) -> NodeId
    where
        S: Stage<P> + 'static,
    {
        let name = stage.name().to_string();
        self.push(name, NodeSpec::Stage(Box::new(stage)))
    }

    pub fn add_boxed_stage(&mut self, stage: Box<dyn Stage<P>>) -> NodeId {
        let name = stage.name().to_string();
        self.push(name, NodeSpec::Stage(stage))
    }

    /// Add a closure stage that may emit any number of outputs.
    pub fn add_fn<F>(&mut self, name: impl Into<String>, f: F) -> NodeId
    where
        F: FnMut(P, &mut NodeContext<'_, P>) -> anyhow::Result<()> + Send + 'static,
    {
        self.add_stage(FnNode::new(name, f))
    }

    /// Add a one-in, one-out closure stage.
    pub fn add_map<F>(&mut self, name: impl Into<String>, mut f: F) -> NodeId
    where
        F: FnMut(P) -> anyhow::Result<P> + Send + 'static,
    {
        self.add_fn(name, move |input: P, ctx: &mut NodeContext<'_, P>| {
            ctx.emit(f(input)?);
            Ok(())
        })
    }

    /// Add a terminal closure stage that emits nothing.
    pub fn add_sink<F>(&mut self, name: impl Into<String>, mut f: F) -> NodeId
    where
        F: FnMut(P) -> anyhow::Result<()> + Send + 'static,
    {
        self.add_fn(name, move |input: P, _ctx: &mut NodeContext<'_, P>| f(input))
    }

    /// Node routing part `i` of each payload to its `i`-th downstream node.
    pub fn add_split(&mut self, name: impl Into<String>) -> NodeId {
        self.push(name.into(), NodeSpec::Split)
    }

    /// Async boundary: downstream processing moves to a worker thread.
    pub fn add_async(&mut self, name: impl Into<String>) -> NodeId {
        self.push(name.into(), NodeSpec::Async)
    }

    pub fn node_count(&self) -> usize {
        self.nodes.len()
    }

    pub fn edge_count(&self) -> usize {
        self.nodes.iter().map(|n| n.downstream.len()).sum()
    }

    pub fn name(&self, id: NodeId) -> Option<&str> {
        self.nodes.get(id.index()).map(|n| n.name.as_str())
    }

    /// Downstream nodes of `id` in connection order.
    pub fn downstream(&self, id: NodeId) -> Option<&[NodeId]> {
        self.nodes.get(id.index()).map(|n| n.downstream.as_slice())
    }

    // ── Wiring ──

    /// Wire `left` to `right`. See the module docs for the rules.
    ///
    /// On error nothing is connected.
    pub fn connect(
        &mut self,
        left: impl Into<Composite>,
        right: impl Into<Composite>,
    ) -> PipelineResult<Composite> {
        let left = left.into();
        let right = right.into();
        if left.exits.is_empty() || right.entries.is_empty() {
            return Err(PipelineError::EmptyGroup);
        }

        let edges: Vec<(NodeId, NodeId)> = match (left.exits.len(), right.entries.len()) {
            (1, _) => right
                .entries
                .iter()
                .map(|&to| (left.exits[0], to))
                .collect(),
            (_, 1) => left
                .exits
                .iter()
                .map(|&from| (from, right.entries[0]))
                .collect(),
            (l, r) if l == r => left
                .exits
                .iter()
                .copied()
                .zip(right.entries.iter().copied())
                .collect(),
            (l, r) => return Err(PipelineError::GroupSizeMismatch { left: l, right: r }),
        };

        // Each edge is checked against the graph including the edges added
        // before it, so cycles closed by several new edges are caught too.
        for (committed, &(from, to)) in edges.iter().enumerate() {
            if let Err(e) = self.check_edge(from, to) {
                for &(from, _) in edges[..committed].iter().rev() {
                    self.nodes[from.index()].downstream.pop();
                }
                return Err(e);
            }
            tracing::trace!("connect {} -> {}", from, to);
            self.nodes[from.index()].downstream.push(to);
        }

        Ok(Composite {
            entries: left.entries,
            exits: right.exits,
        })
    }

    /// Connect consecutive items left to right. Links made before an error
    /// stay in place.
    pub fn chain<I, C>(&mut self, items: I) -> PipelineResult<Composite>
    where
        I: IntoIterator<Item = C>,
        C: Into<Composite>,
    {
        let mut items = items.into_iter();
        let mut acc: Composite = items.next().ok_or(PipelineError::EmptyGroup)?.into();
        for item in items {
            acc = self.connect(acc, item)?;
        }
        Ok(acc)
    }

    fn check_edge(&self, from: NodeId, to: NodeId) -> PipelineResult<()> {
        for id in [from, to] {
            if id.index() >= self.nodes.len() {
                return Err(PipelineError::UnknownNode(id));
            }
        }
        if from == to || self.reaches(to, from) {
            return Err(PipelineError::CycleDetected { from, to });
        }
        Ok(())
    }

    /// Whether a directed path leads from `from` to `to`.
    pub fn reaches(&self, from: NodeId, to: NodeId) -> bool {
        self.reachable_from(from).get(to.index()).copied().unwrap_or(false)
    }

    fn reachable_from(&self, start: NodeId) -> Vec<bool> {
        let mut seen = vec![false; self.nodes.len()];
        if start.index() >= seen.len() {
            return seen;
        }
        let mut stack = vec![start.index()];
        seen[start.index()] = true;
        while let Some(idx) = stack.pop() {
            for next in &self.nodes[idx].downstream {
                if !seen[next.index()] {
                    seen[next.index()] = true;
                    stack.push(next.index());
                }
            }
        }
        seen
    }

    // ── Build ──

    /// Topological order (Kahn's algorithm).
    fn topological_order(&self) -> Vec<usize> {
        let n = self.nodes.len();
        let mut in_degree = vec![0u32; n];
        for node in &self.nodes {
            for to in &node.downstream {
                in_degree[to.index()] += 1;
            }
        }

        let mut queue: Vec<usize> = (0..n).filter(|&i| in_degree[i] == 0).collect();
        let mut order = Vec::with_capacity(n);
        while let Some(idx) = queue.pop() {
            order.push(idx);
            for next in &self.nodes[idx].downstream {
                in_degree[next.index()] -= 1;
                if in_degree[next.index()] == 0 {
                    queue.push(next.index());
                }
            }
        }
        order
    }

    /// Freeze the topology and produce a runnable pipeline.
    pub fn build(self) -> PipelineResult<Pipeline<P>> {
        let n = self.nodes.len();
        let order = self.topological_order();
        if order.len() != n {
            // connect() rejects cycles, so this only guards against bugs.
            tracing::error!(
                "Pipeline graph has a cycle! Only {} of {} nodes scheduled.",
                order.len(),
                n
            );
            return Err(PipelineError::CycleDetected {
                from: NodeId::INVALID,
                to: NodeId::INVALID,
            });
        }

        let mut rank = vec![0usize; n];
        for (pos, &idx) in order.iter().enumerate() {
            rank[idx] = pos;
        }
        let is_async: Vec<bool> = self
            .nodes
            .iter()
            .map(|node| matches!(node.spec, NodeSpec::Async))
            .collect();

        let mut boundaries: Vec<NodeId> = (0..n)
            .filter(|&i| is_async[i])
            .map(|i| NodeId(i as u32))
            .collect();
        boundaries.sort_by_key(|id| rank[id.index()]);

        let barriers: Vec<Vec<NodeId>> = (0..n)
            .map(|i| {
                let reachable = self.reachable_from(NodeId(i as u32));
                boundaries
                    .iter()
                    .copied()
                    .filter(|b| reachable[b.index()])
                    .collect()
            })
            .collect();

        for (i, node) in self.nodes.iter().enumerate() {
            if node.downstream.is_empty() && matches!(node.spec, NodeSpec::Split | NodeSpec::Async)
            {
                tracing::warn!(
                    "Node '{}' ({}) has no downstream connections",
                    node.name,
                    NodeId(i as u32)
                );
            }
        }

        let edge_count = self.edge_count();
        let slots: Vec<NodeSlot<P>> = self
            .nodes
            .into_iter()
            .zip(barriers)
            .enumerate()
            .map(|(i, (pending, barrier))| {
                let id = NodeId(i as u32);
                let node = match pending.spec {
                    NodeSpec::Passthrough => AnyNode::Passthrough,
                    NodeSpec::Stage(stage) => AnyNode::Stage(Mutex::new(stage)),
                    NodeSpec::Split => AnyNode::Split,
                    NodeSpec::Async => AnyNode::Async(AsyncBoundary::new(id, pending.name.clone())),
                };
                NodeSlot {
                    name: pending.name,
                    node,
                    downstream: pending.downstream,
                    barrier,
                }
            })
            .collect();

        tracing::info!(
            "Pipeline built: {} nodes, {} edges, {} async boundaries",
            n,
            edge_count,
            boundaries.len()
        );

        Ok(Pipeline::from_inner(PipelineInner::new(
            slots,
            boundaries,
            self.config,
        )))
    }
}
