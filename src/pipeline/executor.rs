//! Pipeline runtime: write propagation and the completion barrier.
//!
//! A built [`Pipeline`] is immutable: nodes, edges and the precomputed
//! barrier sets never change after [`PipelineBuilder::build`]. Writing to a
//! node runs its transform and forwards every output to each downstream node
//! on the calling thread, in connection order. The one exception is a hop
//! into an async boundary, which queues the payload and returns.
//!
//! [`PipelineBuilder::build`]: crate::pipeline::PipelineBuilder::build

use crate::config::RuntimeConfig;
use crate::pipeline::boundary::{AsyncBoundary, BoundaryState, BoundaryStats, Job};
use crate::pipeline::error::{PipelineError, PipelineResult};
use crate::pipeline::id::{EdgeId, NodeId};
use crate::pipeline::node::{AnyNode, NodeContext};
use crate::pipeline::payload::Payload;
use crate::pipeline::pending::Ticket;
use crate::pipeline::snapshot::{EdgeSnapshot, NodeSnapshot, TopologySnapshot};
use crossbeam_channel::{bounded, Receiver, Sender, TrySendError};
use std::any::Any;
use std::panic::{self, AssertUnwindSafe};
use std::sync::{Arc, PoisonError};
use std::thread;
use std::time::{Duration, Instant};

/// A failure captured on a boundary worker.
#[derive(Debug)]
pub struct AsyncFailure {
    /// The boundary whose worker ran the failing cascade.
    pub boundary: NodeId,
    pub boundary_name: String,
    /// Queue sequence number of the item that failed.
    pub seq: u64,
    pub error: PipelineError,
}

/// A node with its wiring, as stored in the built pipeline.
pub(crate) struct NodeSlot<P: Payload> {
    pub name: String,
    pub node: AnyNode<P>,
    /// Downstream nodes in connection order.
    pub downstream: Vec<NodeId>,
    /// Boundaries reachable from this node (itself included), upstream first.
    pub barrier: Vec<NodeId>,
}

pub(crate) struct PipelineInner<P: Payload> {
    slots: Vec<NodeSlot<P>>,
    /// Every boundary in topological order.
    boundaries: Vec<NodeId>,
    edge_count: usize,
    failure_tx: Sender<AsyncFailure>,
    failure_rx: Receiver<AsyncFailure>,
    config: RuntimeConfig,
}

impl<P: Payload> PipelineInner<P> {
    pub fn new(
        slots: Vec<NodeSlot<P>>,
        boundaries: Vec<NodeId>,
        config: RuntimeConfig,
    ) -> Self {
        let (failure_tx, failure_rx) = bounded(config.failure_channel_capacity.max(1));
        let edge_count = slots.iter().map(|s| s.downstream.len()).sum();
        Self {
            slots,
            boundaries,
            edge_count,
            failure_tx,
            failure_rx,
            config,
        }
    }

    pub fn config(&self) -> &RuntimeConfig {
        &self.config
    }

    fn slot(&self, id: NodeId) -> PipelineResult<&NodeSlot<P>> {
        self.slots
            .get(id.index())
            .ok_or(PipelineError::UnknownNode(id))
    }

    fn boundary(&self, id: NodeId) -> Option<&AsyncBoundary<P>> {
        match self.slots.get(id.index()).map(|s| &s.node) {
            Some(AnyNode::Async(boundary)) => Some(boundary),
            _ => None,
        }
    }

    /// Deliver `data` to node `id`.
    ///
    /// `parent` is the ticket of the boundary item whose cascade this write
    /// belongs to, `None` for writes from outside the pipeline.
    fn dispatch(
        self: &Arc<Self>,
        id: NodeId,
        data: P,
        parent: Option<&Arc<Ticket>>,
    ) -> PipelineResult<()> {
        let slot = self.slot(id)?;
        match &slot.node {
            AnyNode::Passthrough => self.forward(slot, data, parent),
            AnyNode::Stage(stage) => {
                let mut outputs = Vec::new();
                {
                    let mut stage = stage.lock().unwrap_or_else(PoisonError::into_inner);
                    let mut ctx = NodeContext::new(id, &mut outputs);
                    stage
                        .on_data(data, &mut ctx)
                        .map_err(|source| PipelineError::Node {
                            node_id: id,
                            name: slot.name.clone(),
                            source,
                        })?;
                }
                for output in outputs {
                    self.forward(slot, output, parent)?;
                }
                Ok(())
            }
            AnyNode::Split => {
                let expected = slot.downstream.len();
                let parts = data.into_parts().ok_or(PipelineError::ShapeMismatch {
                    node_id: id,
                    expected,
                    found: None,
                })?;
                if parts.len() != expected {
                    return Err(PipelineError::ShapeMismatch {
                        node_id: id,
                        expected,
                        found: Some(parts.len()),
                    });
                }
                for (&target, part) in slot.downstream.iter().zip(parts) {
                    self.dispatch(target, part, parent)?;
                }
                Ok(())
            }
            AnyNode::Async(boundary) => boundary.enqueue(self, data, parent),
        }
    }

    /// Broadcast `data` to every downstream node of `slot`.
    fn forward(
        self: &Arc<Self>,
        slot: &NodeSlot<P>,
        data: P,
        parent: Option<&Arc<Ticket>>,
    ) -> PipelineResult<()> {
        let Some((&last, rest)) = slot.downstream.split_last() else {
            return Ok(());
        };
        for &target in rest {
            self.dispatch(target, data.clone(), parent)?;
        }
        self.dispatch(last, data, parent)
    }

    /// Run the downstream cascade of one queued item. Called on the
    /// boundary's worker thread.
    pub fn process_job(self: &Arc<Self>, boundary_id: NodeId, job: Job<P>) {
        let Job {
            payload,
            seq,
            ticket,
        } = job;
        let Some(slot) = self.slots.get(boundary_id.index()) else {
            return;
        };

        let result = panic::catch_unwind(AssertUnwindSafe(|| {
            self.forward(slot, payload, Some(&ticket))
        }))
        .unwrap_or_else(|panic| {
            Err(PipelineError::Panicked {
                node_id: boundary_id,
                name: slot.name.clone(),
                message: panic_message(panic.as_ref()),
            })
        });

        if let Some(boundary) = self.boundary(boundary_id) {
            boundary.record_outcome(result.is_ok());
        }
        if let Err(error) = result {
            self.report_failure(boundary_id, &slot.name, seq, error);
        }

        // Released last so `wait()` only returns once the failure is visible.
        drop(ticket);
    }

    fn report_failure(&self, boundary: NodeId, name: &str, seq: u64, error: PipelineError) {
        tracing::error!("Async boundary '{}' item #{} failed: {}", name, seq, error);
        let failure = AsyncFailure {
            boundary,
            boundary_name: name.to_string(),
            seq,
            error,
        };
        if let Err(TrySendError::Full(dropped)) = self.failure_tx.try_send(failure) {
            tracing::warn!(
                "Failure channel full, dropping report for '{}' item #{}",
                dropped.boundary_name,
                dropped.seq
            );
        }
    }

    fn wait_all_in(&self, ids: &[NodeId]) {
        for &id in ids {
            if let Some(boundary) = self.boundary(id) {
                boundary.pending().wait_zero();
            }
        }
    }

    fn wait_all_in_until(&self, ids: &[NodeId], deadline: Instant) -> bool {
        ids.iter().all(|&id| {
            self.boundary(id)
                .map_or(true, |b| b.pending().wait_zero_until(deadline))
        })
    }
}

fn panic_message(panic: &(dyn Any + Send)) -> String {
    if let Some(s) = panic.downcast_ref::<&str>() {
        s.to_string()
    } else if let Some(s) = panic.downcast_ref::<String>() {
        s.clone()
    } else {
        "non-string panic payload".to_string()
    }
}

/// A built, immutable pipeline graph.
///
/// Cloning is cheap and every clone refers to the same graph, so the
/// pipeline can be shared between producer threads.
pub struct Pipeline<P: Payload> {
    inner: Arc<PipelineInner<P>>,
}

impl<P: Payload> Clone for Pipeline<P> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<P: Payload> Pipeline<P> {
    pub(crate) fn from_inner(inner: PipelineInner<P>) -> Self {
        Self {
            inner: Arc::new(inner),
        }
    }

    /// Write `data` into node `id`.
    ///
    /// Everything up to the first async boundary on each path runs before
    /// this returns; the first error aborts the cascade and is returned.
    pub fn write(&self, id: NodeId, data: P) -> PipelineResult<()> {
        self.inner.dispatch(id, data, None)
    }

    /// Block until every async boundary reachable from `id` has drained,
    /// including work those boundaries queued further downstream.
    ///
    /// Returns immediately when no boundary is reachable. Calling this from
    /// a cascade running on one of the awaited boundaries deadlocks.
    pub fn wait(&self, id: NodeId) -> PipelineResult<()> {
        let slot = self.inner.slot(id)?;
        self.inner.wait_all_in(&slot.barrier);
        Ok(())
    }

    /// Like [`Pipeline::wait`] with a deadline. Returns `Ok(false)` on timeout.
    /// A timeout too large to represent as an `Instant` waits without one.
    pub fn wait_timeout(&self, id: NodeId, timeout: Duration) -> PipelineResult<bool> {
        let slot = self.inner.slot(id)?;
        match Instant::now().checked_add(timeout) {
            Some(deadline) => Ok(self.inner.wait_all_in_until(&slot.barrier, deadline)),
            None => {
                self.inner.wait_all_in(&slot.barrier);
                Ok(true)
            }
        }
    }

    /// Block until every boundary in the pipeline has drained.
    pub fn wait_all(&self) {
        self.inner.wait_all_in(&self.inner.boundaries);
    }

    /// Handle bound to a single node.
    pub fn node(&self, id: NodeId) -> PipelineResult<NodeHandle<P>> {
        self.inner.slot(id)?;
        Ok(NodeHandle {
            pipeline: self.clone(),
            id,
        })
    }

    /// Look up a node by name. Returns the first match in insertion order.
    pub fn find(&self, name: &str) -> Option<NodeId> {
        self.inner
            .slots
            .iter()
            .position(|s| s.name == name)
            .map(|i| NodeId(i as u32))
    }

    pub fn node_count(&self) -> usize {
        self.inner.slots.len()
    }

    pub fn edge_count(&self) -> usize {
        self.inner.edge_count
    }

    /// Downstream nodes of `id` in connection order.
    pub fn downstream(&self, id: NodeId) -> PipelineResult<&[NodeId]> {
        Ok(&self.inner.slot(id)?.downstream)
    }

    /// Async boundaries in topological order.
    pub fn boundaries(&self) -> &[NodeId] {
        &self.inner.boundaries
    }

    /// Receiver for failures captured on boundary workers.
    pub fn failures(&self) -> Receiver<AsyncFailure> {
        self.inner.failure_rx.clone()
    }

    /// Drain all failures reported so far.
    pub fn drain_failures(&self) -> Vec<AsyncFailure> {
        self.inner.failure_rx.try_iter().collect()
    }

    /// Statistics for boundary `id`, `None` if it is not a boundary.
    pub fn boundary_stats(&self, id: NodeId) -> Option<BoundaryStats> {
        self.inner.boundary(id).map(AsyncBoundary::stats)
    }

    pub fn boundary_state(&self, id: NodeId) -> Option<BoundaryState> {
        self.inner.boundary(id).map(AsyncBoundary::state)
    }

    /// Serializable description of the graph.
    pub fn topology(&self) -> TopologySnapshot {
        let mut edges = Vec::with_capacity(self.inner.edge_count);
        let nodes = self
            .inner
            .slots
            .iter()
            .enumerate()
            .map(|(i, slot)| {
                let id = NodeId(i as u32);
                for &to in &slot.downstream {
                    edges.push(EdgeSnapshot {
                        id: EdgeId(edges.len() as u32),
                        from_node: id,
                        to_node: to,
                    });
                }
                NodeSnapshot {
                    id,
                    name: slot.name.clone(),
                    kind: slot.node.kind(),
                }
            })
            .collect();
        TopologySnapshot { nodes, edges }
    }

    /// Close every boundary, let workers finish what is already queued, and
    /// join them. Later writes that reach a boundary fail with
    /// [`PipelineError::BoundaryClosed`].
    pub fn shutdown(&self) {
        let current = thread::current().id();
        for &id in &self.inner.boundaries {
            let Some(handle) = self.inner.boundary(id).and_then(AsyncBoundary::close) else {
                continue;
            };
            if handle.thread().id() == current {
                tracing::warn!("shutdown() called from the worker of {}, not joining", id);
                continue;
            }
            if handle.join().is_err() {
                tracing::error!("Worker thread for {} panicked", id);
            }
        }
        tracing::info!("Pipeline shut down ({} boundaries)", self.inner.boundaries.len());
    }
}

/// A pipeline handle bound to one node.
pub struct NodeHandle<P: Payload> {
    pipeline: Pipeline<P>,
    id: NodeId,
}

impl<P: Payload> Clone for NodeHandle<P> {
    fn clone(&self) -> Self {
        Self {
            pipeline: self.pipeline.clone(),
            id: self.id,
        }
    }
}

impl<P: Payload> NodeHandle<P> {
    pub fn id(&self) -> NodeId {
        self.id
    }

    pub fn name(&self) -> &str {
        &self.pipeline.inner.slots[self.id.index()].name
    }

    pub fn write(&self, data: P) -> PipelineResult<()> {
        self.pipeline.write(self.id, data)
    }

    pub fn wait(&self) -> PipelineResult<()> {
        self.pipeline.wait(self.id)
    }

    pub fn wait_timeout(&self, timeout: Duration) -> PipelineResult<bool> {
        self.pipeline.wait_timeout(self.id, timeout)
    }

    pub fn pipeline(&self) -> &Pipeline<P> {
        &self.pipeline
    }
}
