//! Async boundary nodes.
//!
//! A boundary decouples the writer from everything downstream of it. `write`
//! pushes the payload onto a FIFO queue and returns; a dedicated worker
//! thread, spawned on the first write, pops items in order and runs the
//! downstream cascade.
//!
//! ```text
//! caller ──write──► [queue] ──► worker thread ──write──► downstream...
//! ```
//!
//! Each queued item carries a [`Ticket`] on the boundary's
//! [`PendingCounter`]; the ticket is released once the cascade for that
//! item, including any work it queued at further boundaries, is finished.

use crate::pipeline::error::{PipelineError, PipelineResult};
use crate::pipeline::executor::PipelineInner;
use crate::pipeline::id::NodeId;
use crate::pipeline::payload::Payload;
use crate::pipeline::pending::{PendingCounter, Ticket};
use crossbeam_channel::{unbounded, Receiver, Sender};
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, PoisonError, Weak};
use std::thread::{self, JoinHandle};

/// Observable state of a boundary.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum BoundaryState {
    /// Nothing queued or in flight.
    Idle,
    /// Items are queued or their cascades are still running.
    Draining,
}

/// Point-in-time statistics for one boundary.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BoundaryStats {
    pub node_id: NodeId,
    pub name: String,
    pub state: BoundaryState,
    /// Items accepted onto the queue.
    pub enqueued: u64,
    /// Items whose cascade completed without error.
    pub processed: u64,
    /// Items whose cascade failed or panicked.
    pub failed: u64,
    /// Items (and their descendants) not yet finished.
    pub pending: usize,
    /// Whether a worker thread has been started.
    pub worker_started: bool,
}

/// One queued payload.
pub(crate) struct Job<P> {
    pub payload: P,
    pub seq: u64,
    pub ticket: Arc<Ticket>,
}

struct WorkerState<P> {
    tx: Option<Sender<Job<P>>>,
    handle: Option<JoinHandle<()>>,
    next_seq: u64,
    started: bool,
    closed: bool,
}

#[derive(Default)]
struct Counters {
    enqueued: AtomicU64,
    processed: AtomicU64,
    failed: AtomicU64,
}

pub(crate) struct AsyncBoundary<P> {
    id: NodeId,
    name: String,
    pending: Arc<PendingCounter>,
    worker: Mutex<WorkerState<P>>,
    counters: Counters,
}

impl<P: Payload> AsyncBoundary<P> {
    pub fn new(id: NodeId, name: String) -> Self {
        Self {
            id,
            name,
            pending: Arc::new(PendingCounter::new()),
            worker: Mutex::new(WorkerState {
                tx: None,
                handle: None,
                next_seq: 0,
                started: false,
                closed: false,
            }),
            counters: Counters::default(),
        }
    }

    pub fn pending(&self) -> &PendingCounter {
        &self.pending
    }

    pub fn state(&self) -> BoundaryState {
        if self.pending.get() == 0 {
            BoundaryState::Idle
        } else {
            BoundaryState::Draining
        }
    }

    /// Queue `payload` and return without running anything downstream.
    ///
    /// `parent` is the ticket of the item whose cascade is performing this
    /// write, if the write happens on another boundary's worker.
    pub fn enqueue(
        &self,
        inner: &Arc<PipelineInner<P>>,
        payload: P,
        parent: Option<&Arc<Ticket>>,
    ) -> PipelineResult<()> {
        let mut worker = self.worker.lock().unwrap_or_else(PoisonError::into_inner);
        if worker.closed {
            return Err(PipelineError::BoundaryClosed(self.id));
        }

        let tx = match &worker.tx {
            Some(tx) => tx.clone(),
            None => {
                let (tx, rx) = unbounded();
                let handle = self.spawn_worker(inner, rx)?;
                worker.tx = Some(tx.clone());
                worker.handle = Some(handle);
                worker.started = true;
                tx
            }
        };

        let seq = worker.next_seq;
        let job = Job {
            payload,
            seq,
            ticket: Ticket::issue(&self.pending, parent),
        };

        // Sending under the lock keeps sequence numbers in queue order. A
        // failed send drops the job, which releases its ticket.
        tx.send(job)
            .map_err(|_| PipelineError::BoundaryClosed(self.id))?;
        worker.next_seq += 1;
        self.counters.enqueued.fetch_add(1, Ordering::Relaxed);
        tracing::trace!("{} queued item #{}", self.name, seq);
        Ok(())
    }

    fn spawn_worker(
        &self,
        inner: &Arc<PipelineInner<P>>,
        rx: Receiver<Job<P>>,
    ) -> PipelineResult<JoinHandle<()>> {
        let thread_name = format!("{}-{}", inner.config().worker_name_prefix, self.name);
        let weak = Arc::downgrade(inner);
        let id = self.id;
        let handle = thread::Builder::new()
            .name(thread_name.clone())
            .spawn(move || run_worker(weak, id, rx))
            .map_err(|source| PipelineError::Spawn {
                name: self.name.clone(),
                source,
            })?;
        tracing::debug!("Spawned worker thread '{}'", thread_name);
        Ok(handle)
    }

    pub fn record_outcome(&self, ok: bool) {
        if ok {
            self.counters.processed.fetch_add(1, Ordering::Relaxed);
        } else {
            self.counters.failed.fetch_add(1, Ordering::Relaxed);
        }
    }

    /// Close the queue. Already queued items are still processed.
    ///
    /// Returns the worker handle so the caller can join it outside the lock.
    pub fn close(&self) -> Option<JoinHandle<()>> {
        let mut worker = self.worker.lock().unwrap_or_else(PoisonError::into_inner);
        worker.closed = true;
        worker.tx = None;
        worker.handle.take()
    }

    pub fn stats(&self) -> BoundaryStats {
        let worker_started = self
            .worker
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .started;
        BoundaryStats {
            node_id: self.id,
            name: self.name.clone(),
            state: self.state(),
            enqueued: self.counters.enqueued.load(Ordering::Relaxed),
            processed: self.counters.processed.load(Ordering::Relaxed),
            failed: self.counters.failed.load(Ordering::Relaxed),
            pending: self.pending.get(),
            worker_started,
        }
    }
}

/// Worker loop: one per boundary, exits when the queue is closed or the
/// pipeline has been dropped.
fn run_worker<P: Payload>(inner: Weak<PipelineInner<P>>, id: NodeId, rx: Receiver<Job<P>>) {
    tracing::debug!("Boundary worker for {} started", id);

    while let Ok(job) = rx.recv() {
        let Some(inner) = inner.upgrade() else {
            break;
        };
        inner.process_job(id, job);
    }

    tracing::debug!("Boundary worker for {} exiting", id);
}
