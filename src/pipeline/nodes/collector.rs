//! CollectorSink: stores every payload it receives.
//!
//! The sink hands out a [`CollectorHandle`] that stays valid after the sink
//! has been moved into a pipeline, so the caller can inspect what arrived.

use crate::pipeline::node::{NodeContext, Stage};
use std::sync::{Arc, Condvar, Mutex, PoisonError};
use std::time::{Duration, Instant};

#[derive(Debug)]
struct Shared<P> {
    items: Mutex<Vec<P>>,
    arrived: Condvar,
}

/// Terminal stage that records its inputs in arrival order.
pub struct CollectorSink<P> {
    name: String,
    shared: Arc<Shared<P>>,
}

/// Read side of a [`CollectorSink`].
#[derive(Debug)]
pub struct CollectorHandle<P> {
    shared: Arc<Shared<P>>,
}

impl<P> Clone for CollectorHandle<P> {
    fn clone(&self) -> Self {
        Self {
            shared: Arc::clone(&self.shared),
        }
    }
}

impl<P> CollectorSink<P> {
    pub fn new(name: impl Into<String>) -> (Self, CollectorHandle<P>) {
        let shared = Arc::new(Shared {
            items: Mutex::new(Vec::new()),
            arrived: Condvar::new(),
        });
        let handle = CollectorHandle {
            shared: Arc::clone(&shared),
        };
        (
            Self {
                name: name.into(),
                shared,
            },
            handle,
        )
    }
}

impl<P: Send> Stage<P> for CollectorSink<P> {
    fn name(&self) -> &str {
        &self.name
    }

    fn on_data(&mut self, input: P, _ctx: &mut NodeContext<'_, P>) -> anyhow::Result<()> {
        let mut items = self
            .shared
            .items
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        items.push(input);
        self.shared.arrived.notify_all();
        Ok(())
    }
}

impl<P> CollectorHandle<P> {
    fn lock(&self) -> std::sync::MutexGuard<'_, Vec<P>> {
        self.shared
            .items
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }

    /// Remove and return everything collected so far.
    pub fn take(&self) -> Vec<P> {
        std::mem::take(&mut *self.lock())
    }

    /// Block until at least `count` items arrived or `timeout` passes.
    /// Returns whether the count was reached.
    pub fn wait_for(&self, count: usize, timeout: Duration) -> bool {
        let Some(deadline) = Instant::now().checked_add(timeout) else {
            let items = self.lock();
            let _items = self
                .shared
                .arrived
                .wait_while(items, |items| items.len() < count)
                .unwrap_or_else(PoisonError::into_inner);
            return true;
        };
        let mut items = self.lock();
        while items.len() < count {
            let now = Instant::now();
            if now >= deadline {
                return false;
            }
            let (guard, _) = self
                .shared
                .arrived
                .wait_timeout(items, deadline - now)
                .unwrap_or_else(PoisonError::into_inner);
            items = guard;
        }
        true
    }
}

impl<P: Clone> CollectorHandle<P> {
    /// Copy of everything collected so far.
    pub fn items(&self) -> Vec<P> {
        self.lock().clone()
    }
}
