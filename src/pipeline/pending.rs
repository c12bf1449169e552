//! Pending-work bookkeeping for async boundaries.
//!
//! Every boundary owns a [`PendingCounter`]. Enqueuing an item increments it
//! and hands out a [`Ticket`]; the counter is decremented when the last
//! reference to that ticket is dropped.
//!
//! Tickets form chains: an item enqueued while another boundary's item is
//! being processed holds a reference to that parent ticket. The parent's
//! counter therefore only drops once every item it spawned downstream has
//! finished as well, which is what makes `wait()` transitive.

use std::sync::{Arc, Condvar, Mutex, PoisonError};
use std::time::{Duration, Instant};

/// Count of in-flight items for one boundary.
#[derive(Debug, Default)]
pub struct PendingCounter {
    count: Mutex<usize>,
    drained: Condvar,
}

impl PendingCounter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Current number of outstanding items.
    pub fn get(&self) -> usize {
        *self.count.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn increment(&self) {
        *self.count.lock().unwrap_or_else(PoisonError::into_inner) += 1;
    }

    fn decrement(&self) {
        let mut count = self.count.lock().unwrap_or_else(PoisonError::into_inner);
        debug_assert!(*count > 0, "pending counter underflow");
        *count = count.saturating_sub(1);
        if *count == 0 {
            self.drained.notify_all();
        }
    }

    /// Block until the counter reaches zero.
    pub fn wait_zero(&self) {
        let count = self.count.lock().unwrap_or_else(PoisonError::into_inner);
        let _count = self
            .drained
            .wait_while(count, |c| *c > 0)
            .unwrap_or_else(PoisonError::into_inner);
    }

    /// Block until the counter reaches zero or `deadline` passes.
    ///
    /// Returns `true` if the counter drained in time.
    pub fn wait_zero_until(&self, deadline: Instant) -> bool {
        let mut count = self.count.lock().unwrap_or_else(PoisonError::into_inner);
        while *count > 0 {
            let now = Instant::now();
            if now >= deadline {
                return false;
            }
            let (guard, _) = self
                .drained
                .wait_timeout(count, deadline - now)
                .unwrap_or_else(PoisonError::into_inner);
            count = guard;
        }
        true
    }

    pub fn wait_zero_timeout(&self, timeout: Duration) -> bool {
        match Instant::now().checked_add(timeout) {
            Some(deadline) => self.wait_zero_until(deadline),
            None => {
                self.wait_zero();
                true
            }
        }
    }
}

/// Completion token for one enqueued item.
///
/// Dropping the last `Arc<Ticket>` decrements the owning counter.
#[derive(Debug)]
pub struct Ticket {
    counter: Arc<PendingCounter>,
    _parent: Option<Arc<Ticket>>,
}

impl Ticket {
    /// Register a new item on `counter`, optionally keeping `parent` open
    /// until this item completes.
    pub fn issue(counter: &Arc<PendingCounter>, parent: Option<&Arc<Ticket>>) -> Arc<Self> {
        counter.increment();
        Arc::new(Self {
            counter: Arc::clone(counter),
            _parent: parent.cloned(),
        })
    }
}

impl Drop for Ticket {
    fn drop(&mut self) {
        self.counter.decrement();
    }
}
