//! Common test utilities and helpers

#![allow(dead_code)] // Test utilities may not all be used in every test file

pub mod builders;

use std::sync::{Arc, Mutex};
use std::thread;
use std::time::Duration;

/// Upper bound for anything a test waits on
pub fn test_timeout() -> Duration {
    Duration::from_secs(5)
}

/// Assert two floats are approximately equal
pub fn assert_float_eq(a: f64, b: f64, epsilon: f64) {
    assert!(
        (a - b).abs() < epsilon,
        "Expected {} to be approximately equal to {} (epsilon: {})",
        a,
        b,
        epsilon
    );
}

/// One observed stage invocation
#[derive(Debug, Clone, PartialEq)]
pub struct Event {
    pub node: String,
    pub value: i64,
    pub thread: Option<String>,
}

/// Ordered record of stage invocations, shared across threads
#[derive(Debug, Clone, Default)]
pub struct EventLog(Arc<Mutex<Vec<Event>>>);

impl EventLog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record(&self, node: &str, value: i64) {
        self.0.lock().unwrap().push(Event {
            node: node.to_string(),
            value,
            thread: thread::current().name().map(str::to_string),
        });
    }

    pub fn events(&self) -> Vec<Event> {
        self.0.lock().unwrap().clone()
    }

    pub fn len(&self) -> usize {
        self.0.lock().unwrap().len()
    }

    /// Node names in invocation order
    pub fn nodes(&self) -> Vec<String> {
        self.events().into_iter().map(|e| e.node).collect()
    }

    /// Values seen by `node`, in order
    pub fn values_for(&self, node: &str) -> Vec<i64> {
        self.events()
            .into_iter()
            .filter(|e| e.node == node)
            .map(|e| e.value)
            .collect()
    }

    pub fn count_for(&self, node: &str) -> usize {
        self.values_for(node).len()
    }
}
