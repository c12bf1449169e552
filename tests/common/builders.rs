//! Test stage builders

use super::EventLog;
use pype_rs::pipeline::{NodeContext, Stage};
use std::time::Duration;

/// Builder for configurable `i64` test stages
pub struct StageBuilder {
    name: String,
    log: EventLog,
    delay: Duration,
    fail_on: Option<i64>,
    panic_on: Option<i64>,
    forward: bool,
    offset: i64,
}

impl StageBuilder {
    pub fn new(name: &str, log: &EventLog) -> Self {
        Self {
            name: name.to_string(),
            log: log.clone(),
            delay: Duration::ZERO,
            fail_on: None,
            panic_on: None,
            forward: true,
            offset: 0,
        }
    }

    /// Sleep before handling each input
    pub fn delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    /// Return an error for this input value
    pub fn fail_on(mut self, value: i64) -> Self {
        self.fail_on = Some(value);
        self
    }

    /// Panic for this input value
    pub fn panic_on(mut self, value: i64) -> Self {
        self.panic_on = Some(value);
        self
    }

    /// Record inputs without emitting anything
    pub fn sink(mut self) -> Self {
        self.forward = false;
        self
    }

    /// Emit `input + offset`
    pub fn add(mut self, offset: i64) -> Self {
        self.offset = offset;
        self
    }

    pub fn build(self) -> TestStage {
        TestStage {
            name: self.name,
            log: self.log,
            delay: self.delay,
            fail_on: self.fail_on,
            panic_on: self.panic_on,
            forward: self.forward,
            offset: self.offset,
        }
    }
}

pub struct TestStage {
    name: String,
    log: EventLog,
    delay: Duration,
    fail_on: Option<i64>,
    panic_on: Option<i64>,
    forward: bool,
    offset: i64,
}

impl Stage<i64> for TestStage {
    fn name(&self) -> &str {
        &self.name
    }

    fn on_data(&mut self, input: i64, ctx: &mut NodeContext<'_, i64>) -> anyhow::Result<()> {
        if !self.delay.is_zero() {
            std::thread::sleep(self.delay);
        }
        if self.panic_on == Some(input) {
            panic!("{} panicked on {}", self.name, input);
        }
        if self.fail_on == Some(input) {
            anyhow::bail!("{} rejected {}", self.name, input);
        }
        self.log.record(&self.name, input);
        if self.forward {
            ctx.emit(input + self.offset);
        }
        Ok(())
    }
}
