//! BufferSink: appends frames to a shared circular buffer.

use crate::buffer::SharedBuffer;
use crate::pipeline::node::{NodeContext, Stage};
use crate::pipeline::payload::Frame;
use std::sync::Arc;

/// Terminal stage writing every frame at the buffer's write position.
///
/// Buffer errors (channel mismatch, overflow without `allow_overflow`) fail
/// the cascade like any other stage error.
pub struct BufferSink {
    name: String,
    buffer: Arc<SharedBuffer>,
}

impl BufferSink {
    pub fn new(name: impl Into<String>, buffer: Arc<SharedBuffer>) -> Self {
        Self {
            name: name.into(),
            buffer,
        }
    }
}

impl Stage<Frame> for BufferSink {
    fn name(&self) -> &str {
        &self.name
    }

    fn on_data(&mut self, input: Frame, _ctx: &mut NodeContext<'_, Frame>) -> anyhow::Result<()> {
        self.buffer.write(input.channels())?;
        Ok(())
    }
}
