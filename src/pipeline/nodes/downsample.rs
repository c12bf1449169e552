//! Downsample: keeps every `factor`-th sample.
//!
//! The decimation phase is carried across frames, so splitting a stream into
//! frames of any length yields the same output samples. Output frames are on
//! the decimated grid: their sample rate is divided by `factor` and their
//! offset counts decimated samples. Frames that contribute no sample produce
//! no output.

use crate::pipeline::node::{NodeContext, Stage};
use crate::pipeline::payload::Frame;

pub struct Downsample {
    name: String,
    factor: usize,
    /// Input samples to drop before the next kept one.
    skip: usize,
    /// Offset of the next output sample.
    next_offset: u64,
}

impl Downsample {
    /// `factor` is clamped to at least 1.
    pub fn new(name: impl Into<String>, factor: usize) -> Self {
        Self {
            name: name.into(),
            factor: factor.max(1),
            skip: 0,
            next_offset: 0,
        }
    }

    pub fn factor(&self) -> usize {
        self.factor
    }
}

impl Stage<Frame> for Downsample {
    fn name(&self) -> &str {
        &self.name
    }

    fn on_data(&mut self, input: Frame, ctx: &mut NodeContext<'_, Frame>) -> anyhow::Result<()> {
        let len = input.len();
        if self.skip >= len {
            self.skip -= len;
            return Ok(());
        }

        let start = self.skip;
        let kept = (len - start).div_ceil(self.factor);
        let last = start + (kept - 1) * self.factor;
        self.skip = last + self.factor - len;

        let channels: Vec<Vec<f64>> = input
            .channels()
            .iter()
            .map(|ch| ch[start..].iter().step_by(self.factor).copied().collect())
            .collect();

        let offset = self.next_offset;
        self.next_offset += kept as u64;
        ctx.emit(Frame::new(
            offset,
            input.sample_rate() / self.factor as f64,
            channels,
        )?);
        Ok(())
    }
}
