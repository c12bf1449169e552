//! SpectrumNode: magnitude spectrum of each channel.
//!
//! Every input frame is transformed independently. The output frame keeps
//! the input's offset and sample rate; each channel holds the one-sided
//! magnitudes for bins `0..=n/2`, where `n` is the input length rounded up
//! to a power of two.

use crate::analysis::{SpectrumAnalyzer, WindowFunction};
use crate::pipeline::node::{NodeContext, Stage};
use crate::pipeline::payload::Frame;

pub struct SpectrumNode {
    name: String,
    analyzer: SpectrumAnalyzer,
}

impl SpectrumNode {
    pub fn new(name: impl Into<String>, window: WindowFunction) -> Self {
        Self {
            name: name.into(),
            analyzer: SpectrumAnalyzer::new(window, true),
        }
    }
}

impl Stage<Frame> for SpectrumNode {
    fn name(&self) -> &str {
        &self.name
    }

    fn on_data(&mut self, input: Frame, ctx: &mut NodeContext<'_, Frame>) -> anyhow::Result<()> {
        if input.is_empty() {
            return Ok(());
        }
        let rate = input.sample_rate();
        let spectra = input
            .channels()
            .iter()
            .map(|ch| self.analyzer.compute(ch, rate).magnitudes)
            .collect();
        ctx.emit(input.with_channels(spectra)?);
        Ok(())
    }
}
