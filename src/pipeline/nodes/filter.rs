//! LowPassFilter: single-pole IIR low-pass over frames.
//!
//! Each channel keeps its last output sample, so consecutive frames of one
//! stream are filtered as a continuous signal. A change in channel count
//! resets the state.

use crate::pipeline::node::{NodeContext, Stage};
use crate::pipeline::payload::Frame;
use std::f64::consts::PI;

pub struct LowPassFilter {
    name: String,
    cutoff_hz: f64,
    /// Last output per channel. Empty until the first frame.
    state: Vec<f64>,
}

impl LowPassFilter {
    pub fn new(name: impl Into<String>, cutoff_hz: f64) -> Self {
        Self {
            name: name.into(),
            cutoff_hz,
            state: Vec::new(),
        }
    }

    pub fn cutoff_hz(&self) -> f64 {
        self.cutoff_hz
    }

    /// Forget the filter history.
    pub fn reset(&mut self) {
        self.state.clear();
    }

    /// Smoothing factor for one sample period.
    fn alpha(&self, sample_rate: f64) -> f64 {
        let rc = 1.0 / (2.0 * PI * self.cutoff_hz);
        let dt = 1.0 / sample_rate;
        dt / (rc + dt)
    }
}

impl Stage<Frame> for LowPassFilter {
    fn name(&self) -> &str {
        &self.name
    }

    fn on_data(&mut self, input: Frame, ctx: &mut NodeContext<'_, Frame>) -> anyhow::Result<()> {
        anyhow::ensure!(
            self.cutoff_hz > 0.0,
            "cutoff frequency must be positive, got {}",
            self.cutoff_hz
        );
        if input.is_empty() {
            return Ok(());
        }

        if self.state.len() != input.channel_count() {
            tracing::debug!(
                "{}: channel count changed to {}, resetting state",
                self.name,
                input.channel_count()
            );
            self.state = input.channels().iter().map(|ch| ch[0]).collect();
        }

        let alpha = self.alpha(input.sample_rate());
        let filtered = input
            .channels()
            .iter()
            .zip(self.state.iter_mut())
            .map(|(ch, last)| {
                ch.iter()
                    .map(|&x| {
                        *last += alpha * (x - *last);
                        *last
                    })
                    .collect()
            })
            .collect();

        ctx.emit(input.with_channels(filtered)?);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pipeline::id::NodeId;

    fn run(filter: &mut LowPassFilter, frame: Frame) -> Vec<Frame> {
        let mut out = Vec::new();
        let mut ctx = NodeContext::new(NodeId(0), &mut out);
        filter.on_data(frame, &mut ctx).unwrap();
        out
    }

    #[test]
    fn test_constant_signal_unchanged() {
        let mut filter = LowPassFilter::new("lp", 10.0);
        let out = run(&mut filter, Frame::mono(0, 100.0, vec![2.0; 8]).unwrap());
        assert_eq!(out.len(), 1);
        for &y in out[0].channel(0).unwrap() {
            assert!((y - 2.0).abs() < 1e-12);
        }
    }

    #[test]
    fn test_state_carries_across_frames() {
        let mut whole = LowPassFilter::new("lp", 5.0);
        let mut split = LowPassFilter::new("lp", 5.0);
        let samples: Vec<f64> = (0..16).map(|i| if i % 4 == 0 { 1.0 } else { 0.0 }).collect();

        let expected = run(&mut whole, Frame::mono(0, 100.0, samples.clone()).unwrap());
        let first = run(&mut split, Frame::mono(0, 100.0, samples[..8].to_vec()).unwrap());
        let second = run(&mut split, Frame::mono(8, 100.0, samples[8..].to_vec()).unwrap());

        let joined: Vec<f64> = first[0]
            .channel(0)
            .unwrap()
            .iter()
            .chain(second[0].channel(0).unwrap())
            .copied()
            .collect();
        assert_eq!(joined, expected[0].channel(0).unwrap());
    }

    #[test]
    fn test_attenuates_step() {
        let mut filter = LowPassFilter::new("lp", 1.0);
        let mut samples = vec![0.0];
        samples.extend(std::iter::repeat(1.0).take(4));
        let out = run(&mut filter, Frame::mono(0, 1000.0, samples).unwrap());
        let last = *out[0].channel(0).unwrap().last().unwrap();
        assert!(last > 0.0 && last < 0.1, "step response {}", last);
    }

    #[test]
    fn test_invalid_cutoff() {
        let mut filter = LowPassFilter::new("lp", 0.0);
        let mut out = Vec::new();
        let mut ctx = NodeContext::new(NodeId(0), &mut out);
        assert!(filter
            .on_data(Frame::mono(0, 100.0, vec![1.0]).unwrap(), &mut ctx)
            .is_err());
    }

    #[test]
    fn test_reset_forgets_history() {
        let mut filter = LowPassFilter::new("lp", 2.0);
        assert_eq!(filter.cutoff_hz(), 2.0);
        run(&mut filter, Frame::mono(0, 100.0, vec![0.0; 8]).unwrap());

        // With history the output lags toward the new level; after a reset
        // the state starts from the first sample.
        let lagging = run(&mut filter, Frame::mono(8, 100.0, vec![5.0; 4]).unwrap());
        assert!(lagging[0].channel(0).unwrap()[0] < 5.0);

        filter.reset();
        let fresh = run(&mut filter, Frame::mono(12, 100.0, vec![5.0; 4]).unwrap());
        for &y in fresh[0].channel(0).unwrap() {
            assert!((y - 5.0).abs() < 1e-12);
        }
    }
}
