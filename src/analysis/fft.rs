//! Windowed FFT magnitude spectra.
//!
//! Used by [`SpectrumNode`](crate::pipeline::nodes::SpectrumNode) to turn a
//! block of time-domain samples into a one-sided magnitude spectrum.

use rustfft::{num_complex::Complex, FftPlanner};
use serde::{Deserialize, Serialize};
use std::f64::consts::PI;

/// Window applied to a block before the transform.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum WindowFunction {
    Rectangular,
    #[default]
    Hann,
    Hamming,
    Blackman,
}

impl WindowFunction {
    /// Coefficient for sample `i` of an `n`-sample block.
    pub fn coefficient(&self, i: usize, n: usize) -> f64 {
        let phase = 2.0 * PI * i as f64 / n as f64;
        match self {
            WindowFunction::Rectangular => 1.0,
            WindowFunction::Hann => 0.5 * (1.0 - phase.cos()),
            WindowFunction::Hamming => 0.54 - 0.46 * phase.cos(),
            // 0.42 and 0.08 are not exact in binary, clamp the endpoints.
            WindowFunction::Blackman => {
                (0.42 - 0.5 * phase.cos() + 0.08 * (2.0 * phase).cos()).max(0.0)
            }
        }
    }

    pub fn generate(&self, n: usize) -> Vec<f64> {
        (0..n).map(|i| self.coefficient(i, n)).collect()
    }
}

/// One-sided magnitude spectrum of a real block.
#[derive(Debug, Clone, PartialEq)]
pub struct Spectrum {
    /// Hz per bin
    pub resolution: f64,
    /// Linear magnitudes for bins `0..=n/2`
    pub magnitudes: Vec<f64>,
}

impl Spectrum {
    pub fn frequency_at(&self, bin: usize) -> f64 {
        bin as f64 * self.resolution
    }

    /// Frequency and magnitude of the strongest bin.
    pub fn peak(&self) -> Option<(f64, f64)> {
        self.magnitudes
            .iter()
            .enumerate()
            .max_by(|(_, a), (_, b)| a.total_cmp(b))
            .map(|(bin, &mag)| (self.frequency_at(bin), mag))
    }
}

/// Reusable FFT state. Plans are cached by the planner across calls.
pub struct SpectrumAnalyzer {
    planner: FftPlanner<f64>,
    window: WindowFunction,
    remove_dc: bool,
}

impl SpectrumAnalyzer {
    pub fn new(window: WindowFunction, remove_dc: bool) -> Self {
        Self {
            planner: FftPlanner::new(),
            window,
            remove_dc,
        }
    }

    pub fn window(&self) -> WindowFunction {
        self.window
    }

    /// Magnitude spectrum of `samples`. Blocks are zero-padded to the next
    /// power of two.
    pub fn compute(&mut self, samples: &[f64], sample_rate: f64) -> Spectrum {
        let n = samples.len();
        if n == 0 {
            return Spectrum {
                resolution: 0.0,
                magnitudes: Vec::new(),
            };
        }

        let mean = if self.remove_dc {
            samples.iter().sum::<f64>() / n as f64
        } else {
            0.0
        };

        let size = n.next_power_of_two();
        let mut buffer: Vec<Complex<f64>> = samples
            .iter()
            .enumerate()
            .map(|(i, &s)| Complex::new((s - mean) * self.window.coefficient(i, n), 0.0))
            .collect();
        buffer.resize(size, Complex::new(0.0, 0.0));

        self.planner.plan_fft_forward(size).process(&mut buffer);

        let scale = 2.0 / n as f64;
        Spectrum {
            resolution: sample_rate / size as f64,
            magnitudes: buffer[..=size / 2].iter().map(|c| c.norm() * scale).collect(),
        }
    }
}

impl Default for SpectrumAnalyzer {
    fn default() -> Self {
        Self::new(WindowFunction::default(), true)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sine(freq: f64, sample_rate: f64, n: usize) -> Vec<f64> {
        (0..n)
            .map(|i| (2.0 * PI * freq * i as f64 / sample_rate).sin())
            .collect()
    }

    #[test]
    fn test_window_range() {
        for window in [
            WindowFunction::Rectangular,
            WindowFunction::Hann,
            WindowFunction::Hamming,
            WindowFunction::Blackman,
        ] {
            for c in window.generate(64) {
                assert!((-1e-12..=1.0 + 1e-12).contains(&c), "{:?} coefficient {}", window, c);
            }
        }
    }

    #[test]
    fn test_sine_peak() {
        let mut analyzer = SpectrumAnalyzer::default();
        let spectrum = analyzer.compute(&sine(50.0, 1000.0, 1024), 1000.0);
        assert_eq!(spectrum.magnitudes.len(), 513);
        let (freq, _) = spectrum.peak().unwrap();
        assert!((freq - 50.0).abs() < 2.0, "peak at {}", freq);
    }

    #[test]
    fn test_dc_removed() {
        let mut analyzer = SpectrumAnalyzer::new(WindowFunction::Rectangular, true);
        let spectrum = analyzer.compute(&[3.0; 256], 100.0);
        assert!(spectrum.magnitudes[0] < 1e-9);
    }

    #[test]
    fn test_empty_block() {
        let mut analyzer = SpectrumAnalyzer::default();
        let spectrum = analyzer.compute(&[], 100.0);
        assert!(spectrum.magnitudes.is_empty());
        assert_eq!(spectrum.peak(), None);
    }

    #[test]
    fn test_analyzer_window() {
        assert_eq!(SpectrumAnalyzer::default().window(), WindowFunction::Hann);
        let analyzer = SpectrumAnalyzer::new(WindowFunction::Blackman, false);
        assert_eq!(analyzer.window(), WindowFunction::Blackman);
    }
}
