//! Signal analysis helpers used by the built-in stages.

pub mod fft;

pub use fft::{Spectrum, SpectrumAnalyzer, WindowFunction};
