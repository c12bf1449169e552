//! Built-in stage implementations.

pub mod buffer_sink;
pub mod collector;
pub mod downsample;
pub mod filter;
pub mod spectrum;

pub use buffer_sink::BufferSink;
pub use collector::{CollectorHandle, CollectorSink};
pub use downsample::Downsample;
pub use filter::LowPassFilter;
pub use spectrum::SpectrumNode;
