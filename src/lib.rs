//! # pype-rs: dataflow graphs with async boundaries
//!
//! Build a directed acyclic graph of processing nodes, push payloads into
//! any node, and let them propagate downstream. Propagation is synchronous
//! on the caller's thread until it reaches an async boundary, which hands
//! the payload to its own worker thread.
//!
//! ## Architecture
//!
//! - **Pipeline**: graph builder, connection rules, synchronous dispatch,
//!   async boundaries and the `wait` barrier
//! - **Stages**: built-in transforms over [`Frame`](pipeline::Frame)s
//!   (low-pass, downsample, spectrum, buffer sink, collector)
//! - **Buffer**: multi-channel circular buffer with read/write counters
//! - **Communication**: crossbeam channels between callers and workers
//!
//! ## Example
//!
//! ```
//! use pype_rs::pipeline::{nodes::CollectorSink, PipelineBuilder};
//!
//! # fn main() -> pype_rs::Result<()> {
//! let mut builder = PipelineBuilder::<i64>::new();
//! let source = builder.add_passthrough("source");
//! let double = builder.add_map("double", |x| Ok(x * 2));
//! let worker = builder.add_async("worker");
//! let (sink, items) = CollectorSink::new("sink");
//! let sink = builder.add_stage(sink);
//! builder.chain([source, double, worker, sink])?;
//!
//! let pipeline = builder.build()?;
//! pipeline.write(source, 21)?;
//! pipeline.wait(source)?;
//! assert_eq!(items.items(), vec![42]);
//! pipeline.shutdown();
//! # Ok(())
//! # }
//! ```

pub mod analysis;
pub mod buffer;
pub mod config;
pub mod error;
pub mod logging;
pub mod pipeline;

// Re-export commonly used types
pub use buffer::{BufferError, CircularBuffer, SharedBuffer};
pub use config::{LoggingConfig, RuntimeConfig};
pub use error::{PypeError, Result, ResultExt};
pub use pipeline::{
    Composite, Frame, NodeHandle, NodeId, Payload, Pipeline, PipelineBuilder, PipelineError, Stage,
};
