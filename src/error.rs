//! Error handling for pype-rs
//!
//! This module defines the application-level error type and a Result alias.
//! Graph construction and runtime errors live in
//! [`PipelineError`](crate::pipeline::PipelineError) and convert into
//! [`PypeError`] with `?`.

use crate::buffer::BufferError;
use crate::pipeline::{FrameError, PipelineError};
use thiserror::Error;

/// Main error type for pype-rs operations
#[derive(Error, Debug)]
pub enum PypeError {
    /// Errors raised by the pipeline graph or its runtime
    #[error("Pipeline error: {0}")]
    Pipeline(#[from] PipelineError),

    /// Errors related to the circular sample buffer
    #[error("Buffer error: {0}")]
    Buffer(#[from] BufferError),

    /// Malformed frames
    #[error("Frame error: {0}")]
    Frame(#[from] FrameError),

    /// Errors related to configuration loading/saving
    #[error("Configuration error: {0}")]
    Config(String),

    /// Errors setting up logging
    #[error("Logging error: {0}")]
    Logging(String),

    /// IO errors
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Serialization errors
    #[error("Serialization error: {0}")]
    Serialization(String),

    /// Generic errors with context
    #[error("{context}: {source}")]
    WithContext {
        context: String,
        #[source]
        source: Box<PypeError>,
    },
}

impl PypeError {
    /// Add context to an error
    pub fn with_context(self, context: impl Into<String>) -> Self {
        PypeError::WithContext {
            context: context.into(),
            source: Box::new(self),
        }
    }
}

/// Result type alias for pype-rs operations
pub type Result<T> = std::result::Result<T, PypeError>;

/// Extension trait for adding context to Results
pub trait ResultExt<T> {
    /// Add context to an error result
    fn context(self, context: impl Into<String>) -> Result<T>;

    /// Add context lazily to an error result
    fn with_context<F>(self, f: F) -> Result<T>
    where
        F: FnOnce() -> String;
}

impl<T, E> ResultExt<T> for std::result::Result<T, E>
where
    E: Into<PypeError>,
{
    fn context(self, context: impl Into<String>) -> Result<T> {
        self.map_err(|e| e.into().with_context(context))
    }

    fn with_context<F>(self, f: F) -> Result<T>
    where
        F: FnOnce() -> String,
    {
        self.map_err(|e| e.into().with_context(f()))
    }
}
