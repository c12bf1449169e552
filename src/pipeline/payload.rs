//! Payload types carried along pipeline edges.
//!
//! The runtime is generic over a single payload type per graph. The only
//! structural question it ever asks a payload is whether it can be
//! decomposed into ordered parts, which is what a split node needs.
//!
//! `Frame` is the payload used by the built-in signal stages: a block of
//! samples for one or more equally long channels.

use serde::{Deserialize, Serialize};
use std::time::Duration;

/// A value that can travel through a pipeline.
pub trait Payload: Clone + Send + 'static {
    /// Decompose into ordered parts for split routing.
    ///
    /// Returns `None` when the value is not a sequence.
    fn into_parts(self) -> Option<Vec<Self>> {
        None
    }
}

macro_rules! scalar_payload {
    ($($ty:ty),* $(,)?) => {
        $(impl Payload for $ty {})*
    };
}

scalar_payload!(bool, i32, i64, u32, u64, usize, f32, f64, String);

/// JSON values let heterogeneous data share one graph. Arrays split element-wise.
impl Payload for serde_json::Value {
    fn into_parts(self) -> Option<Vec<Self>> {
        match self {
            serde_json::Value::Array(items) => Some(items),
            _ => None,
        }
    }
}

/// Errors constructing a frame.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum FrameError {
    #[error("Channel {channel} has {len} samples, expected {expected}")]
    RaggedChannels {
        channel: usize,
        len: usize,
        expected: usize,
    },

    #[error("Sample rate must be positive and finite, got {0}")]
    InvalidSampleRate(f64),
}

/// A block of multi-channel samples.
///
/// Every channel holds the same number of samples. `offset` is the absolute
/// index of the first sample in the stream, so consecutive frames of one
/// stream satisfy `next.offset == prev.offset + prev.len()`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Frame {
    offset: u64,
    sample_rate: f64,
    channels: Vec<Vec<f64>>,
}

impl Frame {
    pub fn new(offset: u64, sample_rate: f64, channels: Vec<Vec<f64>>) -> Result<Self, FrameError> {
        if !sample_rate.is_finite() || sample_rate <= 0.0 {
            return Err(FrameError::InvalidSampleRate(sample_rate));
        }
        if let Some(first) = channels.first() {
            let expected = first.len();
            if let Some((channel, ch)) = channels
                .iter()
                .enumerate()
                .find(|(_, ch)| ch.len() != expected)
            {
                return Err(FrameError::RaggedChannels {
                    channel,
                    len: ch.len(),
                    expected,
                });
            }
        }
        Ok(Self {
            offset,
            sample_rate,
            channels,
        })
    }

    /// Single-channel convenience constructor.
    pub fn mono(offset: u64, sample_rate: f64, samples: Vec<f64>) -> Result<Self, FrameError> {
        Self::new(offset, sample_rate, vec![samples])
    }

    #[inline]
    pub fn offset(&self) -> u64 {
        self.offset
    }

    #[inline]
    pub fn sample_rate(&self) -> f64 {
        self.sample_rate
    }

    /// Number of channels.
    #[inline]
    pub fn channel_count(&self) -> usize {
        self.channels.len()
    }

    /// Samples per channel.
    #[inline]
    pub fn len(&self) -> usize {
        self.channels.first().map_or(0, Vec::len)
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn channel(&self, index: usize) -> Option<&[f64]> {
        self.channels.get(index).map(Vec::as_slice)
    }

    pub fn channels(&self) -> &[Vec<f64>] {
        &self.channels
    }

    pub fn into_channels(self) -> Vec<Vec<f64>> {
        self.channels
    }

    /// Stream time of the first sample, or `None` if it does not fit in a
    /// `Duration`.
    pub fn timestamp(&self) -> Option<Duration> {
        Duration::try_from_secs_f64(self.offset as f64 / self.sample_rate).ok()
    }

    /// Build a frame on the same sample grid with different channel data.
    pub fn with_channels(&self, channels: Vec<Vec<f64>>) -> Result<Self, FrameError> {
        Self::new(self.offset, self.sample_rate, channels)
    }
}

/// Frames split channel-wise: part `i` is a mono frame holding channel `i`.
impl Payload for Frame {
    fn into_parts(self) -> Option<Vec<Self>> {
        let Frame {
            offset,
            sample_rate,
            channels,
        } = self;
        Some(
            channels
                .into_iter()
                .map(|ch| Frame {
                    offset,
                    sample_rate,
                    channels: vec![ch],
                })
                .collect(),
        )
    }
}
