//! Multi-channel circular sample buffer.
//!
//! [`CircularBuffer`] keeps the most recent `capacity` samples of each
//! channel and tracks two absolute counters:
//!
//! - `ns_written`: total samples written so far,
//! - `ns_read`: total samples consumed by the reader.
//!
//! Writes may overwrite samples the reader has not consumed yet. Whenever the
//! reader falls more than `capacity` samples behind, the buffer reports an
//! overflow, or, with `allow_overflow`, silently moves the reader up to the
//! oldest sample still held.
//!
//! [`SharedBuffer`] wraps a buffer for use across threads and adds an
//! "updated" event so a consumer can sleep until new data arrives.

use std::sync::{Condvar, Mutex, PoisonError};
use std::time::{Duration, Instant};
use thiserror::Error;

/// Errors raised by [`CircularBuffer`].
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum BufferError {
    #[error("Cannot fast forward {counter} from {current} to {requested}")]
    FastForward {
        counter: &'static str,
        current: u64,
        requested: u64,
    },

    #[error("Cannot rewind read position to {requested}, oldest available sample is {oldest}")]
    RewindPastCapacity { requested: u64, oldest: u64 },

    #[error("Cannot skip ahead (written: {written}, at: {at})")]
    SkipAhead { written: u64, at: u64 },

    #[error("Cannot write before last read sample (at: {at}, read: {read})")]
    WriteBeforeRead { at: u64, read: u64 },

    #[error("Cannot read a negative range ({from}..{to})")]
    NegativeRange { from: u64, to: u64 },

    #[error("Cannot read from {from}, oldest available sample is {oldest}")]
    ReadPastCapacity { from: u64, oldest: u64 },

    #[error("Cannot read up to {to}, only {written} samples written")]
    ReadPastWritten { to: u64, written: u64 },

    #[error("Circular buffer overflow (read: {read}, written: {written}, capacity: {capacity})")]
    Overflow {
        read: u64,
        written: u64,
        capacity: usize,
    },

    #[error("Expected {expected} channels, got {found}")]
    ChannelMismatch { expected: usize, found: usize },

    #[error("Channel {channel} has {len} samples, expected {expected}")]
    RaggedChannels {
        channel: usize,
        len: usize,
        expected: usize,
    },
}

/// Fixed-capacity ring of samples for one or more channels.
#[derive(Debug, Clone)]
pub struct CircularBuffer {
    data: Vec<Vec<f64>>,
    capacity: usize,
    allow_overflow: bool,
    ns_written: u64,
    ns_read: u64,
    updated: bool,
}

impl CircularBuffer {
    /// Create a zero-filled buffer. `capacity` is clamped to at least 1.
    pub fn new(channels: usize, capacity: usize, allow_overflow: bool) -> Self {
        let capacity = capacity.max(1);
        Self {
            data: vec![vec![0.0; capacity]; channels],
            capacity,
            allow_overflow,
            ns_written: 0,
            ns_read: 0,
            updated: false,
        }
    }

    pub fn channels(&self) -> usize {
        self.data.len()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn allow_overflow(&self) -> bool {
        self.allow_overflow
    }

    /// Total number of samples written.
    pub fn ns_written(&self) -> u64 {
        self.ns_written
    }

    /// Total number of samples read.
    pub fn ns_read(&self) -> u64 {
        self.ns_read
    }

    /// Absolute index of the oldest sample still held.
    pub fn oldest(&self) -> u64 {
        self.ns_written.saturating_sub(self.capacity as u64)
    }

    /// Samples written but not yet read.
    pub fn ns_available(&mut self) -> Result<u64, BufferError> {
        self.check_overflow()?;
        Ok(self.ns_written - self.ns_read)
    }

    /// Rewind the write position. Pulls the read position back with it.
    pub fn set_ns_written(&mut self, value: u64) -> Result<(), BufferError> {
        if value > self.ns_written {
            return Err(BufferError::FastForward {
                counter: "ns_written",
                current: self.ns_written,
                requested: value,
            });
        }
        self.ns_written = value;
        self.ns_read = self.ns_read.min(value);
        self.updated = true;
        Ok(())
    }

    /// Rewind the read position, at most back to the oldest held sample.
    pub fn set_ns_read(&mut self, value: u64) -> Result<(), BufferError> {
        if value > self.ns_read {
            return Err(BufferError::FastForward {
                counter: "ns_read",
                current: self.ns_read,
                requested: value,
            });
        }
        if value < self.oldest() {
            return Err(BufferError::RewindPastCapacity {
                requested: value,
                oldest: self.oldest(),
            });
        }
        self.ns_read = value;
        self.updated = true;
        Ok(())
    }

    fn check_overflow(&mut self) -> Result<(), BufferError> {
        let oldest = self.oldest();
        if self.ns_read < oldest {
            if self.allow_overflow {
                tracing::debug!(
                    "Circular buffer overflow, skipping reader from {} to {}",
                    self.ns_read,
                    oldest
                );
                self.ns_read = oldest;
            } else {
                return Err(BufferError::Overflow {
                    read: self.ns_read,
                    written: self.ns_written,
                    capacity: self.capacity,
                });
            }
        }
        Ok(())
    }

    fn validate_shape(&self, channels: &[Vec<f64>]) -> Result<usize, BufferError> {
        if channels.len() != self.data.len() {
            return Err(BufferError::ChannelMismatch {
                expected: self.data.len(),
                found: channels.len(),
            });
        }
        let len = channels.first().map_or(0, Vec::len);
        if let Some((channel, ch)) = channels.iter().enumerate().find(|(_, ch)| ch.len() != len) {
            return Err(BufferError::RaggedChannels {
                channel,
                len: ch.len(),
                expected: len,
            });
        }
        Ok(len)
    }

    /// Append samples at the write position.
    pub fn write(&mut self, channels: &[Vec<f64>]) -> Result<(), BufferError> {
        self.write_at(channels, self.ns_written)
    }

    /// Write samples starting at absolute index `at`, which must lie between
    /// the read and write positions. Everything after the written block is
    /// discarded.
    pub fn write_at(&mut self, channels: &[Vec<f64>], at: u64) -> Result<(), BufferError> {
        let len = self.validate_shape(channels)?;
        if at > self.ns_written {
            return Err(BufferError::SkipAhead {
                written: self.ns_written,
                at,
            });
        }
        if at < self.ns_read {
            return Err(BufferError::WriteBeforeRead {
                at,
                read: self.ns_read,
            });
        }

        // Only the last `capacity` samples of a long block survive.
        let skip = len.saturating_sub(self.capacity);
        for (dst, src) in self.data.iter_mut().zip(channels) {
            for (i, &sample) in src.iter().enumerate().skip(skip) {
                let idx = ((at + i as u64) % self.capacity as u64) as usize;
                dst[idx] = sample;
            }
        }

        self.ns_written = at + len as u64;
        self.updated = true;
        self.check_overflow()
    }

    /// Copy out samples `from..to` (absolute indices).
    ///
    /// `from` defaults to the read position and `to` to the write position.
    /// With `advance`, the read position moves to `to`.
    pub fn read(
        &mut self,
        from: Option<u64>,
        to: Option<u64>,
        advance: bool,
    ) -> Result<Vec<Vec<f64>>, BufferError> {
        if from.is_none() {
            self.check_overflow()?;
        }
        let written = self.ns_written;
        let from = from.unwrap_or(self.ns_read);
        let to = to.unwrap_or(written);

        if to < from {
            return Err(BufferError::NegativeRange { from, to });
        }
        if from < self.oldest() {
            return Err(BufferError::ReadPastCapacity {
                from,
                oldest: self.oldest(),
            });
        }
        if to > written {
            return Err(BufferError::ReadPastWritten { to, written });
        }

        let cap = self.capacity as u64;
        let out = self
            .data
            .iter()
            .map(|ch| (from..to).map(|i| ch[(i % cap) as usize]).collect())
            .collect();

        if advance {
            self.ns_read = to;
        }
        Ok(out)
    }

    /// Read everything available and advance.
    pub fn read_available(&mut self) -> Result<Vec<Vec<f64>>, BufferError> {
        self.read(None, None, true)
    }

    /// Whether the buffer changed since the last call. Clears the flag.
    pub fn take_updated(&mut self) -> bool {
        std::mem::take(&mut self.updated)
    }
}

/// Thread-safe [`CircularBuffer`] with an "updated" event.
#[derive(Debug)]
pub struct SharedBuffer {
    inner: Mutex<CircularBuffer>,
    updated: Condvar,
}

impl SharedBuffer {
    pub fn new(buffer: CircularBuffer) -> Self {
        Self {
            inner: Mutex::new(buffer),
            updated: Condvar::new(),
        }
    }

    /// Run `f` with exclusive access to the buffer. Waiters are woken if `f`
    /// changed it.
    pub fn with<R>(&self, f: impl FnOnce(&mut CircularBuffer) -> R) -> R {
        let mut buffer = self.inner.lock().unwrap_or_else(PoisonError::into_inner);
        let result = f(&mut buffer);
        if buffer.updated {
            self.updated.notify_all();
        }
        result
    }

    pub fn write(&self, channels: &[Vec<f64>]) -> Result<(), BufferError> {
        self.with(|b| b.write(channels))
    }

    pub fn read_available(&self) -> Result<Vec<Vec<f64>>, BufferError> {
        self.with(CircularBuffer::read_available)
    }

    pub fn ns_written(&self) -> u64 {
        self.with(|b| b.ns_written())
    }

    /// Whether the buffer changed since the last check. Clears the flag.
    pub fn take_updated(&self) -> bool {
        self.with(CircularBuffer::take_updated)
    }

    /// Sleep until the buffer is updated or `timeout` passes. Clears the
    /// flag and returns `true` if an update was seen.
    pub fn wait_updated(&self, timeout: Duration) -> bool {
        let mut buffer = self.inner.lock().unwrap_or_else(PoisonError::into_inner);
        let Some(deadline) = Instant::now().checked_add(timeout) else {
            let mut buffer = self
                .updated
                .wait_while(buffer, |b| !b.updated)
                .unwrap_or_else(PoisonError::into_inner);
            buffer.updated = false;
            return true;
        };
        while !buffer.updated {
            let now = Instant::now();
            if now >= deadline {
                return false;
            }
            let (guard, _) = self
                .updated
                .wait_timeout(buffer, deadline - now)
                .unwrap_or_else(PoisonError::into_inner);
            buffer = guard;
        }
        buffer.updated = false;
        true
    }
}
