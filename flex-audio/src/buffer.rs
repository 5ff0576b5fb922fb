//! Fixed-capacity multi-channel sample history.
//!
//! Samples are addressed by absolute index: sample `i` is the `i`-th frame ever
//! pushed. Only the most recent `capacity` frames stay retrievable; older
//! frames are overwritten in place.

use crate::block::AudioBlock;
use thiserror::Error;
use tracing::warn;

/// Errors returned by [`RingBuffer`] reads and writes
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum BufferError {
    /// The requested span reaches past what has been pushed so far.
    /// Not fatal: push more input and retry.
    #[error("Not enough samples: requested up to {requested_end}, only {available} pushed")]
    NotEnoughSamples { requested_end: i64, available: u64 },
    #[error("Invalid range {start}..{end}")]
    InvalidRange { start: i64, end: i64 },
    #[error("Channel mismatch: buffer has {expected} channels, chunk has {actual}")]
    ChannelMismatch { expected: usize, actual: usize },
}

/// Circular store of the most recently pushed frames
pub struct RingBuffer {
    channels: usize,
    capacity: usize,
    /// Channel-major storage: channel `c` occupies `c * capacity..(c + 1) * capacity`
    data: Vec<f32>,
    /// Physical write position (next frame goes here)
    write_pos: usize,
    /// Frames ever pushed
    total_pushed: u64,
}

impl RingBuffer {
    /// Create an empty buffer. A zero capacity is bumped to one frame.
    pub fn new(channels: usize, capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            channels,
            capacity,
            data: vec![0.0; channels * capacity],
            write_pos: 0,
            total_pushed: 0,
        }
    }

    #[inline]
    pub fn channels(&self) -> usize {
        self.channels
    }

    #[inline]
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Frames ever pushed (absolute index one past the newest frame)
    #[inline]
    pub fn total_pushed(&self) -> u64 {
        self.total_pushed
    }

    /// Retrievable frames: `min(total_pushed, capacity)`
    #[inline]
    pub fn len(&self) -> usize {
        self.total_pushed.min(self.capacity as u64) as usize
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.total_pushed == 0
    }

    /// Absolute index of the oldest retrievable frame
    #[inline]
    pub fn earliest(&self) -> i64 {
        (self.total_pushed - self.len() as u64) as i64
    }

    /// Append a chunk, overwriting the oldest frames once full
    pub fn push(&mut self, chunk: &AudioBlock) -> Result<(), BufferError> {
        if chunk.channels() != self.channels {
            return Err(BufferError::ChannelMismatch {
                expected: self.channels,
                actual: chunk.channels(),
            });
        }

        let frames = chunk.frames();
        // Frames that would be overwritten within this same push are skipped
        let skip = frames.saturating_sub(self.capacity);
        let write_len = frames - skip;
        let start = (self.write_pos + skip) % self.capacity;

        let first = write_len.min(self.capacity - start);
        for ch in 0..self.channels {
            let src = &chunk.channel(ch)[skip..];
            let base = ch * self.capacity;
            self.data[base + start..base + start + first].copy_from_slice(&src[..first]);
            self.data[base..base + write_len - first].copy_from_slice(&src[first..write_len]);
        }

        self.total_pushed += frames as u64;
        self.write_pos = (self.total_pushed % self.capacity as u64) as usize;
        Ok(())
    }

    /// Copy out the absolute span `start..end`.
    ///
    /// The part of the span older than the retained history is dropped, so the
    /// result may be shorter than requested. Fails with
    /// [`BufferError::NotEnoughSamples`] when `end` is past the newest frame.
    pub fn get_slice(&self, start: i64, end: i64) -> Result<AudioBlock, BufferError> {
        self.check_span(start, end)?;

        let from = start.max(self.earliest());
        let to = end.max(from);
        let mut block = AudioBlock::silence(self.channels, (to - from) as usize);
        self.copy_span(from, &mut block, 0);
        Ok(block)
    }

    /// Copy out `frames` frames starting at absolute index `start`, keeping
    /// the requested length.
    ///
    /// Frames before the stream start (negative indices) or already
    /// overwritten read as silence.
    pub fn read_padded(&self, start: i64, frames: usize) -> Result<AudioBlock, BufferError> {
        let end = start + frames as i64;
        self.check_span(start, end)?;

        let earliest = self.earliest();
        let from = start.max(earliest).min(end);
        if start < earliest && earliest > 0 && start + (frames as i64) > 0 {
            warn!(
                start,
                earliest, "reading overwritten history, padding with silence"
            );
        }

        let mut block = AudioBlock::silence(self.channels, frames);
        self.copy_span(from, &mut block, (from - start) as usize);
        Ok(block)
    }

    /// Forget all history
    pub fn clear(&mut self) {
        self.data.fill(0.0);
        self.write_pos = 0;
        self.total_pushed = 0;
    }

    fn check_span(&self, start: i64, end: i64) -> Result<(), BufferError> {
        if end < start {
            return Err(BufferError::InvalidRange { start, end });
        }
        if end > self.total_pushed as i64 {
            return Err(BufferError::NotEnoughSamples {
                requested_end: end,
                available: self.total_pushed,
            });
        }
        Ok(())
    }

    /// Copy retained frames from absolute `from` into `block` at frame `offset`
    /// until the block is full. `from` must be retained.
    fn copy_span(&self, from: i64, block: &mut AudioBlock, offset: usize) {
        let len = block.frames() - offset;
        if len == 0 {
            return;
        }

        let physical = (from as u64 % self.capacity as u64) as usize;
        let first = len.min(self.capacity - physical);
        for ch in 0..self.channels {
            let base = ch * self.capacity;
            let dst = &mut block.channel_mut(ch)[offset..];
            dst[..first].copy_from_slice(&self.data[base + physical..base + physical + first]);
            // Wrapped tail comes from the start of the storage
            dst[first..].copy_from_slice(&self.data[base..base + len - first]);
        }
    }
}
