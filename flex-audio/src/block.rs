//! Multi-channel sample blocks

use crate::error::{Result, StretchError};

/// Owned `channels × frames` sample buffer, stored channel-major
/// (all of channel 0, then all of channel 1, ...).
#[derive(Debug, Clone, PartialEq, Default)]
pub struct AudioBlock {
    channels: usize,
    frames: usize,
    data: Vec<f32>,
}

impl AudioBlock {
    /// All-zero block
    pub fn silence(channels: usize, frames: usize) -> Self {
        Self {
            channels,
            frames,
            data: vec![0.0; channels * frames],
        }
    }

    /// Single-channel block
    pub fn mono(samples: Vec<f32>) -> Self {
        Self {
            channels: 1,
            frames: samples.len(),
            data: samples,
        }
    }

    /// Build from one vector per channel; all channels must have equal length
    pub fn from_channels(channels: Vec<Vec<f32>>) -> Result<Self> {
        let Some(frames) = channels.first().map(Vec::len) else {
            return Err(StretchError::MalformedBlock("no channels".into()));
        };

        if let Some(ragged) = channels.iter().position(|c| c.len() != frames) {
            return Err(StretchError::MalformedBlock(format!(
                "channel {} has {} frames, expected {}",
                ragged,
                channels[ragged].len(),
                frames
            )));
        }

        let count = channels.len();
        Ok(Self {
            channels: count,
            frames,
            data: channels.concat(),
        })
    }

    /// Wrap channel-major data
    pub fn from_channel_major(channels: usize, data: Vec<f32>) -> Result<Self> {
        if channels == 0 || data.len() % channels != 0 {
            return Err(StretchError::MalformedBlock(format!(
                "{} samples do not divide into {} channels",
                data.len(),
                channels
            )));
        }

        Ok(Self {
            channels,
            frames: data.len() / channels,
            data,
        })
    }

    /// De-interleave frame-major data (L,R,L,R,...)
    pub fn from_interleaved(channels: usize, samples: &[f32]) -> Result<Self> {
        if channels == 0 || samples.len() % channels != 0 {
            return Err(StretchError::MalformedBlock(format!(
                "{} interleaved samples do not divide into {} channels",
                samples.len(),
                channels
            )));
        }

        let frames = samples.len() / channels;
        let mut block = Self::silence(channels, frames);
        for (frame, values) in samples.chunks_exact(channels).enumerate() {
            for (ch, &value) in values.iter().enumerate() {
                block.data[ch * frames + frame] = value;
            }
        }
        Ok(block)
    }

    /// Frame-major copy (L,R,L,R,...)
    pub fn to_interleaved(&self) -> Vec<f32> {
        let mut out = Vec::with_capacity(self.data.len());
        for frame in 0..self.frames {
            for ch in 0..self.channels {
                out.push(self.data[ch * self.frames + frame]);
            }
        }
        out
    }

    #[inline]
    pub fn channels(&self) -> usize {
        self.channels
    }

    #[inline]
    pub fn frames(&self) -> usize {
        self.frames
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.frames == 0
    }

    /// Samples of one channel
    #[inline]
    pub fn channel(&self, ch: usize) -> &[f32] {
        &self.data[ch * self.frames..(ch + 1) * self.frames]
    }

    #[inline]
    pub fn channel_mut(&mut self, ch: usize) -> &mut [f32] {
        &mut self.data[ch * self.frames..(ch + 1) * self.frames]
    }

    /// Whole channel-major storage
    #[inline]
    pub fn as_slice(&self) -> &[f32] {
        &self.data
    }

    /// Sum of all channels, frame by frame
    pub fn mixdown(&self) -> Vec<f32> {
        let mut sum = vec![0.0; self.frames];
        for ch in 0..self.channels {
            for (acc, &sample) in sum.iter_mut().zip(self.channel(ch)) {
                *acc += sample;
            }
        }
        sum
    }

    /// Sum of squared samples over all channels
    pub fn energy(&self) -> f32 {
        self.data.iter().map(|s| s * s).sum()
    }

    /// Add `other` into this block over their common frames
    pub fn mix(&mut self, other: &AudioBlock) {
        let frames = self.frames.min(other.frames);
        let channels = self.channels.min(other.channels);
        for ch in 0..channels {
            let src = &other.channel(ch)[..frames];
            for (dst, &sample) in self.channel_mut(ch)[..frames].iter_mut().zip(src) {
                *dst += sample;
            }
        }
    }

    /// Copy `other` into this block starting at frame `offset`; excess frames are dropped
    pub fn write_at(&mut self, offset: usize, other: &AudioBlock) {
        if offset >= self.frames {
            return;
        }
        let frames = other.frames.min(self.frames - offset);
        let channels = self.channels.min(other.channels);
        for ch in 0..channels {
            self.channel_mut(ch)[offset..offset + frames]
                .copy_from_slice(&other.channel(ch)[..frames]);
        }
    }

    /// Shorten to `frames`; no-op if already shorter
    pub fn truncate(&mut self, frames: usize) {
        if frames < self.frames {
            self.relayout(frames);
        }
    }

    /// Change length, zero-filling any new frames
    pub fn resize(&mut self, frames: usize) {
        if frames != self.frames {
            self.relayout(frames);
        }
    }

    fn relayout(&mut self, frames: usize) {
        let keep = frames.min(self.frames);
        let mut data = vec![0.0; self.channels * frames];
        for ch in 0..self.channels {
            data[ch * frames..ch * frames + keep].copy_from_slice(&self.channel(ch)[..keep]);
        }
        self.data = data;
        self.frames = frames;
    }
}
