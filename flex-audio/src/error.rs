//! Error types for the stretch engine

use crate::buffer::BufferError;
use thiserror::Error;

/// Errors that can occur while configuring or running a stretch engine
#[derive(Error, Debug)]
pub enum StretchError {
    #[error("Invalid rate {0}: must be within (0, 2]")]
    InvalidRate(f32),
    #[error("Invalid config `{field}`: {reason}")]
    InvalidConfig { field: &'static str, reason: String },
    #[error("Channel mismatch: expected {expected}, got {actual}")]
    ChannelMismatch { expected: usize, actual: usize },
    #[error("Window range {start}..{end} exceeds block size {block_size}")]
    WindowRange {
        start: usize,
        end: usize,
        block_size: usize,
    },
    #[error("Malformed block: {0}")]
    MalformedBlock(String),
    #[error("Buffer error: {0}")]
    Buffer(#[from] BufferError),
    #[error("Config parse error on line {line}: {message}")]
    Parse { line: usize, message: String },
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl StretchError {
    /// True for the recoverable "push more input and retry" condition
    pub fn is_underflow(&self) -> bool {
        matches!(self, StretchError::Buffer(BufferError::NotEnoughSamples { .. }))
    }
}

/// Result alias for stretch operations
pub type Result<T> = std::result::Result<T, StretchError>;
