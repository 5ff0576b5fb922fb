//! Signal analysis for flex
//!
//! Provides the waveform-similarity search used by the stretch engine:
//! - Cross-correlation (FFT-based for long inputs, direct for short ones)
//! - Phase alignment of overlap-add blocks with optional bias tapers

mod alignment;
mod correlation;

pub use alignment::{BiasTaper, PhaseAligner};
pub use correlation::{CrossCorrelator, DIRECT_CORRELATION_LIMIT};
