//! Streaming time-scale modification for flex
//!
//! Changes the duration of audio without changing its pitch, chunk by chunk:
//! - Block: owned multi-channel sample blocks
//! - Buffer: ring buffer of recent input addressed by absolute sample index
//! - Window: analysis windows normalized for 50% overlap-add
//! - Placement: fixed hop, rate-adjusted hop and WSOLA block placement
//! - Engine: the overlap-add state machine with push and pull APIs
//! - Stream: iterator adapter over a chunk source

mod block;
mod buffer;
mod config;
mod engine;
mod error;
mod placement;
mod rate;
mod stream;
mod window;

pub use block::AudioBlock;
pub use buffer::{BufferError, RingBuffer};
pub use config::StretchConfig;
pub use engine::{EngineCursor, Pull, StretchEngine};
pub use error::{Result, StretchError};
pub use placement::{
    build_placement, BlockPlacement, FixedHop, PhaseAlignedHop, PlacementContext, PlacementMode,
    RateAdjustedHop,
};
pub use rate::{stretch_offset, validate_rate, RateController, MAX_RATE};
pub use stream::StretchStream;
pub use window::{WindowFunction, WindowTable};

pub use flex_analysis::BiasTaper;
