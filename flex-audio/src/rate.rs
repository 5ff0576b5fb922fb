//! Stretch rate validation and hop bookkeeping.
//!
//! The rate is the number of input samples consumed per output sample:
//! `output ≈ input / rate`. A rate of 2.0 halves the duration, 0.5 doubles it.

use crate::error::{Result, StretchError};

/// Largest accepted rate
pub const MAX_RATE: f32 = 2.0;

/// Check that `rate` lies in `(0, MAX_RATE]`
pub fn validate_rate(rate: f32) -> Result<f32> {
    if rate.is_finite() && rate > 0.0 && rate <= MAX_RATE {
        Ok(rate)
    } else {
        Err(StretchError::InvalidRate(rate))
    }
}

/// Samples a block must shift away from the fixed hop to stretch by `rate`:
/// `round(hop * (rate - 1))`
pub fn stretch_offset(hop: usize, rate: f32) -> Result<i64> {
    let rate = validate_rate(rate)?;
    Ok((hop as f64 * (rate as f64 - 1.0)).round() as i64)
}

/// Tracks the current rate and turns it into block hops and output lengths.
///
/// Hops follow the output actually produced: every output frame consumes
/// `rate` input frames at the rate in force when it was produced. Both hops
/// and output lengths are derived from exact running totals, so rounding
/// never accumulates over a long stream and rate changes cannot drift the
/// read position away from the input.
#[derive(Debug, Clone)]
pub struct RateController {
    hop: usize,
    rate: f32,
    /// Exact input position reached by the output produced so far
    consumed: f64,
    /// Input position handed out as block hops so far
    placed: i64,
    /// Exact output length owed so far
    output_target: f64,
    /// Output frames handed out so far
    output_scheduled: u64,
}

impl RateController {
    /// Create a controller for blocks advancing `hop` samples at rate 1
    pub fn new(hop: usize, rate: f32) -> Result<Self> {
        Ok(Self {
            hop,
            rate: validate_rate(rate)?,
            consumed: 0.0,
            placed: 0,
            output_target: 0.0,
            output_scheduled: 0,
        })
    }

    #[inline]
    pub fn rate(&self) -> f32 {
        self.rate
    }

    #[inline]
    pub fn hop(&self) -> usize {
        self.hop
    }

    /// Change the rate; rejected rates leave the controller untouched
    pub fn set_rate(&mut self, rate: f32) -> Result<()> {
        self.rate = validate_rate(rate)?;
        Ok(())
    }

    /// Per-block offset from the fixed hop at the current rate
    pub fn stretch_offset(&self) -> i64 {
        (self.hop as f64 * (self.rate as f64 - 1.0)).round() as i64
    }

    /// Record `frames` output frames produced at the current rate
    pub fn advance(&mut self, frames: usize) {
        self.consumed += frames as f64 * self.rate as f64;
    }

    /// Record `frames` input frames skipped without producing output
    pub fn skip_input(&mut self, frames: u64) {
        self.consumed += frames as f64;
    }

    /// Input distance to the next block: the input consumed since the last
    /// block, `hop + Δ` when a whole hop of output was produced at one rate
    pub fn next_hop(&mut self) -> i64 {
        let step = self.peek_hop();
        self.placed += step;
        step
    }

    /// The hop [`RateController::next_hop`] would return, without consuming it
    pub fn peek_hop(&self) -> i64 {
        self.consumed.round() as i64 - self.placed
    }

    /// Output frames owed for `input_frames` new input frames at the current rate
    pub fn output_frames(&mut self, input_frames: usize) -> usize {
        let frames = self.peek_output_frames(input_frames);
        self.output_target += input_frames as f64 / self.rate as f64;
        self.output_scheduled += frames as u64;
        frames
    }

    /// The length [`RateController::output_frames`] would return, without
    /// scheduling it
    pub fn peek_output_frames(&self, input_frames: usize) -> usize {
        let target = self.output_target + input_frames as f64 / self.rate as f64;
        let total = target.round().max(0.0) as u64;
        total.saturating_sub(self.output_scheduled) as usize
    }

    /// Output frames handed out since creation or the last reset
    #[inline]
    pub fn output_scheduled(&self) -> u64 {
        self.output_scheduled
    }

    /// Drop all running totals, keeping the rate
    pub fn reset(&mut self) {
        self.consumed = 0.0;
        self.placed = 0;
        self.output_target = 0.0;
        self.output_scheduled = 0;
    }
}
