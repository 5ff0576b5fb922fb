//! Analysis block placement strategies.
//!
//! The engine asks its strategy where each new analysis block starts. Plain
//! overlap-add, rate-adjusted overlap-add and WSOLA differ only here.

use crate::buffer::RingBuffer;
use crate::rate::RateController;
use flex_analysis::{BiasTaper, PhaseAligner};
use tracing::trace;

/// Which built-in strategy an engine uses
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum PlacementMode {
    /// Fixed hop, no stretching
    FixedHop,
    /// Hop scaled by the rate
    RateAdjusted,
    /// Hop scaled by the rate, refined by cross-correlation (WSOLA)
    #[default]
    PhaseAligned,
}

impl PlacementMode {
    /// Config name of the mode
    pub fn name(self) -> &'static str {
        match self {
            PlacementMode::FixedHop => "fixed",
            PlacementMode::RateAdjusted => "rate",
            PlacementMode::PhaseAligned => "wsola",
        }
    }
}

/// What a strategy can see when placing the next block
pub struct PlacementContext<'a> {
    /// Sample history
    pub buffer: &'a RingBuffer,
    /// Rate state, advanced once per placed block
    pub rate: &'a mut RateController,
    /// Absolute index where the previous block's second half starts
    pub continuation: i64,
    /// Half a block, the overlap length
    pub semi_block: usize,
}

/// Decides the absolute start of each analysis block
pub trait BlockPlacement: Send {
    /// Absolute start index of the next analysis block
    fn next_block_start(&mut self, ctx: &mut PlacementContext<'_>) -> i64;

    /// Nominal start the next block would get, before any correction.
    /// Does not advance any state.
    fn upcoming_start(&self, ctx: &PlacementContext<'_>) -> i64;

    /// Whether the rate changes placement and output length
    fn follows_rate(&self) -> bool {
        true
    }

    /// Return to the state of a fresh stream
    fn reset(&mut self);

    /// Strategy name for logging
    fn name(&self) -> &'static str;
}

/// Each block continues exactly where the previous one's overlap starts.
/// Pure overlap-add; output equals input for COLA windows.
#[derive(Debug, Default, Clone)]
pub struct FixedHop;

impl BlockPlacement for FixedHop {
    fn next_block_start(&mut self, ctx: &mut PlacementContext<'_>) -> i64 {
        ctx.continuation
    }

    fn upcoming_start(&self, ctx: &PlacementContext<'_>) -> i64 {
        ctx.continuation
    }

    fn follows_rate(&self) -> bool {
        false
    }

    fn reset(&mut self) {}

    fn name(&self) -> &'static str {
        "fixed-hop"
    }
}

/// Nominal block positions advance by the input the last semi-block of
/// output consumed: `hop + Δ` per block at a constant rate
#[derive(Debug, Default, Clone)]
pub struct RateAdjustedHop {
    /// Nominal start of the most recently placed block
    nominal: i64,
}

impl RateAdjustedHop {
    pub fn new() -> Self {
        Self::default()
    }

    /// Nominal start of the most recently placed block
    pub fn nominal(&self) -> i64 {
        self.nominal
    }
}

impl BlockPlacement for RateAdjustedHop {
    fn next_block_start(&mut self, ctx: &mut PlacementContext<'_>) -> i64 {
        self.nominal += ctx.rate.next_hop();
        self.nominal
    }

    fn upcoming_start(&self, ctx: &PlacementContext<'_>) -> i64 {
        self.nominal + ctx.rate.peek_hop()
    }

    fn reset(&mut self) {
        self.nominal = 0;
    }

    fn name(&self) -> &'static str {
        "rate-adjusted"
    }
}

/// WSOLA: rate-adjusted nominal positions, each nudged within the search
/// radius to where the waveform best continues the previous block.
///
/// Corrections are never folded back into the nominal position, so they
/// cannot drift the stretch ratio.
pub struct PhaseAlignedHop {
    hop: RateAdjustedHop,
    aligner: PhaseAligner,
    /// Start of the previously placed block; `None` until the first placement
    previous: Option<i64>,
}

impl PhaseAlignedHop {
    pub fn new(search_window: usize, bias: BiasTaper) -> Self {
        Self {
            hop: RateAdjustedHop::new(),
            aligner: PhaseAligner::new(search_window, bias),
            previous: None,
        }
    }

    /// Search radius in samples
    pub fn search_window(&self) -> usize {
        self.aligner.radius()
    }

    /// Correlate the natural continuation of the previous block against the
    /// region around `nominal`, limited to what has been pushed. Searches
    /// forward only when the region before `nominal` is not retained.
    fn correction(
        &mut self,
        buffer: &RingBuffer,
        continuation: i64,
        nominal: i64,
        semi_block: usize,
    ) -> Option<isize> {
        let radius = self.aligner.radius() as i64;
        let forward = nominal - radius < buffer.earliest();
        let search_start = if forward { nominal } else { nominal - radius };
        let available = buffer.total_pushed() as i64 - search_start;
        if available < semi_block as i64 {
            return None;
        }

        let span = if forward { radius } else { 2 * radius };
        let len = (semi_block as i64 + span).min(available) as usize;
        let previous = buffer.read_padded(continuation, semi_block).ok()?;
        let candidate = buffer.read_padded(search_start, len).ok()?;

        let (previous, candidate) = (previous.mixdown(), candidate.mixdown());
        if forward {
            trace!(nominal, "forward-only phase search");
            self.aligner
                .find_forward_offset(&previous, &candidate)
                .map(|offset| offset as isize)
        } else {
            self.aligner.find_offset(&previous, &candidate)
        }
    }
}

impl BlockPlacement for PhaseAlignedHop {
    fn next_block_start(&mut self, ctx: &mut PlacementContext<'_>) -> i64 {
        let nominal = self.hop.next_block_start(ctx);

        let offset = match self.previous {
            Some(previous) => self
                .correction(
                    ctx.buffer,
                    previous + ctx.semi_block as i64,
                    nominal,
                    ctx.semi_block,
                )
                .unwrap_or(0),
            None => 0,
        };

        let start = nominal + offset as i64;
        trace!(nominal, offset, start, "phase-aligned block");
        self.previous = Some(start);
        start
    }

    fn upcoming_start(&self, ctx: &PlacementContext<'_>) -> i64 {
        self.hop.upcoming_start(ctx)
    }

    fn reset(&mut self) {
        self.hop.reset();
        self.previous = None;
    }

    fn name(&self) -> &'static str {
        "phase-aligned"
    }
}

/// Build the strategy for `mode`
pub fn build_placement(
    mode: PlacementMode,
    search_window: usize,
    bias: BiasTaper,
) -> Box<dyn BlockPlacement> {
    match mode {
        PlacementMode::FixedHop => Box::new(FixedHop),
        PlacementMode::RateAdjusted => Box::new(RateAdjustedHop::new()),
        PlacementMode::PhaseAligned => Box::new(PhaseAlignedHop::new(search_window, bias)),
    }
}
