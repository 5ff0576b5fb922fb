//! Stretch engine - windowed overlap-add over a streaming sample history
//!
//! Output is produced half a block at a time. Within a semi-block the first
//! half of the current analysis block is windowed and summed with the second
//! half of the previous one; at each semi-block boundary the placement
//! strategy decides where the next analysis block starts.

use crate::block::AudioBlock;
use crate::buffer::RingBuffer;
use crate::config::StretchConfig;
use crate::error::{Result, StretchError};
use crate::placement::{build_placement, BlockPlacement, PlacementContext};
use crate::rate::{validate_rate, RateController};
use crate::window::WindowTable;
use tracing::{debug, trace, warn};

/// Position of the engine within the input and output streams
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct EngineCursor {
    /// Absolute input index read next for the current block's first half
    pub input_block_index: i64,
    /// Absolute input index read next for the previous block's second half
    pub sum_buffer_index: i64,
    /// Output frames produced from real input
    pub output_index: u64,
    /// Progress through the current semi-block, `0..=semi_block`
    pub semi_block_index: usize,
}

impl EngineCursor {
    fn advance(&mut self, frames: usize) {
        self.input_block_index += frames as i64;
        self.sum_buffer_index += frames as i64;
        self.output_index += frames as u64;
        self.semi_block_index += frames;
    }
}

/// Result of a pull-style request
#[derive(Debug, Clone, PartialEq)]
pub enum Pull {
    /// The full requested length
    Ready(AudioBlock),
    /// Input ran out; holds what could be produced. Push more and pull again.
    Pending(AudioBlock),
}

impl Pull {
    pub fn is_ready(&self) -> bool {
        matches!(self, Pull::Ready(_))
    }

    pub fn into_block(self) -> AudioBlock {
        match self {
            Pull::Ready(block) | Pull::Pending(block) => block,
        }
    }
}

/// Streaming time-scale modification engine
pub struct StretchEngine {
    config: StretchConfig,
    buffer: RingBuffer,
    window: WindowTable,
    cursor: EngineCursor,
    rate: RateController,
    placement: Box<dyn BlockPlacement>,
    semi_block: usize,
    lookahead: usize,
    /// Set once enough history exists; never cleared except by `reset`
    primed: bool,
    /// Zero frames emitted during cold start
    latency_frames: u64,
    /// Analysis blocks placed so far
    blocks: u64,
}

impl StretchEngine {
    /// Create an engine using the placement strategy named by the config
    pub fn new(config: StretchConfig) -> Result<Self> {
        config.validate()?;
        let placement = build_placement(config.placement, config.search_window, config.bias);
        Self::with_placement(config, placement)
    }

    /// Create an engine driven by a custom placement strategy
    pub fn with_placement(config: StretchConfig, placement: Box<dyn BlockPlacement>) -> Result<Self> {
        config.validate()?;

        let semi_block = config.semi_block();
        let engine = Self {
            buffer: RingBuffer::new(config.channels, config.history_capacity()),
            window: WindowTable::new(config.window, config.block_size),
            cursor: EngineCursor::default(),
            rate: RateController::new(semi_block, config.rate)?,
            placement,
            semi_block,
            lookahead: config.lookahead(),
            primed: false,
            latency_frames: 0,
            blocks: 0,
            config,
        };

        debug!(
            channels = engine.config.channels,
            block_size = engine.config.block_size,
            search_window = engine.config.search_window,
            capacity = engine.buffer.capacity(),
            placement = engine.placement.name(),
            window = engine.window.function().name(),
            rate = engine.rate.rate(),
            "stretch engine created"
        );
        Ok(engine)
    }

    /// Push `chunk` and return the stretched audio owed for it:
    /// `round(chunk.frames() / rate)` frames, with the fractional part
    /// carried so lengths never drift.
    ///
    /// Until enough input is buffered the result is silence, and the call
    /// that primes the engine is silent up front. If the engine later runs
    /// out of input mid-request the remainder is zero-filled.
    /// Validation failures leave the engine untouched.
    pub fn process(&mut self, chunk: &AudioBlock, rate: f32) -> Result<AudioBlock> {
        let rate = validate_rate(rate)?;
        self.check_channels(chunk)?;
        if chunk.frames() > self.config.chunk_size {
            warn!(
                frames = chunk.frames(),
                chunk_size = self.config.chunk_size,
                "chunk larger than configured chunk size"
            );
        }

        self.rate.set_rate(rate)?;
        self.buffer.push(chunk)?;
        let frames = self.schedule_output(chunk.frames());

        if !self.primed {
            return self.prime(frames);
        }

        let mut block = self.take(frames)?;
        if block.frames() < frames {
            trace!(
                produced = block.frames(),
                requested = frames,
                "input underflow, zero-filling"
            );
            block.resize(frames);
        }
        Ok(block)
    }

    /// Append input without producing output (pull style)
    pub fn push(&mut self, chunk: &AudioBlock) -> Result<()> {
        self.check_channels(chunk)?;
        self.buffer.push(chunk)?;
        Ok(())
    }

    /// Produce up to `frames` frames from the input pushed so far at the
    /// current rate. There is no cold start: output begins at the first
    /// input frame.
    pub fn pull(&mut self, frames: usize) -> Result<Pull> {
        let block = self.take(frames)?;
        if block.frames() == frames {
            Ok(Pull::Ready(block))
        } else {
            Ok(Pull::Pending(block))
        }
    }

    /// Change the rate for output produced from now on
    pub fn set_rate(&mut self, rate: f32) -> Result<()> {
        self.rate.set_rate(rate)
    }

    #[inline]
    pub fn rate(&self) -> f32 {
        self.rate.rate()
    }

    #[inline]
    pub fn cursor(&self) -> EngineCursor {
        self.cursor
    }

    /// Silent frames emitted by `process` before the first real output
    #[inline]
    pub fn latency(&self) -> u64 {
        self.latency_frames
    }

    /// Frames pushed since creation or the last reset
    #[inline]
    pub fn total_input(&self) -> u64 {
        self.buffer.total_pushed()
    }

    #[inline]
    pub fn config(&self) -> &StretchConfig {
        &self.config
    }

    /// Name of the active placement strategy
    pub fn placement_name(&self) -> &'static str {
        self.placement.name()
    }

    /// Output frames the next `process` call would return for a chunk of
    /// `input_frames` at the current rate. Does not change any state.
    pub fn output_frames_for(&self, input_frames: usize) -> usize {
        if self.placement.follows_rate() {
            self.rate.peek_output_frames(input_frames)
        } else {
            input_frames
        }
    }

    /// Commit the output owed for `input_frames` new input frames.
    /// Strategies that ignore the rate get one output frame per input frame.
    pub(crate) fn schedule_output(&mut self, input_frames: usize) -> usize {
        if self.placement.follows_rate() {
            self.rate.output_frames(input_frames)
        } else {
            input_frames
        }
    }

    /// Start a new stream, keeping config and current rate
    pub fn reset(&mut self) {
        self.buffer.clear();
        self.cursor = EngineCursor::default();
        self.rate.reset();
        self.placement.reset();
        self.primed = false;
        self.latency_frames = 0;
        self.blocks = 0;
        debug!("stretch engine reset");
    }

    fn check_channels(&self, chunk: &AudioBlock) -> Result<()> {
        if chunk.channels() != self.config.channels {
            return Err(StretchError::ChannelMismatch {
                expected: self.config.channels,
                actual: chunk.channels(),
            });
        }
        Ok(())
    }

    /// Cold start for `process`.
    ///
    /// Emits silence until more than `lookahead + semi_block` frames are
    /// retained. The call that crosses that mark starts real output at the
    /// oldest usable frame and pads the front of its result, so exactly that
    /// much input stays ahead of the cursor. Input already dropped from the
    /// history is skipped.
    fn prime(&mut self, frames: usize) -> Result<AudioBlock> {
        let newest = self.buffer.total_pushed() as i64;
        let earliest = self.buffer.earliest();
        let start = if earliest > 0 {
            earliest + self.config.search_window as i64
        } else {
            0
        };

        let reserve = (self.lookahead + self.semi_block) as i64;
        let usable = newest - start - reserve;
        let consumption = if self.placement.follows_rate() {
            self.rate.rate() as f64
        } else {
            1.0
        };
        let real = if usable > 0 {
            ((usable as f64 / consumption).floor() as usize).min(frames)
        } else {
            0
        };

        if real == 0 {
            self.latency_frames += frames as u64;
            return Ok(AudioBlock::silence(self.config.channels, frames));
        }

        if start > 0 {
            self.cursor.input_block_index = start;
            self.cursor.sum_buffer_index = start;
            self.rate.skip_input(start as u64);
        }
        self.primed = true;

        let block = self.take(real)?;
        let pad = frames - block.frames();
        self.latency_frames += pad as u64;
        debug!(
            latency = self.latency_frames,
            skipped = start,
            "stretch engine primed"
        );

        let mut output = AudioBlock::silence(self.config.channels, frames);
        output.write_at(pad, &block);
        Ok(output)
    }

    /// Produce up to `frames` frames, stopping early when input runs out
    fn take(&mut self, frames: usize) -> Result<AudioBlock> {
        let mut output = AudioBlock::silence(self.config.channels, frames);
        let mut produced = 0;

        while produced < frames {
            if self.cursor.semi_block_index == self.semi_block {
                if !self.advance_block() {
                    break;
                }
                continue;
            }

            let wanted = (frames - produced).min(self.semi_block - self.cursor.semi_block_index);
            let part = self.take_from_semi_block(wanted)?;
            if part.is_empty() {
                break;
            }
            output.write_at(produced, &part);
            produced += part.frames();
        }

        output.truncate(produced);
        Ok(output)
    }

    /// Overlap-add up to `frames` frames within the current semi-block
    fn take_from_semi_block(&mut self, frames: usize) -> Result<AudioBlock> {
        let cursor = self.cursor;
        let newest = self.buffer.total_pushed() as i64;
        let available = newest - cursor.input_block_index.max(cursor.sum_buffer_index);
        let frames = (frames as i64).min(available).max(0) as usize;
        if frames == 0 {
            trace!(
                input = cursor.input_block_index,
                newest,
                "not enough input for semi-block"
            );
            return Ok(AudioBlock::silence(self.config.channels, 0));
        }

        let mut current = self.buffer.read_padded(cursor.input_block_index, frames)?;
        let mut previous = self.buffer.read_padded(cursor.sum_buffer_index, frames)?;
        let frames = current.frames().min(previous.frames());
        current.truncate(frames);
        previous.truncate(frames);

        self.window.apply(&mut current, cursor.semi_block_index)?;
        self.window
            .apply(&mut previous, self.semi_block + cursor.semi_block_index)?;
        current.mix(&previous);

        self.cursor.advance(frames);
        self.rate.advance(frames);
        Ok(current)
    }

    /// Place the next analysis block. Returns false, leaving the cursor at the
    /// boundary, while the input around the block is not yet pushed.
    fn advance_block(&mut self) -> bool {
        let continuation = self.cursor.input_block_index;
        let newest = self.buffer.total_pushed() as i64;
        let mut ctx = PlacementContext {
            buffer: &self.buffer,
            rate: &mut self.rate,
            continuation,
            semi_block: self.semi_block,
        };

        let required = self.placement.upcoming_start(&ctx)
            + (self.semi_block + self.config.search_window) as i64;
        if required > newest {
            trace!(required, newest, "waiting for input before placing block");
            return false;
        }

        let start = self.placement.next_block_start(&mut ctx);
        self.cursor.sum_buffer_index = continuation;
        self.cursor.input_block_index = start;
        self.cursor.semi_block_index = 0;
        self.blocks += 1;
        trace!(block = self.blocks, start, continuation, "analysis block placed");
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::placement::PlacementMode;

    fn noise(len: usize, seed: u32) -> Vec<f32> {
        let mut state = seed;
        (0..len)
            .map(|_| {
                state = state.wrapping_mul(1_664_525).wrapping_add(1_013_904_223);
                (state >> 8) as f32 / (1u32 << 24) as f32 * 2.0 - 1.0
            })
            .collect()
    }

    fn mono_config() -> StretchConfig {
        StretchConfig::new()
            .with_channels(1)
            .with_block_size(256)
            .with_chunk_size(512)
            .with_search_window(64)
    }

    fn run(engine: &mut StretchEngine, input: &[f32], chunk: usize, rate: f32) -> Vec<f32> {
        let mut output = Vec::new();
        for piece in input.chunks(chunk) {
            let block = engine
                .process(&AudioBlock::mono(piece.to_vec()), rate)
                .unwrap();
            output.extend_from_slice(block.channel(0));
        }
        output
    }

    #[test]
    fn test_unit_rate_is_delayed_identity() {
        for mode in [
            PlacementMode::FixedHop,
            PlacementMode::RateAdjusted,
            PlacementMode::PhaseAligned,
        ] {
            let config = mono_config().with_placement(mode);
            let reserve = config.lookahead() + config.semi_block();
            let mut engine = StretchEngine::new(config).unwrap();
            let input = noise(512 * 8, 5);
            let output = run(&mut engine, &input, 512, 1.0);

            assert_eq!(output.len(), input.len());
            let latency = engine.latency() as usize;
            assert_eq!(latency, reserve);
            assert!(output[..latency].iter().all(|&s| s == 0.0));
            for (k, &sample) in output[latency..].iter().enumerate() {
                assert!((sample - input[k]).abs() < 1e-5, "{:?} frame {}", mode, k);
            }
        }
    }

    #[test]
    fn test_large_first_chunk_has_bounded_latency() {
        let config = mono_config();
        let reserve = config.lookahead() + config.semi_block();
        let mut engine = StretchEngine::new(config).unwrap();
        let input = noise(1024 + 6 * 512, 43);

        let mut output = engine
            .process(&AudioBlock::mono(input[..1024].to_vec()), 1.0)
            .unwrap()
            .channel(0)
            .to_vec();
        output.extend(run(&mut engine, &input[1024..], 512, 1.0));

        assert_eq!(output.len(), input.len());
        assert_eq!(engine.latency() as usize, reserve);
        for (k, &sample) in output[reserve..].iter().enumerate() {
            assert!((sample - input[k]).abs() < 1e-5, "frame {}", k);
        }
    }

    #[test]
    fn test_first_chunk_beyond_history_keeps_engine_running() {
        let config = mono_config();
        let reserve = config.lookahead() + config.semi_block();
        assert!(config.history_capacity() < 8192);
        let mut engine = StretchEngine::new(config).unwrap();
        let input = noise(8192 + 40 * 512, 41);

        let mut output = engine
            .process(&AudioBlock::mono(input[..8192].to_vec()), 1.0)
            .unwrap()
            .channel(0)
            .to_vec();
        output.extend(run(&mut engine, &input[8192..], 512, 1.0));

        assert_eq!(output.len(), input.len());
        let latency = engine.latency() as usize;
        assert!(latency < 8192);
        assert!(output[..latency].iter().all(|&s| s == 0.0));
        // Input the history could not hold is skipped, the rest is delayed
        for t in latency..output.len() {
            assert!((output[t] - input[t - reserve]).abs() < 1e-5, "frame {}", t);
        }
    }

    #[test]
    fn test_output_preview_does_not_shorten_process() {
        let mut engine = StretchEngine::new(mono_config()).unwrap();
        engine.set_rate(0.7).unwrap();
        let chunk = AudioBlock::mono(noise(300, 6));

        let mut total = 0;
        for _ in 0..10 {
            let expected = engine.output_frames_for(300);
            assert_eq!(engine.output_frames_for(300), expected);
            let out = engine.process(&chunk, 0.7).unwrap();
            assert_eq!(out.frames(), expected);
            total += out.frames();
        }
        assert_eq!(total, (3000.0f64 / 0.7f32 as f64).round() as usize);
    }

    #[test]
    fn test_output_length_follows_rate() {
        for rate in [0.5, 0.7, 1.0, 1.3, 2.0] {
            let mut engine = StretchEngine::new(mono_config()).unwrap();
            let sizes = [300usize, 512, 411, 97, 512, 250];
            let mut total_in = 0;
            let mut total_out = 0;
            for (i, &size) in sizes.iter().cycle().take(40).enumerate() {
                let chunk = AudioBlock::mono(noise(size, i as u32));
                total_out += engine.process(&chunk, rate).unwrap().frames();
                total_in += size;
            }
            let expected = (total_in as f64 / rate as f64).round() as usize;
            assert_eq!(total_out, expected, "rate {}", rate);
        }
    }

    #[test]
    fn test_fixed_hop_ignores_rate() {
        let mut engine =
            StretchEngine::new(mono_config().with_placement(PlacementMode::FixedHop)).unwrap();
        assert_eq!(engine.placement_name(), "fixed-hop");
        let input = noise(2048, 8);
        let output = run(&mut engine, &input, 512, 1.5);
        assert_eq!(output.len(), input.len());
    }

    #[test]
    fn test_stereo_channels_stay_separate() {
        let config = mono_config().with_channels(2);
        let mut engine = StretchEngine::new(config).unwrap();
        let left = noise(4096, 11);
        let right: Vec<f32> = left.iter().map(|s| -0.5 * s).collect();

        for start in (0..4096).step_by(512) {
            let chunk = AudioBlock::from_channels(vec![
                left[start..start + 512].to_vec(),
                right[start..start + 512].to_vec(),
            ])
            .unwrap();
            let out = engine.process(&chunk, 1.3).unwrap();
            for (l, r) in out.channel(0).iter().zip(out.channel(1)) {
                assert!((r + 0.5 * l).abs() < 1e-5);
            }
        }
    }

    #[test]
    fn test_cursor_tracks_output() {
        let mut engine = StretchEngine::new(mono_config()).unwrap();
        let mut total_out = 0u64;
        for i in 0..20 {
            let out = engine
                .process(&AudioBlock::mono(noise(512, i)), 1.4)
                .unwrap();
            total_out += out.frames() as u64;

            let cursor = engine.cursor();
            assert!(cursor.semi_block_index <= 128);
            assert_eq!(cursor.output_index, total_out - engine.latency());
        }
    }

    #[test]
    fn test_silence_in_silence_out() {
        let mut engine = StretchEngine::new(mono_config()).unwrap();
        let output = run(&mut engine, &vec![0.0; 4096], 512, 0.6);
        assert!(output.iter().all(|&s| s == 0.0));
    }

    #[test]
    fn test_invalid_rate_leaves_state_untouched() {
        let mut engine = StretchEngine::new(mono_config()).unwrap();
        run(&mut engine, &noise(2048, 2), 512, 1.0);
        let cursor = engine.cursor();
        let pushed = engine.total_input();

        let chunk = AudioBlock::mono(noise(512, 3));
        for rate in [0.0, 2.5, -1.0, f32::NAN] {
            assert!(matches!(
                engine.process(&chunk, rate),
                Err(StretchError::InvalidRate(_))
            ));
        }
        assert_eq!(engine.cursor(), cursor);
        assert_eq!(engine.total_input(), pushed);
        assert_eq!(engine.rate(), 1.0);
    }

    #[test]
    fn test_channel_mismatch() {
        let mut engine = StretchEngine::new(mono_config().with_channels(2)).unwrap();
        let result = engine.process(&AudioBlock::mono(vec![0.0; 64]), 1.0);
        assert!(matches!(
            result,
            Err(StretchError::ChannelMismatch {
                expected: 2,
                actual: 1
            })
        ));
        assert_eq!(engine.total_input(), 0);
    }

    #[test]
    fn test_invalid_config_rejected() {
        assert!(StretchEngine::new(mono_config().with_block_size(255)).is_err());
        assert!(StretchEngine::new(mono_config().with_rate(3.0)).is_err());
    }

    #[test]
    fn test_pull_reproduces_input_at_unit_rate() {
        let mut engine = StretchEngine::new(mono_config()).unwrap();
        let input = noise(2048, 17);
        engine.push(&AudioBlock::mono(input.clone())).unwrap();

        let first = engine.pull(1000).unwrap();
        assert!(first.is_ready());
        let block = first.into_block();
        for (k, &sample) in block.channel(0).iter().enumerate() {
            assert!((sample - input[k]).abs() < 1e-5);
        }

        // Not enough lookahead left for the full request
        match engine.pull(1048).unwrap() {
            Pull::Pending(partial) => assert!(partial.frames() < 1048),
            Pull::Ready(_) => panic!("expected pending"),
        }
    }

    #[test]
    fn test_pull_resumes_after_push() {
        let mut engine = StretchEngine::new(mono_config()).unwrap();
        let input = noise(4096, 23);
        engine.push(&AudioBlock::mono(input[..1024].to_vec())).unwrap();

        let mut output = Vec::new();
        output.extend_from_slice(engine.pull(2048).unwrap().into_block().channel(0));
        engine.push(&AudioBlock::mono(input[1024..].to_vec())).unwrap();
        let needed = 2048 - output.len();
        let rest = engine.pull(needed).unwrap();
        assert!(rest.is_ready());
        output.extend_from_slice(rest.into_block().channel(0));

        assert_eq!(output.len(), 2048);
        for (k, &sample) in output.iter().enumerate() {
            assert!((sample - input[k]).abs() < 1e-5);
        }
    }

    #[test]
    fn test_reset_matches_fresh_engine() {
        let input = noise(4096, 31);
        let mut engine = StretchEngine::new(mono_config()).unwrap();
        let first = run(&mut engine, &input, 512, 0.8);

        engine.reset();
        assert_eq!(engine.cursor(), EngineCursor::default());
        assert_eq!(engine.latency(), 0);
        let second = run(&mut engine, &input, 512, 0.8);
        assert_eq!(first, second);
    }

    #[test]
    fn test_rate_change_applies_to_later_blocks() {
        let mut engine = StretchEngine::new(mono_config()).unwrap();
        engine.set_rate(1.5).unwrap();
        assert_eq!(engine.rate(), 1.5);
        assert!(engine.set_rate(0.0).is_err());
        assert_eq!(engine.rate(), 1.5);
    }
}
