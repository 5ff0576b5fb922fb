//! Iterator adapter that stretches a stream of chunks

use crate::block::AudioBlock;
use crate::engine::StretchEngine;
use crate::error::{Result, StretchError};
use std::iter::Fuse;
use tracing::{debug, trace};

/// Drives a [`StretchEngine`] from a chunk source using the pull API.
///
/// Yields stretched blocks as they become available. When the source ends
/// the engine is flushed with silence, so every owed frame is produced:
/// the total length is `round(total input / rate)` at a constant rate.
/// The first error ends the stream.
pub struct StretchStream<I> {
    engine: StretchEngine,
    source: Fuse<I>,
    /// Output frames scheduled but not yet yielded
    owed: u64,
    flushed: bool,
    finished: bool,
}

impl<I> StretchStream<I>
where
    I: Iterator<Item = AudioBlock>,
{
    pub fn new(engine: StretchEngine, source: I) -> Self {
        Self {
            engine,
            source: source.fuse(),
            owed: 0,
            flushed: false,
            finished: false,
        }
    }

    /// Change the rate for input pushed from now on
    pub fn set_rate(&mut self, rate: f32) -> Result<()> {
        self.engine.set_rate(rate)
    }

    pub fn engine(&self) -> &StretchEngine {
        &self.engine
    }

    pub fn into_engine(self) -> StretchEngine {
        self.engine
    }

    /// Push silence covering the engine lookahead so the tail can be produced
    fn flush(&mut self) -> Result<()> {
        let config = self.engine.config();
        let tail = AudioBlock::silence(config.channels, config.lookahead() + config.semi_block());
        debug!(frames = tail.frames(), owed = self.owed, "flushing stretch stream");
        self.engine.push(&tail)
    }

    fn fail<T>(&mut self, err: StretchError) -> Option<Result<T>> {
        self.finished = true;
        Some(Err(err))
    }
}

impl<I> Iterator for StretchStream<I>
where
    I: Iterator<Item = AudioBlock>,
{
    type Item = Result<AudioBlock>;

    fn next(&mut self) -> Option<Self::Item> {
        while !self.finished {
            if self.owed > 0 {
                let block = match self.engine.pull(self.owed as usize) {
                    Ok(pull) => pull.into_block(),
                    Err(e) => return self.fail(e),
                };
                if !block.is_empty() {
                    self.owed -= block.frames() as u64;
                    return Some(Ok(block));
                }
            }

            match self.source.next() {
                Some(chunk) => {
                    if let Err(e) = self.engine.push(&chunk) {
                        return self.fail(e);
                    }
                    self.owed += self.engine.schedule_output(chunk.frames()) as u64;
                }
                None if !self.flushed => {
                    self.flushed = true;
                    if let Err(e) = self.flush() {
                        return self.fail(e);
                    }
                }
                None => {
                    if self.owed > 0 {
                        trace!(owed = self.owed, "stream ended before all output was produced");
                    }
                    self.finished = true;
                }
            }
        }
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::StretchConfig;

    fn noise(len: usize, seed: u32) -> Vec<f32> {
        let mut state = seed;
        (0..len)
            .map(|_| {
                state = state.wrapping_mul(1_664_525).wrapping_add(1_013_904_223);
                (state >> 8) as f32 / (1u32 << 24) as f32 * 2.0 - 1.0
            })
            .collect()
    }

    fn engine(rate: f32) -> StretchEngine {
        let config = StretchConfig::new()
            .with_channels(1)
            .with_block_size(256)
            .with_chunk_size(512)
            .with_search_window(64)
            .with_rate(rate);
        StretchEngine::new(config).unwrap()
    }

    fn chunks(samples: &[f32], size: usize) -> Vec<AudioBlock> {
        samples
            .chunks(size)
            .map(|c| AudioBlock::mono(c.to_vec()))
            .collect()
    }

    #[test]
    fn test_unit_rate_reproduces_input() {
        let input = noise(5120, 4);
        let stream = StretchStream::new(engine(1.0), chunks(&input, 512).into_iter());

        let output: Vec<f32> = stream
            .flat_map(|block| block.unwrap().channel(0).to_vec())
            .collect();

        assert_eq!(output.len(), input.len());
        for (k, (&out, &inp)) in output.iter().zip(&input).enumerate() {
            assert!((out - inp).abs() < 1e-5, "frame {}", k);
        }
    }

    #[test]
    fn test_total_length_follows_rate() {
        for rate in [0.75f32, 1.6] {
            let input = noise(6000, 9);
            let stream = StretchStream::new(engine(rate), chunks(&input, 500).into_iter());
            let total: usize = stream.map(|block| block.unwrap().frames()).sum();
            assert_eq!(total, (6000.0 / rate as f64).round() as usize);
        }
    }

    #[test]
    fn test_empty_source() {
        let mut stream = StretchStream::new(engine(1.0), std::iter::empty::<AudioBlock>());
        assert!(stream.next().is_none());
        assert!(stream.next().is_none());
    }

    #[test]
    fn test_error_ends_stream() {
        let source = vec![
            AudioBlock::mono(vec![0.0; 256]),
            AudioBlock::silence(2, 256),
            AudioBlock::mono(vec![0.0; 256]),
        ];
        let results: Vec<_> = StretchStream::new(engine(1.0), source.into_iter()).collect();

        let last = results.last().unwrap();
        assert!(matches!(last, Err(StretchError::ChannelMismatch { .. })));
        assert!(results[..results.len() - 1].iter().all(|r| r.is_ok()));
    }

    #[test]
    fn test_into_engine_keeps_state() {
        let input = noise(2048, 1);
        let mut stream = StretchStream::new(engine(1.0), chunks(&input, 512).into_iter());
        assert!(stream.set_rate(4.0).is_err());
        assert_eq!(stream.engine().total_input(), 0);
        let _ = stream.next();
        let engine = stream.into_engine();
        assert!(engine.total_input() > 0);
        assert_eq!(engine.rate(), 1.0);
    }
}
