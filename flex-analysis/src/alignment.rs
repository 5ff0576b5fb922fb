//! Waveform-similarity phase alignment for overlap-add blocks.
//!
//! Given the segment that naturally continues the previously emitted block and
//! a search region around the default position of the next block, the aligner
//! finds the shift at which the new block best continues the waveform. Placing
//! the block there avoids the clicks and warbling of a fixed-hop overlap-add.

use crate::correlation::CrossCorrelator;
use tracing::trace;

/// Weighting that favours offsets close to the default hop
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub enum BiasTaper {
    /// Plain correlation argmax
    #[default]
    None,
    /// Multiply correlation, shifted to be non-negative, by a Gaussian
    /// centred on the default offset. Spread is `1 / factor`; a factor of
    /// zero spreads over the whole search.
    Gaussian { factor: f32 },
    /// Blend the normalised correlation with a Bartlett taper:
    /// `(1 - affinity) * corr + affinity * taper`
    Bartlett { affinity: f32 },
}

/// Cross-correlation search for the best block placement
pub struct PhaseAligner {
    /// Search radius in samples (offsets span `-radius..=radius`)
    radius: usize,
    bias: BiasTaper,
    correlator: CrossCorrelator,
}

impl PhaseAligner {
    /// Create an aligner searching `±radius` samples around the default position
    pub fn new(radius: usize, bias: BiasTaper) -> Self {
        Self {
            radius,
            bias,
            correlator: CrossCorrelator::new(),
        }
    }

    /// Search radius in samples
    #[inline]
    pub fn radius(&self) -> usize {
        self.radius
    }

    /// Active bias taper
    #[inline]
    pub fn bias(&self) -> BiasTaper {
        self.bias
    }

    /// Find the signed offset at which `candidate` best continues `previous`.
    ///
    /// `candidate` must start `radius` samples before the default position and
    /// hold up to `previous.len() + 2 * radius` samples; a shorter candidate
    /// only searches the lags it covers. The result lies in
    /// `-radius..=radius`. Returns `None` for silence, for an all-zero
    /// correlation, or when the candidate cannot hold a single placement.
    pub fn find_offset(&mut self, previous: &[f32], candidate: &[f32]) -> Option<isize> {
        let max_len = previous.len() + 2 * self.radius;
        let candidate = &candidate[..candidate.len().min(max_len)];
        let lag = self.search(previous, candidate, self.radius)?;
        Some(lag as isize - self.radius as isize)
    }

    /// One-sided variant: `candidate` starts at the default position and
    /// holds up to `previous.len() + radius` samples. The result lies in
    /// `0..=radius`. Use it when nothing before the default position can be
    /// searched, such as at the start of a stream.
    pub fn find_forward_offset(&mut self, previous: &[f32], candidate: &[f32]) -> Option<usize> {
        let max_len = previous.len() + self.radius;
        let candidate = &candidate[..candidate.len().min(max_len)];
        self.search(previous, candidate, 0)
    }

    /// Bias weights over `lags` positions, peaking at `preferred`
    pub fn bias_window(&self, lags: usize, preferred: usize) -> Vec<f32> {
        match self.bias {
            BiasTaper::None => vec![1.0; lags],
            BiasTaper::Gaussian { factor } => gaussian_window(lags, preferred, factor),
            BiasTaper::Bartlett { .. } => bartlett_window(lags, preferred, self.radius),
        }
    }

    /// Returns the winning lag index into the correlation
    fn search(&mut self, previous: &[f32], candidate: &[f32], preferred: usize) -> Option<usize> {
        if previous.is_empty() || candidate.len() < previous.len() {
            return None;
        }

        if is_silent(previous) || is_silent(candidate) {
            trace!("silent segment, skipping phase alignment");
            return None;
        }

        let correlation = self.correlator.correlate(previous, candidate);
        let peak = correlation.iter().fold(0.0f32, |acc, c| acc.max(c.abs()));
        if peak <= f32::MIN_POSITIVE {
            trace!("degenerate correlation, skipping phase alignment");
            return None;
        }

        let bias = self.bias_window(correlation.len(), preferred);
        let scores: Vec<f32> = match self.bias {
            BiasTaper::None => correlation,
            // Shift non-negative; weighting negative scores favours distant lags
            BiasTaper::Gaussian { .. } => correlation
                .iter()
                .zip(&bias)
                .map(|(c, b)| (c + peak) * b)
                .collect(),
            BiasTaper::Bartlett { affinity } => {
                let affinity = affinity.clamp(0.0, 1.0);
                correlation
                    .iter()
                    .zip(&bias)
                    .map(|(c, b)| (1.0 - affinity) * (c / peak) + affinity * b)
                    .collect()
            }
        };

        argmax(&scores)
    }
}

fn is_silent(samples: &[f32]) -> bool {
    samples.iter().all(|&s| s == 0.0)
}

/// First index of the maximum; NaN scores never win
fn argmax(scores: &[f32]) -> Option<usize> {
    let mut best: Option<(usize, f32)> = None;
    for (i, &score) in scores.iter().enumerate() {
        if score.is_nan() {
            continue;
        }
        match best {
            Some((_, value)) if value >= score => {}
            _ => best = Some((i, score)),
        }
    }
    best.map(|(i, _)| i)
}

fn gaussian_window(lags: usize, preferred: usize, factor: f32) -> Vec<f32> {
    let std_dev = if factor > 0.0 {
        1.0 / factor
    } else {
        lags.max(1) as f32
    };

    let window: Vec<f32> = (0..lags)
        .map(|i| {
            let x = (i as f32 - preferred as f32) / std_dev;
            (-0.5 * x * x).exp()
        })
        .collect();

    let max = window.iter().cloned().fold(0.0f32, f32::max);
    if max > 0.0 {
        window.into_iter().map(|w| w / max).collect()
    } else {
        // Preferred offset far outside the searched lags
        vec![1.0; lags]
    }
}

fn bartlett_window(lags: usize, preferred: usize, radius: usize) -> Vec<f32> {
    if radius == 0 {
        return vec![1.0; lags];
    }
    (0..lags)
        .map(|i| {
            let distance = (i as f32 - preferred as f32).abs();
            (1.0 - distance / radius as f32).max(0.0)
        })
        .collect()
}
