//! Analysis window tables for overlap-add

use crate::block::AudioBlock;
use crate::error::{Result, StretchError};
use std::f64::consts::PI;

/// Tapering function applied to analysis blocks
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub enum WindowFunction {
    /// Raised cosine; sums to exactly one at 50% overlap
    #[default]
    Hann,
    /// Triangle; also sums to one at 50% overlap
    Bartlett,
    /// Kaiser-Bessel with shape parameter β (larger = narrower main lobe)
    Kaiser { beta: f32 },
}

impl WindowFunction {
    /// Config name of the function
    pub fn name(self) -> &'static str {
        match self {
            WindowFunction::Hann => "hann",
            WindowFunction::Bartlett => "bartlett",
            WindowFunction::Kaiser { .. } => "kaiser",
        }
    }

    /// Periodic (DFT-even) coefficient `n` of a window of length `len`
    fn coefficient(self, n: usize, len: usize) -> f64 {
        let x = n as f64 / len as f64;
        match self {
            WindowFunction::Hann => 0.5 * (1.0 - (2.0 * PI * x).cos()),
            WindowFunction::Bartlett => 1.0 - (2.0 * x - 1.0).abs(),
            WindowFunction::Kaiser { beta } => {
                let beta = beta as f64;
                let r = 2.0 * x - 1.0;
                bessel_i0(beta * (1.0 - r * r).max(0.0).sqrt()) / bessel_i0(beta)
            }
        }
    }
}

/// Zeroth-order modified Bessel function of the first kind (power series)
fn bessel_i0(x: f64) -> f64 {
    let half = x / 2.0;
    let mut term = 1.0;
    let mut sum = 1.0;
    let mut k = 1.0;
    while term > sum * 1e-12 {
        term *= (half / k) * (half / k);
        sum += term;
        k += 1.0;
    }
    sum
}

/// Precomputed window of one block length, shared by all channels.
///
/// Coefficients are scaled so a 50%-overlapped pair `w[j] + w[j + block/2]`
/// averages one, so overlap-adding at the nominal hop preserves level.
#[derive(Debug, Clone)]
pub struct WindowTable {
    function: WindowFunction,
    coefficients: Vec<f32>,
}

impl WindowTable {
    /// Build the table for `block_size` samples
    pub fn new(function: WindowFunction, block_size: usize) -> Self {
        let raw: Vec<f64> = (0..block_size)
            .map(|n| function.coefficient(n, block_size))
            .collect();

        let half = block_size / 2;
        let gain = if half > 0 {
            (0..half).map(|j| raw[j] + raw[j + half]).sum::<f64>() / half as f64
        } else {
            1.0
        };
        let scale = if gain > 0.0 { 1.0 / gain } else { 1.0 };

        Self {
            function,
            coefficients: raw.into_iter().map(|w| (w * scale) as f32).collect(),
        }
    }

    #[inline]
    pub fn function(&self) -> WindowFunction {
        self.function
    }

    #[inline]
    pub fn block_size(&self) -> usize {
        self.coefficients.len()
    }

    #[inline]
    pub fn coefficients(&self) -> &[f32] {
        &self.coefficients
    }

    /// Multiply every channel of `block` by the window slice starting at `window_start`
    pub fn apply(&self, block: &mut AudioBlock, window_start: usize) -> Result<()> {
        let end = window_start + block.frames();
        if end > self.coefficients.len() {
            return Err(StretchError::WindowRange {
                start: window_start,
                end,
                block_size: self.coefficients.len(),
            });
        }

        let window = &self.coefficients[window_start..end];
        for ch in 0..block.channels() {
            for (sample, &w) in block.channel_mut(ch).iter_mut().zip(window) {
                *sample *= w;
            }
        }
        Ok(())
    }
}
