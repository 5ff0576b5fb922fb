//! Sliding cross-correlation for block similarity search

use rustfft::{num_complex::Complex, Fft, FftPlanner};
use std::sync::Arc;

/// Work size (reference length × lag count) below which the direct sum is used
pub const DIRECT_CORRELATION_LIMIT: usize = 4096;

/// Computes the correlation of a reference segment against every placement
/// of it inside a longer signal.
///
/// Short searches are summed directly; longer ones go through a zero-padded
/// FFT. Plans and scratch buffers are kept between calls since the engine
/// correlates segments of the same length block after block.
pub struct CrossCorrelator {
    planner: FftPlanner<f32>,
    fft_len: usize,
    forward: Option<Arc<dyn Fft<f32>>>,
    inverse: Option<Arc<dyn Fft<f32>>>,
    /// Spectrum of the signal, reused as the product buffer
    signal_buffer: Vec<Complex<f32>>,
    /// Spectrum of the reference
    reference_buffer: Vec<Complex<f32>>,
}

impl Default for CrossCorrelator {
    fn default() -> Self {
        Self::new()
    }
}

impl CrossCorrelator {
    /// Create a correlator with no plans yet
    pub fn new() -> Self {
        Self {
            planner: FftPlanner::new(),
            fft_len: 0,
            forward: None,
            inverse: None,
            signal_buffer: Vec::new(),
            reference_buffer: Vec::new(),
        }
    }

    /// Correlate `reference` against `signal` for every full overlap.
    ///
    /// Returns `signal.len() - reference.len() + 1` values where value `k` is
    /// `Σ reference[i] * signal[i + k]`. Empty when the reference is empty or
    /// longer than the signal.
    pub fn correlate(&mut self, reference: &[f32], signal: &[f32]) -> Vec<f32> {
        if reference.is_empty() || reference.len() > signal.len() {
            return Vec::new();
        }

        let lags = signal.len() - reference.len() + 1;
        if reference.len() * lags <= DIRECT_CORRELATION_LIMIT {
            Self::correlate_direct(reference, signal)
        } else {
            self.correlate_fft(reference, signal)
        }
    }

    /// Plain O(n·m) sliding dot product
    pub fn correlate_direct(reference: &[f32], signal: &[f32]) -> Vec<f32> {
        if reference.is_empty() || reference.len() > signal.len() {
            return Vec::new();
        }

        signal
            .windows(reference.len())
            .map(|window| window.iter().zip(reference).map(|(s, r)| s * r).sum())
            .collect()
    }

    fn correlate_fft(&mut self, reference: &[f32], signal: &[f32]) -> Vec<f32> {
        let lags = signal.len() - reference.len() + 1;
        // Padding past signal + reference keeps the circular product free of wrap-around
        let fft_len = (signal.len() + reference.len()).next_power_of_two();
        self.prepare(fft_len);

        let (Some(forward), Some(inverse)) = (self.forward.clone(), self.inverse.clone()) else {
            return Self::correlate_direct(reference, signal);
        };

        fill_padded(&mut self.signal_buffer, signal);
        fill_padded(&mut self.reference_buffer, reference);

        forward.process(&mut self.signal_buffer);
        forward.process(&mut self.reference_buffer);

        // Cross-correlation theorem: corr = IFFT(S · conj(R))
        for (s, r) in self.signal_buffer.iter_mut().zip(&self.reference_buffer) {
            *s *= r.conj();
        }

        inverse.process(&mut self.signal_buffer);

        let scale = 1.0 / fft_len as f32;
        self.signal_buffer[..lags]
            .iter()
            .map(|c| c.re * scale)
            .collect()
    }

    fn prepare(&mut self, fft_len: usize) {
        if self.fft_len == fft_len && self.forward.is_some() {
            return;
        }

        self.forward = Some(self.planner.plan_fft_forward(fft_len));
        self.inverse = Some(self.planner.plan_fft_inverse(fft_len));
        self.signal_buffer = vec![Complex::new(0.0, 0.0); fft_len];
        self.reference_buffer = vec![Complex::new(0.0, 0.0); fft_len];
        self.fft_len = fft_len;
    }
}

fn fill_padded(buffer: &mut [Complex<f32>], samples: &[f32]) {
    for (slot, &sample) in buffer.iter_mut().zip(samples) {
        *slot = Complex::new(sample, 0.0);
    }
    for slot in buffer.iter_mut().skip(samples.len()) {
        *slot = Complex::new(0.0, 0.0);
    }
}
