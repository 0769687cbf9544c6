//! Spectrum analysis for visualization
//!
//! Runs on the visualization cadence, never on the audio thread. Each pass
//! drains up to one transform frame from the analyzer queue, windows it,
//! takes a magnitude-only FFT, and resamples the result onto a fixed number
//! of logarithmically skewed display bins.

use crate::audio::analyzer_queue::AnalyzerConsumer;
use parametrix_core::domain::AnalyzerConfig;
use rustfft::num_complex::Complex;
use rustfft::{Fft, FftPlanner};
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;
use tracing::{debug, trace};

/// FFT spectrum engine feeding a fixed-size display buffer
pub struct SpectrumEngine {
    consumer: AnalyzerConsumer,
    fft: Arc<dyn Fft<f32>>,
    fft_size: usize,

    /// Time-domain frame as popped, zero-padded when the queue ran short
    frame: Vec<f32>,
    /// Periodic Hann window, computed once
    window: Vec<f32>,
    /// Magnitude of a full-scale sine after windowing
    window_gain: f32,
    spectrum: Vec<Complex<f32>>,
    scratch: Vec<Complex<f32>>,

    /// FFT bin sampled by each display bin
    bin_index: Vec<usize>,
    /// Per display bin level in dB, clamped to the display range
    levels_db: Vec<f32>,
    /// Per display bin level normalized to [0, 1]
    bins: Vec<f32>,

    min_db: f32,
    max_db: f32,
    /// Stream rate as `f32` bits, republished by the engine on `prepare`
    sample_rate: Arc<AtomicU32>,
    frames: u64,
}

impl SpectrumEngine {
    /// Allocate every buffer the analysis needs
    ///
    /// `config` is expected to be validated already.
    pub fn new(consumer: AnalyzerConsumer, config: &AnalyzerConfig, sample_rate: f32) -> Self {
        let fft_size = config.fft_size();
        let mut planner = FftPlanner::new();
        let fft = planner.plan_fft_forward(fft_size);
        let scratch = vec![Complex::new(0.0, 0.0); fft.get_inplace_scratch_len()];

        let window: Vec<f32> = (0..fft_size)
            .map(|i| 0.5 * (1.0 - (2.0 * std::f32::consts::PI * i as f32 / fft_size as f32).cos()))
            .collect();
        let window_gain = window.iter().sum::<f32>() / 2.0;

        let bin_index = (0..config.display_bins)
            .map(|i| skewed_index(i, config.display_bins, config.skew_factor, fft_size))
            .collect();

        debug!(
            fft_size,
            display_bins = config.display_bins,
            skew = config.skew_factor,
            "Spectrum engine created"
        );

        Self {
            consumer,
            fft,
            fft_size,
            frame: vec![0.0; fft_size],
            window,
            window_gain,
            spectrum: vec![Complex::new(0.0, 0.0); fft_size],
            scratch,
            bin_index,
            levels_db: vec![config.min_db; config.display_bins],
            bins: vec![0.0; config.display_bins],
            min_db: config.min_db,
            max_db: config.max_db,
            sample_rate: Arc::new(AtomicU32::new(sample_rate.to_bits())),
            frames: 0,
        }
    }

    /// Drain one frame from the queue and refresh the display bins
    ///
    /// Returns `false`, leaving the previous output in place, when the queue
    /// was empty.
    pub fn consume_and_analyze(&mut self) -> bool {
        let fft_size = self.fft_size;
        let available = self.consumer.pop(&mut self.frame, fft_size);
        if available == 0 {
            return false;
        }
        self.frame[available..].fill(0.0);

        for ((bin, &sample), &w) in self
            .spectrum
            .iter_mut()
            .zip(&self.frame)
            .zip(&self.window)
        {
            *bin = Complex::new(sample * w, 0.0);
        }
        self.fft
            .process_with_scratch(&mut self.spectrum, &mut self.scratch);

        let range = self.max_db - self.min_db;
        for ((&index, level), out) in self
            .bin_index
            .iter()
            .zip(self.levels_db.iter_mut())
            .zip(self.bins.iter_mut())
        {
            let magnitude = self.spectrum[index].norm() / self.window_gain;
            let db = 20.0 * magnitude.max(f32::MIN_POSITIVE).log10();
            *level = db.clamp(self.min_db, self.max_db);
            *out = (*level - self.min_db) / range;
        }

        self.frames += 1;
        trace!(samples = available, frame = self.frames, "Spectrum frame analyzed");
        true
    }

    /// Normalized display bins, `[0, 1]` per bin
    pub fn bins(&self) -> &[f32] {
        &self.bins
    }

    /// Display bins in dB, clamped to the configured range
    pub fn levels_db(&self) -> &[f32] {
        &self.levels_db
    }

    /// The last time-domain frame, before windowing
    pub fn frame(&self) -> &[f32] {
        &self.frame
    }

    /// Frequency in Hz that display bin `bin` samples
    ///
    /// Out-of-range bins report the Nyquist frequency.
    pub fn bin_frequency(&self, bin: usize) -> f32 {
        let index = self
            .bin_index
            .get(bin)
            .copied()
            .unwrap_or(self.fft_size / 2);
        index as f32 * self.sample_rate() / self.fft_size as f32
    }

    /// Rate of the stream feeding the analyzer, as of the last `prepare`
    pub fn sample_rate(&self) -> f32 {
        f32::from_bits(self.sample_rate.load(Ordering::Relaxed))
    }

    /// Handle through which stream setup updates the analyzer's rate
    pub(crate) fn shared_sample_rate(&self) -> Arc<AtomicU32> {
        Arc::clone(&self.sample_rate)
    }

    /// Display floor and ceiling in dB
    pub fn db_range(&self) -> (f32, f32) {
        (self.min_db, self.max_db)
    }

    pub fn fft_size(&self) -> usize {
        self.fft_size
    }

    pub fn display_bins(&self) -> usize {
        self.bins.len()
    }

    /// Frames analyzed since construction
    pub fn frames_analyzed(&self) -> u64 {
        self.frames
    }
}

/// FFT bin for display bin `i` of `bins`
///
/// `1 - exp(ln(1 - i/bins) * skew)` spreads low frequencies over more display
/// bins. The result is clamped to the non-negative half of the spectrum.
fn skewed_index(i: usize, bins: usize, skew: f32, fft_size: usize) -> usize {
    let half = fft_size / 2;
    let position = 1.0 - i as f32 / bins as f32;
    let skewed = 1.0 - (position.ln() * skew).exp();
    ((skewed * half as f32) as usize).min(half)
}
