//! Biquad coefficient model and filter state
//!
//! This module provides:
//! - Normalized biquad coefficient design (peak, shelves, pass filters, all-pass)
//! - The pure band-parameters-to-coefficients mapping
//! - Direct Form I filter state for interleaved multi-channel buffers
//!
//! Everything here is allocation-free and safe to call from the audio thread.

use crate::domain::audio::MAX_CHANNELS;
use crate::domain::band::{BandParams, FilterKind};
use num_complex::Complex64;
use serde::{Deserialize, Serialize};

/// Gains at or below this level convert to a linear factor of zero
pub const GAIN_FLOOR_DB: f32 = -80.0;

/// Centre of the all-pass a disengaged band is built as
pub const ALL_PASS_FREQ: f64 = 1000.0;

/// Q of the all-pass a disengaged band is built as
pub const ALL_PASS_Q: f64 = std::f64::consts::FRAC_1_SQRT_2;

/// Highest design frequency as a fraction of the sample rate
///
/// At or above Nyquist the RBJ designs put their poles outside the unit circle.
pub const MAX_DESIGN_RATIO: f64 = 0.49;

/// Convert decibels to a linear gain factor, with [`GAIN_FLOOR_DB`] as silence
#[inline]
pub fn db_to_gain(db: f32) -> f32 {
    if db > GAIN_FLOOR_DB {
        10.0_f32.powf(db / 20.0)
    } else {
        0.0
    }
}

/// Convert a linear gain factor to decibels, never below [`GAIN_FLOOR_DB`]
#[inline]
pub fn gain_to_db(gain: f32) -> f32 {
    if gain > 0.0 {
        (20.0 * gain.log10()).max(GAIN_FLOOR_DB)
    } else {
        GAIN_FLOOR_DB
    }
}

// ============================================================================
// BIQUAD COEFFICIENTS
// ============================================================================

/// Biquad filter coefficients
///
/// Normalized so that the leading denominator coefficient is 1.0.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct BiquadCoeffs {
    /// Numerator coefficients
    pub b0: f64,
    pub b1: f64,
    pub b2: f64,
    /// Denominator coefficients (a0 is normalized to 1.0)
    pub a1: f64,
    pub a2: f64,
}

impl Default for BiquadCoeffs {
    fn default() -> Self {
        // Unity gain (no filtering)
        Self {
            b0: 1.0,
            b1: 0.0,
            b2: 0.0,
            a1: 0.0,
            a2: 0.0,
        }
    }
}

impl BiquadCoeffs {
    fn normalized(b0: f64, b1: f64, b2: f64, a0: f64, a1: f64, a2: f64) -> Self {
        Self {
            b0: b0 / a0,
            b1: b1 / a0,
            b2: b2 / a0,
            a1: a1 / a0,
            a2: a2 / a0,
        }
    }

    /// Calculate coefficients for a peaking EQ filter
    ///
    /// Boosts or cuts frequencies around a centre frequency. `gain` is the
    /// linear amplitude ratio at the centre.
    #[must_use]
    pub fn peaking(sample_rate: f64, freq: f64, q: f64, gain: f64) -> Self {
        let a = gain.max(0.0).sqrt();
        let (cos_w0, alpha) = Self::angular(sample_rate, freq, q);

        Self::normalized(
            1.0 + alpha * a,
            -2.0 * cos_w0,
            1.0 - alpha * a,
            1.0 + alpha / a,
            -2.0 * cos_w0,
            1.0 - alpha / a,
        )
    }

    /// Calculate coefficients for a low shelf filter
    ///
    /// Boosts or cuts frequencies below the corner frequency by `gain`.
    #[must_use]
    pub fn low_shelf(sample_rate: f64, freq: f64, q: f64, gain: f64) -> Self {
        let a = gain.max(0.0).sqrt();
        let (cos_w0, alpha) = Self::angular(sample_rate, freq, q);
        let beta = 2.0 * a.sqrt() * alpha;

        Self::normalized(
            a * ((a + 1.0) - (a - 1.0) * cos_w0 + beta),
            2.0 * a * ((a - 1.0) - (a + 1.0) * cos_w0),
            a * ((a + 1.0) - (a - 1.0) * cos_w0 - beta),
            (a + 1.0) + (a - 1.0) * cos_w0 + beta,
            -2.0 * ((a - 1.0) + (a + 1.0) * cos_w0),
            (a + 1.0) + (a - 1.0) * cos_w0 - beta,
        )
    }

    /// Calculate coefficients for a high shelf filter
    ///
    /// Boosts or cuts frequencies above the corner frequency by `gain`.
    #[must_use]
    pub fn high_shelf(sample_rate: f64, freq: f64, q: f64, gain: f64) -> Self {
        let a = gain.max(0.0).sqrt();
        let (cos_w0, alpha) = Self::angular(sample_rate, freq, q);
        let beta = 2.0 * a.sqrt() * alpha;

        Self::normalized(
            a * ((a + 1.0) + (a - 1.0) * cos_w0 + beta),
            -2.0 * a * ((a - 1.0) + (a + 1.0) * cos_w0),
            a * ((a + 1.0) + (a - 1.0) * cos_w0 - beta),
            (a + 1.0) - (a - 1.0) * cos_w0 + beta,
            2.0 * ((a - 1.0) - (a + 1.0) * cos_w0),
            (a + 1.0) - (a - 1.0) * cos_w0 - beta,
        )
    }

    /// Second-order high-pass (low cut) at `freq` with resonance `q`
    #[must_use]
    pub fn high_pass(sample_rate: f64, freq: f64, q: f64) -> Self {
        let (cos_w0, alpha) = Self::angular(sample_rate, freq, q);

        Self::normalized(
            (1.0 + cos_w0) / 2.0,
            -(1.0 + cos_w0),
            (1.0 + cos_w0) / 2.0,
            1.0 + alpha,
            -2.0 * cos_w0,
            1.0 - alpha,
        )
    }

    /// Second-order low-pass (high cut) at `freq` with resonance `q`
    #[must_use]
    pub fn low_pass(sample_rate: f64, freq: f64, q: f64) -> Self {
        let (cos_w0, alpha) = Self::angular(sample_rate, freq, q);

        Self::normalized(
            (1.0 - cos_w0) / 2.0,
            1.0 - cos_w0,
            (1.0 - cos_w0) / 2.0,
            1.0 + alpha,
            -2.0 * cos_w0,
            1.0 - alpha,
        )
    }

    /// Second-order all-pass: unit magnitude everywhere, phase turns around `freq`
    #[must_use]
    pub fn all_pass(sample_rate: f64, freq: f64, q: f64) -> Self {
        let (cos_w0, alpha) = Self::angular(sample_rate, freq, q);

        Self::normalized(
            1.0 - alpha,
            -2.0 * cos_w0,
            1.0 + alpha,
            1.0 + alpha,
            -2.0 * cos_w0,
            1.0 - alpha,
        )
    }

    #[inline]
    fn angular(sample_rate: f64, freq: f64, q: f64) -> (f64, f64) {
        let w0 = 2.0 * std::f64::consts::PI * freq / sample_rate;
        (w0.cos(), w0.sin() / (2.0 * q))
    }

    /// Steady-state magnitude response at `freq`, as a linear factor
    pub fn magnitude_at(&self, freq: f64, sample_rate: f64) -> f64 {
        let w = 2.0 * std::f64::consts::PI * freq / sample_rate;
        let z1 = Complex64::from_polar(1.0, -w);
        let z2 = z1 * z1;

        let numerator = self.b0 + self.b1 * z1 + self.b2 * z2;
        let denominator = 1.0 + self.a1 * z1 + self.a2 * z2;

        (numerator / denominator).norm()
    }

    /// Steady-state magnitude response at `freq`, in decibels
    pub fn magnitude_db_at(&self, freq: f64, sample_rate: f64) -> f64 {
        20.0 * self.magnitude_at(freq, sample_rate).max(1e-12).log10()
    }
}

/// Map a band's parameters to normalized biquad coefficients
///
/// Pure and total. Inputs are expected to be clamped to their declared
/// domains already. A band that is inactive or bypassed maps to an all-pass
/// centred at [`ALL_PASS_FREQ`]. The band frequency is held below Nyquist
/// so low host rates (22.05 or 32 kHz) still give a stable filter.
pub fn compute_coefficients(params: &BandParams, sample_rate: f64) -> BiquadCoeffs {
    if !params.is_engaged() {
        return BiquadCoeffs::all_pass(sample_rate, ALL_PASS_FREQ, ALL_PASS_Q);
    }

    let freq = f64::from(params.frequency).min(MAX_DESIGN_RATIO * sample_rate);
    let q = f64::from(params.quality);
    let gain = f64::from(db_to_gain(params.gain_db));

    match params.kind {
        FilterKind::Peak => BiquadCoeffs::peaking(sample_rate, freq, q, gain),
        FilterKind::HighPass => BiquadCoeffs::high_pass(sample_rate, freq, q),
        FilterKind::LowPass => BiquadCoeffs::low_pass(sample_rate, freq, q),
        FilterKind::HighShelf => BiquadCoeffs::high_shelf(sample_rate, freq, q, gain),
        FilterKind::LowShelf => BiquadCoeffs::low_shelf(sample_rate, freq, q, gain),
    }
}

// ============================================================================
// BIQUAD FILTER STATE
// ============================================================================

/// Per-channel Direct Form I history, kept in double precision
#[derive(Debug, Clone, Copy, Default, PartialEq)]
struct ChannelState {
    // Previous input samples (x[n-1], x[n-2])
    x1: f64,
    x2: f64,
    // Previous output samples (y[n-1], y[n-2])
    y1: f64,
    y2: f64,
}

impl ChannelState {
    #[inline]
    fn process_sample(&mut self, c: &BiquadCoeffs, x: f64) -> f64 {
        // Direct Form I: y[n] = b0*x[n] + b1*x[n-1] + b2*x[n-2]
        //                        - a1*y[n-1] - a2*y[n-2]
        let mut y = c.b0 * x + c.b1 * self.x1 + c.b2 * self.x2 - c.a1 * self.y1 - c.a2 * self.y2;

        // Flush denormals so a decaying tail doesn't stall the FPU
        if y.abs() < 1.0e-30 {
            y = 0.0;
        }

        self.x2 = self.x1;
        self.x1 = x;
        self.y2 = self.y1;
        self.y1 = y;

        y
    }
}

/// Stateful biquad filter over interleaved buffers
///
/// Direct Form I keeps coefficient swaps between blocks free of artifacts
/// from stale internal state scaling. Coefficients and history are `f64`:
/// low, narrow bands cancel to within single-precision rounding otherwise.
/// History is kept for up to [`MAX_CHANNELS`] channels in a fixed array.
#[derive(Debug, Clone, PartialEq)]
pub struct BiquadFilter {
    coeffs: BiquadCoeffs,
    state: [ChannelState; MAX_CHANNELS],
}

impl Default for BiquadFilter {
    fn default() -> Self {
        Self::new(BiquadCoeffs::default())
    }
}

impl BiquadFilter {
    /// Create a new biquad filter with given coefficients
    pub fn new(coeffs: BiquadCoeffs) -> Self {
        Self {
            coeffs,
            state: [ChannelState::default(); MAX_CHANNELS],
        }
    }

    /// Replace the coefficients, keeping the history
    pub fn set_coeffs(&mut self, coeffs: BiquadCoeffs) {
        self.coeffs = coeffs;
    }

    pub fn coeffs(&self) -> BiquadCoeffs {
        self.coeffs
    }

    /// Process an interleaved buffer in place
    ///
    /// Channels beyond [`MAX_CHANNELS`] are left untouched.
    pub fn process_interleaved(&mut self, buffer: &mut [f32], channels: usize) {
        let channels = channels.clamp(1, MAX_CHANNELS);
        let coeffs = self.coeffs;

        for frame in buffer.chunks_mut(channels) {
            for (sample, state) in frame.iter_mut().zip(self.state.iter_mut()) {
                *sample = state.process_sample(&coeffs, f64::from(*sample)) as f32;
            }
        }
    }

    /// Reset filter history on every channel
    pub fn reset(&mut self) {
        self.state = [ChannelState::default(); MAX_CHANNELS];
    }
}

// ============================================================================
// TESTS
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::band::ranges;
    use proptest::prelude::*;

    const SAMPLE_RATE: f64 = 48000.0;

    fn generate_test_signal(samples: usize, frequency: f32) -> Vec<f32> {
        (0..samples)
            .map(|i| (2.0 * std::f32::consts::PI * frequency * i as f32 / SAMPLE_RATE as f32).sin())
            .collect()
    }

    fn rms(buffer: &[f32]) -> f32 {
        (buffer.iter().map(|s| s * s).sum::<f32>() / buffer.len() as f32).sqrt()
    }

    fn kind_strategy() -> impl Strategy<Value = FilterKind> {
        (0usize..5).prop_map(FilterKind::from_index)
    }

    // -------------------------------------------------------------------------
    // Coefficient Model Tests
    // -------------------------------------------------------------------------

    #[test]
    fn test_db_conversion_floor() {
        assert!((db_to_gain(0.0) - 1.0).abs() < 1e-6);
        assert!((db_to_gain(6.0) - 1.9953).abs() < 1e-3);
        assert_eq!(db_to_gain(-80.0), 0.0);
        assert_eq!(db_to_gain(-120.0), 0.0);
        assert!(db_to_gain(-72.0) > 0.0);

        assert_eq!(gain_to_db(0.0), GAIN_FLOOR_DB);
        assert!((gain_to_db(0.5) + 6.02).abs() < 0.01);
    }

    #[test]
    fn test_coefficients_are_normalized_five_tuple() {
        let c = BiquadCoeffs::peaking(SAMPLE_RATE, 1000.0, 1.0, f64::from(db_to_gain(6.0)));
        // Recompose a0 from the symmetric peaking form: a1 == b1 once normalized
        assert!((c.a1 - c.b1).abs() < 1e-12);
        assert!(c.b0 > 1.0);
    }

    #[test]
    fn test_disengaged_band_is_all_pass() {
        let bypassed = BandParams {
            bypassed: true,
            ..BandParams::placed(FilterKind::Peak, 200.0, 12.0, 4.0)
        };
        let inactive = BandParams::initial(3);

        let expected = BiquadCoeffs::all_pass(SAMPLE_RATE, ALL_PASS_FREQ, ALL_PASS_Q);
        assert_eq!(compute_coefficients(&bypassed, SAMPLE_RATE), expected);
        assert_eq!(compute_coefficients(&inactive, SAMPLE_RATE), expected);
    }

    #[test]
    fn test_peak_far_from_centre_is_flat() {
        let params = BandParams::placed(FilterKind::Peak, 1000.0, 9.0, 2.0);
        let c = compute_coefficients(&params, SAMPLE_RATE);

        assert!(c.magnitude_db_at(20.0, 48000.0).abs() < 0.1);
        assert!(c.magnitude_db_at(20000.0, 48000.0).abs() < 0.3);
    }

    #[test]
    fn test_pass_filters_ignore_gain() {
        let a = compute_coefficients(
            &BandParams::placed(FilterKind::HighPass, 300.0, 12.0, 0.707),
            SAMPLE_RATE,
        );
        let b = compute_coefficients(
            &BandParams::placed(FilterKind::HighPass, 300.0, -40.0, 0.707),
            SAMPLE_RATE,
        );
        assert_eq!(a, b);
    }

    #[test]
    fn test_pass_filters_cutoff() {
        let q = std::f64::consts::FRAC_1_SQRT_2;
        let hp = BiquadCoeffs::high_pass(SAMPLE_RATE, 1000.0, q);
        let lp = BiquadCoeffs::low_pass(SAMPLE_RATE, 1000.0, q);

        // Butterworth Q puts the corner at -3 dB
        assert!((hp.magnitude_db_at(1000.0, 48000.0) + 3.01).abs() < 0.05);
        assert!((lp.magnitude_db_at(1000.0, 48000.0) + 3.01).abs() < 0.05);

        assert!(hp.magnitude_db_at(50.0, 48000.0) < -40.0);
        assert!(hp.magnitude_db_at(10000.0, 48000.0).abs() < 0.1);
        assert!(lp.magnitude_db_at(15000.0, 48000.0) < -20.0);
        assert!(lp.magnitude_db_at(50.0, 48000.0).abs() < 0.1);
    }

    #[test]
    fn test_shelves_reach_gain_away_from_corner() {
        let gain = f64::from(db_to_gain(6.0));
        let low = BiquadCoeffs::low_shelf(SAMPLE_RATE, 500.0, 0.707, gain);
        let high = BiquadCoeffs::high_shelf(SAMPLE_RATE, 2000.0, 0.707, gain);

        assert!((low.magnitude_db_at(20.0, 48000.0) - 6.0).abs() < 0.1);
        assert!(low.magnitude_db_at(15000.0, 48000.0).abs() < 0.1);
        assert!((high.magnitude_db_at(20000.0, 48000.0) - 6.0).abs() < 0.2);
        assert!(high.magnitude_db_at(30.0, 48000.0).abs() < 0.1);

        // Shelf corner sits at half the shelf gain
        assert!((low.magnitude_db_at(500.0, 48000.0) - 3.0).abs() < 0.1);
    }

    #[test]
    fn test_band_above_nyquist_stays_stable() {
        for sample_rate in [22050.0, 32000.0] {
            for kind in FilterKind::ALL {
                let params = BandParams::placed(kind, ranges::FREQ_MAX, 12.0, ranges::QUALITY_MAX);
                let c = compute_coefficients(&params, sample_rate);

                // Both poles inside the unit circle
                assert!(c.a2.abs() < 1.0, "{kind:?} at {sample_rate}: a2 = {}", c.a2);
                assert!(c.a1.abs() < 1.0 + c.a2, "{kind:?} at {sample_rate}: a1 = {}", c.a1);

                let mut filter = BiquadFilter::new(c);
                let mut signal: Vec<f32> = (0..4096)
                    .map(|i| 0.5 * (std::f32::consts::TAU * 9000.0 * i as f32 / sample_rate as f32).sin())
                    .collect();
                filter.process_interleaved(&mut signal, 1);

                assert!(
                    signal.iter().all(|s| s.is_finite() && s.abs() < 50.0),
                    "{kind:?} at {sample_rate} diverged"
                );
            }
        }
    }

    #[test]
    fn test_design_frequency_held_below_nyquist() {
        let above = BandParams::placed(FilterKind::Peak, 20000.0, 6.0, 1.0);
        let also_above = BandParams::placed(FilterKind::Peak, 17000.0, 6.0, 1.0);

        // Both land on the same design frequency just under 16 kHz
        assert_eq!(
            compute_coefficients(&above, 32000.0),
            compute_coefficients(&also_above, 32000.0)
        );
        // Below the limit the band frequency is used as is
        assert_ne!(
            compute_coefficients(&above, SAMPLE_RATE),
            compute_coefficients(&also_above, SAMPLE_RATE)
        );
    }

    proptest! {
        #[test]
        fn prop_disengaged_band_has_unit_magnitude(
            freq in ranges::FREQ_MIN..ranges::FREQ_MAX,
            gain_db in ranges::GAIN_DB_MIN..ranges::GAIN_DB_MAX,
            quality in ranges::QUALITY_MIN..ranges::QUALITY_MAX,
            kind in kind_strategy(),
            active in any::<bool>(),
            probe in 20.0f64..20000.0,
        ) {
            let params = BandParams {
                frequency: freq,
                gain_db,
                quality,
                kind,
                // either inactive, or active but bypassed
                bypassed: active,
                active,
            };
            let c = compute_coefficients(&params, SAMPLE_RATE);
            let mag = c.magnitude_at(probe, SAMPLE_RATE);
            prop_assert!((mag - 1.0).abs() < 1e-4, "magnitude {} at {} Hz", mag, probe);
        }

        #[test]
        fn prop_peak_hits_gain_at_centre(
            freq in ranges::FREQ_MIN..16000.0f32,
            gain_db in ranges::GAIN_DB_MIN..ranges::GAIN_DB_MAX,
            quality in ranges::QUALITY_MIN..ranges::QUALITY_MAX,
        ) {
            let params = BandParams::placed(FilterKind::Peak, freq, gain_db, quality);
            let c = compute_coefficients(&params, SAMPLE_RATE);
            let response = c.magnitude_db_at(f64::from(freq), SAMPLE_RATE);
            prop_assert!(
                (response - f64::from(gain_db)).abs() < 0.1,
                "{} dB at {} Hz, wanted {}", response, freq, gain_db
            );
        }
    }

    // -------------------------------------------------------------------------
    // Biquad Filter Tests
    // -------------------------------------------------------------------------

    #[test]
    fn test_biquad_unity() {
        let mut filter = BiquadFilter::default();
        let mut signal = vec![0.5, -0.3, 0.8, 0.1];
        let original = signal.clone();

        filter.process_interleaved(&mut signal, 1);

        assert_eq!(signal, original);
    }

    #[test]
    fn test_biquad_reset() {
        let c = BiquadCoeffs::low_pass(SAMPLE_RATE, 200.0, 0.707);
        let mut filter = BiquadFilter::new(c);

        let mut signal = vec![1.0; 64];
        filter.process_interleaved(&mut signal, 1);

        filter.reset();

        // After reset, silence in must be silence out
        let mut silence = vec![0.0; 16];
        filter.process_interleaved(&mut silence, 1);
        assert!(silence.iter().all(|&s| s == 0.0));
    }

    #[test]
    fn test_biquad_channels_are_independent() {
        let c = BiquadCoeffs::peaking(SAMPLE_RATE, 1000.0, 1.0, f64::from(db_to_gain(6.0)));
        let mut stereo = BiquadFilter::new(c);
        let mut mono = BiquadFilter::new(c);

        let left = generate_test_signal(256, 1000.0);
        let mut interleaved: Vec<f32> = left.iter().flat_map(|&s| [s, 0.0]).collect();
        let mut mono_buffer = left.clone();

        stereo.process_interleaved(&mut interleaved, 2);
        mono.process_interleaved(&mut mono_buffer, 1);

        for (i, &expected) in mono_buffer.iter().enumerate() {
            assert_eq!(interleaved[2 * i], expected);
            assert_eq!(interleaved[2 * i + 1], 0.0);
        }
    }

    #[test]
    fn test_biquad_peak_boosts_centre() {
        let c = BiquadCoeffs::peaking(SAMPLE_RATE, 1000.0, 1.0, f64::from(db_to_gain(6.0)));
        let mut filter = BiquadFilter::new(c);

        // 1 kHz has a period of 48 samples; measure over whole periods after settling
        let mut signal = generate_test_signal(48 * 400, 1000.0);
        let original_rms = rms(&signal[48 * 200..]);
        filter.process_interleaved(&mut signal, 1);
        let processed_rms = rms(&signal[48 * 200..]);

        let gain_db = 20.0 * (processed_rms / original_rms).log10();
        assert!((gain_db - 6.0).abs() < 0.1, "measured {gain_db} dB");
    }
}
