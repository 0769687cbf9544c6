//! Band cascade with pre and post gain
//!
//! [`FilterChain`] is the audio-thread side: a fixed set of bands between two
//! gain stages. [`ChainController`] is the control side: it owns every
//! mailbox writer and reads the published mirrors back for response curves.

use crate::domain::audio::{EngineError, Result, StreamSpec};
use crate::domain::band::{normalized_to_frequency, ranges, BandField, BandParams};
use crate::domain::config::EngineConfig;
use crate::domain::dsp::{db_to_gain, GAIN_FLOOR_DB};
use crate::domain::filter_band::{BandController, FilterBand};
use crate::domain::mailbox::{pending_update_slot, SlotReader, SlotWriter};
use crate::domain::mirror::{MirrorReader, MirrorSnapshot};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tracing::{debug, info};

/// Linear gain stage fed through its own mailbox
struct GainStage {
    slot: SlotReader<f32>,
    factor: f32,
}

impl GainStage {
    fn new(db: f32) -> (Self, SlotWriter<f32>) {
        let (writer, slot) = pending_update_slot(db);
        let stage = Self {
            slot,
            factor: db_to_gain(db),
        };
        (stage, writer)
    }

    #[inline]
    fn poll(&mut self) {
        if let Some(db) = self.slot.drain_if_dirty() {
            self.factor = db_to_gain(db);
        }
    }

    #[inline]
    fn apply(&self, buffer: &mut [f32]) {
        if self.factor == 1.0 {
            return;
        }
        for sample in buffer.iter_mut() {
            *sample *= self.factor;
        }
    }
}

/// Audio-thread side of the equalizer
pub struct FilterChain {
    bands: Vec<FilterBand>,
    pre_gain: GainStage,
    post_gain: GainStage,
    channels: usize,
    sample_rate: f64,
    /// Sample rate as `f64` bits, read by the controller for response curves
    published_rate: Arc<AtomicU64>,
}

impl FilterChain {
    /// Build a chain and its control handle from a validated configuration
    ///
    /// Bands start in the initial layout: spread-out peaks, bypassed, not
    /// placed. All allocation happens here.
    pub fn new(config: &EngineConfig) -> Result<(Self, ChainController)> {
        config
            .validate()
            .map_err(|e| EngineError::InvalidConfiguration(e.to_string()))?;

        let sample_rate = f64::from(config.sample_rate);
        let (bands, controllers): (Vec<_>, Vec<_>) = (0..config.band_count)
            .map(|i| FilterBand::new(i, BandParams::initial(i), sample_rate, config.channels))
            .unzip();

        let pre_db = config.clamped_pre_gain_db();
        let post_db = config.clamped_post_gain_db();
        let (pre_gain, pre_writer) = GainStage::new(pre_db);
        let (post_gain, post_writer) = GainStage::new(post_db);

        let published_rate = Arc::new(AtomicU64::new(sample_rate.to_bits()));

        info!(
            bands = config.band_count,
            channels = config.channels,
            sample_rate,
            "Filter chain created"
        );

        let chain = Self {
            bands,
            pre_gain,
            post_gain,
            channels: config.channels,
            sample_rate,
            published_rate: Arc::clone(&published_rate),
        };
        let controller = ChainController {
            bands: controllers,
            pre_writer,
            post_writer,
            pre_gain_db: pre_db,
            post_gain_db: post_db,
            sample_rate: published_rate,
        };
        Ok((chain, controller))
    }

    /// Process one interleaved block in place
    ///
    /// Every pending update is applied before the first sample is touched,
    /// so the whole block runs with one parameter set. Bands that are not
    /// engaged never write into the buffer.
    pub fn process(&mut self, buffer: &mut [f32]) {
        self.pre_gain.poll();
        self.post_gain.poll();
        for band in &mut self.bands {
            band.poll_update();
        }

        self.pre_gain.apply(buffer);
        for band in &mut self.bands {
            if band.is_engaged() {
                band.process_buffer(buffer);
            }
        }
        self.post_gain.apply(buffer);
    }

    /// Stream setup: rebuild every band for the new stream and clear history
    pub fn prepare(&mut self, spec: &StreamSpec) -> Result<()> {
        spec.validate()?;

        self.sample_rate = f64::from(spec.sample_rate.hz());
        self.channels = spec.channels;
        for band in &mut self.bands {
            band.prepare(self.sample_rate, self.channels);
        }
        self.pre_gain.poll();
        self.post_gain.poll();

        self.published_rate
            .store(self.sample_rate.to_bits(), Ordering::Release);

        info!(
            sample_rate = self.sample_rate,
            block_size = spec.block_size,
            channels = self.channels,
            "Filter chain prepared"
        );
        Ok(())
    }

    /// Clear filter history on every band
    pub fn reset(&mut self) {
        for band in &mut self.bands {
            band.reset();
        }
    }

    pub fn band_count(&self) -> usize {
        self.bands.len()
    }

    pub fn channels(&self) -> usize {
        self.channels
    }

    pub fn sample_rate(&self) -> f64 {
        self.sample_rate
    }

    /// Number of bands currently filtering audio
    pub fn engaged_bands(&self) -> usize {
        self.bands.iter().filter(|b| b.is_engaged()).count()
    }
}

/// Control-path side of the equalizer
///
/// Setters never block and never touch audio-thread state directly; each one
/// publishes a whole record that the next callback picks up.
pub struct ChainController {
    bands: Vec<BandController>,
    pre_writer: SlotWriter<f32>,
    post_writer: SlotWriter<f32>,
    pre_gain_db: f32,
    post_gain_db: f32,
    sample_rate: Arc<AtomicU64>,
}

impl ChainController {
    pub fn band_count(&self) -> usize {
        self.bands.len()
    }

    fn band_ref(&self, index: usize) -> Result<&BandController> {
        let count = self.bands.len();
        self.bands
            .get(index)
            .ok_or(EngineError::BandOutOfRange { index, count })
    }

    fn band_mut(&mut self, index: usize) -> Result<&mut BandController> {
        let count = self.bands.len();
        self.bands
            .get_mut(index)
            .ok_or(EngineError::BandOutOfRange { index, count })
    }

    /// Publish a full band record, clamped to the declared domains
    pub fn set_band(&mut self, index: usize, params: BandParams) -> Result<()> {
        let band = self.band_mut(index)?;
        band.set(params);
        debug!(band = index, params = ?band.params(), "Band updated");
        Ok(())
    }

    /// Change one field of a band and publish the whole record
    pub fn set_band_field(&mut self, index: usize, field: BandField, value: f32) -> Result<()> {
        let band = self.band_mut(index)?;
        band.set_field(field, value);
        debug!(band = index, ?field, value, "Band field updated");
        Ok(())
    }

    /// Return a band to its unplaced, bypassed state
    pub fn reset_band(&mut self, index: usize) -> Result<()> {
        self.band_mut(index)?.reset();
        debug!(band = index, "Band reset");
        Ok(())
    }

    /// The control path's current record for a band
    pub fn band(&self, index: usize) -> Result<BandParams> {
        Ok(self.band_ref(index)?.params())
    }

    pub fn is_band_active(&self, index: usize) -> Result<bool> {
        Ok(self.band_ref(index)?.is_active())
    }

    /// Last coefficients the audio thread applied to a band
    pub fn mirror_coefficients(&self, index: usize) -> Result<MirrorSnapshot> {
        Ok(self.band_ref(index)?.mirror_coefficients())
    }

    /// Mirror handle for a visualization thread
    pub fn mirror(&self, index: usize) -> Result<MirrorReader> {
        Ok(self.band_ref(index)?.mirror())
    }

    /// Set the pre-gain, clamped to the gain stage range
    pub fn set_pre_gain_db(&mut self, db: f32) {
        self.pre_gain_db = clamp_stage(db);
        self.pre_writer.write(self.pre_gain_db);
        debug!(db = self.pre_gain_db, "Pre-gain updated");
    }

    /// Set the post-gain, clamped to the gain stage range
    pub fn set_post_gain_db(&mut self, db: f32) {
        self.post_gain_db = clamp_stage(db);
        self.post_writer.write(self.post_gain_db);
        debug!(db = self.post_gain_db, "Post-gain updated");
    }

    pub fn pre_gain_db(&self) -> f32 {
        self.pre_gain_db
    }

    pub fn post_gain_db(&self) -> f32 {
        self.post_gain_db
    }

    /// Sample rate published by the last stream setup
    pub fn sample_rate(&self) -> f64 {
        f64::from_bits(self.sample_rate.load(Ordering::Acquire))
    }

    /// Aggregate band response in dB at `frequency`
    ///
    /// Built from the mirrors, so it reflects what the audio thread last
    /// applied. Gain stages are not included.
    pub fn response_db(&self, frequency: f64) -> f64 {
        let sample_rate = self.sample_rate();
        let magnitude: f64 = self
            .bands
            .iter()
            .map(BandController::mirror_coefficients)
            .filter(|snapshot| snapshot.engaged)
            .map(|snapshot| snapshot.coeffs.magnitude_at(frequency, sample_rate))
            .product();

        if magnitude > 0.0 {
            (20.0 * magnitude.log10()).max(f64::from(GAIN_FLOOR_DB))
        } else {
            f64::from(GAIN_FLOOR_DB)
        }
    }

    /// Response at `points` log-spaced frequencies across 20 Hz..20 kHz
    ///
    /// Returns `(frequency, dB)` pairs in ascending frequency.
    pub fn response_curve(&self, points: usize) -> Vec<(f64, f64)> {
        let last = points.saturating_sub(1).max(1) as f32;
        (0..points)
            .map(|i| {
                let frequency = f64::from(normalized_to_frequency(i as f32 / last));
                (frequency, self.response_db(frequency))
            })
            .collect()
    }
}

impl std::fmt::Debug for ChainController {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ChainController")
            .field("bands", &self.bands)
            .field("pre_gain_db", &self.pre_gain_db)
            .field("post_gain_db", &self.post_gain_db)
            .finish()
    }
}

fn clamp_stage(db: f32) -> f32 {
    if db.is_nan() {
        0.0
    } else {
        db.clamp(ranges::STAGE_DB_MIN, ranges::STAGE_DB_MAX)
    }
}
