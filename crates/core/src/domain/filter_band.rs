//! One equalizer band: live filter, pending-update mailbox and mirror
//!
//! A band is created as two halves. [`FilterBand`] lives on the audio thread
//! and is the only thing that touches the live biquad. [`BandController`]
//! lives on the control path, publishes parameter records and reads back the
//! mirror for drawing.

use crate::domain::band::{BandField, BandParams};
use crate::domain::dsp::{compute_coefficients, BiquadFilter};
use crate::domain::mailbox::{pending_update_slot, SlotReader, SlotWriter};
use crate::domain::mirror::{coefficient_mirror, MirrorPublisher, MirrorReader, MirrorSnapshot};
use tracing::debug;

/// Audio-thread half of a band
pub struct FilterBand {
    index: usize,
    filter: BiquadFilter,
    slot: SlotReader<BandParams>,
    mirror: MirrorPublisher,
    /// Record the live coefficients were built from
    applied: BandParams,
    sample_rate: f64,
    channels: usize,
}

impl FilterBand {
    /// Create band `index` with its control handle
    ///
    /// The mailbox starts dirty, so the first [`FilterBand::poll_update`]
    /// builds coefficients from `initial`.
    pub fn new(
        index: usize,
        initial: BandParams,
        sample_rate: f64,
        channels: usize,
    ) -> (Self, BandController) {
        let initial = initial.clamped();
        let coeffs = compute_coefficients(&initial, sample_rate);
        let (writer, reader) = pending_update_slot(initial);
        let (publisher, mirror_reader) = coefficient_mirror(MirrorSnapshot {
            coeffs,
            engaged: initial.is_engaged(),
        });

        let band = Self {
            index,
            filter: BiquadFilter::new(coeffs),
            slot: reader,
            mirror: publisher,
            applied: initial,
            sample_rate,
            channels,
        };
        let controller = BandController {
            index,
            writer,
            current: initial,
            mirror: mirror_reader,
        };
        (band, controller)
    }

    pub fn index(&self) -> usize {
        self.index
    }

    /// Apply the latest control-path record, if any
    ///
    /// Audio thread only. Returns whether coefficients were rebuilt.
    pub fn poll_update(&mut self) -> bool {
        match self.slot.drain_if_dirty() {
            Some(params) => {
                self.apply(params);
                true
            }
            None => false,
        }
    }

    fn apply(&mut self, params: BandParams) {
        let was_engaged = self.applied.is_engaged();
        self.applied = params;

        let coeffs = compute_coefficients(&params, self.sample_rate);
        self.filter.set_coeffs(coeffs);
        // History from before the band was placed would ring into the new shape
        if !was_engaged && params.is_engaged() {
            self.filter.reset();
        }

        self.mirror.publish(MirrorSnapshot {
            coeffs,
            engaged: params.is_engaged(),
        });
    }

    /// Filter an interleaved buffer in place with the live coefficients
    ///
    /// Audio thread only. Callers skip disengaged bands.
    pub fn process_buffer(&mut self, buffer: &mut [f32]) {
        self.filter.process_interleaved(buffer, self.channels);
    }

    /// Whether the applied record is active and not bypassed
    pub fn is_engaged(&self) -> bool {
        self.applied.is_engaged()
    }

    pub fn applied_params(&self) -> BandParams {
        self.applied
    }

    /// Stream setup: rebuild for a new sample rate and clear history
    pub fn prepare(&mut self, sample_rate: f64, channels: usize) {
        self.sample_rate = sample_rate;
        self.channels = channels;
        self.filter.reset();

        let params = self.slot.drain_if_dirty().unwrap_or(self.applied);
        self.apply(params);
        debug!(
            band = self.index,
            sample_rate,
            engaged = params.is_engaged(),
            "Band prepared"
        );
    }

    /// Clear filter history without touching coefficients
    pub fn reset(&mut self) {
        self.filter.reset();
    }
}

/// Control-path half of a band
///
/// Keeps the control path's own copy of the record, so field-level edits and
/// "is this band active" queries never read audio-thread state.
pub struct BandController {
    index: usize,
    writer: SlotWriter<BandParams>,
    current: BandParams,
    mirror: MirrorReader,
}

impl BandController {
    pub fn index(&self) -> usize {
        self.index
    }

    /// Publish a full record, clamped to the declared domains
    pub fn set(&mut self, params: BandParams) {
        self.current = params.clamped();
        self.writer.write(self.current);
    }

    /// Change one field and publish the whole record
    pub fn set_field(&mut self, field: BandField, value: f32) {
        self.set(self.current.with_field(field, value));
    }

    /// Return the band to its unplaced state
    pub fn reset(&mut self) {
        self.set(self.current.reset());
    }

    /// The latest record written by the control path
    pub fn params(&self) -> BandParams {
        self.current
    }

    pub fn is_active(&self) -> bool {
        self.current.active
    }

    /// Last coefficients the audio thread applied
    pub fn mirror_coefficients(&self) -> MirrorSnapshot {
        self.mirror.load()
    }

    /// Mirror handle for another reader thread
    pub fn mirror(&self) -> MirrorReader {
        self.mirror.clone()
    }
}

impl std::fmt::Debug for BandController {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BandController")
            .field("index", &self.index)
            .field("current", &self.current)
            .finish()
    }
}
