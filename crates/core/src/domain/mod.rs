//! Domain entities and business rules

pub mod audio;
pub mod band;
pub mod chain;
pub mod config;
pub mod dsp;
pub mod filter_band;
pub mod mailbox;
pub mod mirror;

// Re-export specific items to avoid ambiguous glob imports
pub use audio::{EngineError, SampleRate, StreamSpec, MAX_CHANNELS};
pub use band::{
    frequency_to_normalized, normalized_to_frequency, ranges, BandField, BandParams, FilterKind,
    MAX_BANDS,
};
pub use chain::{ChainController, FilterChain};
pub use config::{AnalyzerConfig, AnalyzerTap, ConfigError, EngineConfig};
pub use dsp::{compute_coefficients, db_to_gain, gain_to_db, BiquadCoeffs, BiquadFilter};
pub use filter_band::{BandController, FilterBand};
pub use mailbox::{pending_update_slot, SlotReader, SlotWriter};
pub use mirror::{coefficient_mirror, MirrorPublisher, MirrorReader, MirrorSnapshot};
