//! Stream description and engine errors
//!
//! This module defines what the host hands the engine at stream setup and the
//! errors the control and setup paths can report. The audio callback itself
//! never returns an error.

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Highest interleaved channel count a filter band keeps state for
pub const MAX_CHANNELS: usize = 8;

/// Errors that can occur outside the audio callback
#[derive(Debug, Clone, Error, PartialEq)]
pub enum EngineError {
    /// Band index outside the chain's fixed capacity
    #[error("Band {index} out of range (chain has {count} bands)")]
    BandOutOfRange { index: usize, count: usize },

    /// Invalid configuration for the engine
    #[error("Invalid configuration: {0}")]
    InvalidConfiguration(String),

    /// Channel layout the filter state cannot hold
    #[error("Unsupported channel count: {0}")]
    UnsupportedChannelCount(usize),

    /// Sample rate that is zero, negative or not finite
    #[error("Invalid sample rate: {0}")]
    InvalidSampleRate(f32),
}

pub type Result<T> = std::result::Result<T, EngineError>;

/// Audio sample rate in Hz
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SampleRate {
    Hz44100,
    Hz48000,
    Hz96000,
    Hz192000,
    Custom(u32),
}

impl SampleRate {
    pub fn hz(&self) -> u32 {
        match self {
            SampleRate::Hz44100 => 44100,
            SampleRate::Hz48000 => 48000,
            SampleRate::Hz96000 => 96000,
            SampleRate::Hz192000 => 192000,
            SampleRate::Custom(hz) => *hz,
        }
    }

    pub fn from_hz(hz: u32) -> Self {
        match hz {
            44100 => SampleRate::Hz44100,
            48000 => SampleRate::Hz48000,
            96000 => SampleRate::Hz96000,
            192000 => SampleRate::Hz192000,
            hz => SampleRate::Custom(hz),
        }
    }

    pub fn as_f32(&self) -> f32 {
        self.hz() as f32
    }
}

/// What the host announces at stream setup
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct StreamSpec {
    pub sample_rate: SampleRate,
    /// Frames per callback
    pub block_size: u32,
    /// Interleaved channel count
    pub channels: usize,
}

impl Default for StreamSpec {
    fn default() -> Self {
        Self {
            sample_rate: SampleRate::Hz48000,
            block_size: 512,
            channels: 2,
        }
    }
}

impl StreamSpec {
    /// Reject setups the engine cannot run with
    pub fn validate(&self) -> Result<()> {
        if self.sample_rate.hz() == 0 {
            return Err(EngineError::InvalidSampleRate(0.0));
        }
        if self.channels == 0 || self.channels > MAX_CHANNELS {
            return Err(EngineError::UnsupportedChannelCount(self.channels));
        }
        if self.block_size == 0 {
            return Err(EngineError::InvalidConfiguration(
                "block size must be at least one frame".to_string(),
            ));
        }
        Ok(())
    }

    /// Samples in one interleaved block
    pub fn block_samples(&self) -> usize {
        self.block_size as usize * self.channels
    }
}
