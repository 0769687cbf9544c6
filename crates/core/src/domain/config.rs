//! Engine configuration
//!
//! This module provides:
//! - The stream, chain and analyzer settings an engine is built from
//! - Validation of those settings before anything real-time is allocated
//! - TOML load/save through `tokio::fs`

use crate::domain::audio::{SampleRate, StreamSpec, MAX_CHANNELS};
use crate::domain::band::{ranges, MAX_BANDS};
use serde::{Deserialize, Serialize};
use std::path::Path;
use thiserror::Error;
use tokio::fs;
use tracing::{debug, info, instrument, warn};

pub type Result<T> = std::result::Result<T, ConfigError>;

/// Errors that can occur during configuration operations
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("TOML parsing error: {0}")]
    TomlParse(#[from] toml::de::Error),

    #[error("TOML serialization error: {0}")]
    TomlSerialize(#[from] toml::ser::Error),

    #[error("Invalid configuration: {0}")]
    Invalid(String),
}

/// Where the analyzer takes its mono sum from
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AnalyzerTap {
    /// Analyzer disabled; nothing is pushed
    Off,
    /// Input, before pre-gain and bands
    PreEq,
    /// Output, after post-gain
    #[default]
    PostEq,
}

impl AnalyzerTap {
    pub fn as_u8(self) -> u8 {
        match self {
            AnalyzerTap::Off => 0,
            AnalyzerTap::PreEq => 1,
            AnalyzerTap::PostEq => 2,
        }
    }

    /// Unknown values read as `Off`
    pub fn from_u8(value: u8) -> Self {
        match value {
            1 => AnalyzerTap::PreEq,
            2 => AnalyzerTap::PostEq,
            _ => AnalyzerTap::Off,
        }
    }
}

impl std::str::FromStr for AnalyzerTap {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_ascii_lowercase().replace('-', "_").as_str() {
            "off" | "none" => Ok(AnalyzerTap::Off),
            "pre" | "pre_eq" => Ok(AnalyzerTap::PreEq),
            "post" | "post_eq" => Ok(AnalyzerTap::PostEq),
            other => Err(format!("unknown analyzer tap '{other}'")),
        }
    }
}

/// Spectrum analyzer settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AnalyzerConfig {
    pub tap: AnalyzerTap,

    /// Transform size is `2^fft_order`
    pub fft_order: u32,

    /// Number of display bins produced per frame
    pub display_bins: usize,

    /// Exponent of the logarithmic bin skew; smaller favours low frequencies
    pub skew_factor: f32,

    /// Display floor in dB
    pub min_db: f32,

    /// Display ceiling in dB
    pub max_db: f32,

    /// Visualization cadence in frames per second
    pub refresh_hz: f32,
}

impl Default for AnalyzerConfig {
    fn default() -> Self {
        Self {
            tap: AnalyzerTap::PostEq,
            fft_order: 11,
            display_bins: 512,
            skew_factor: 0.2,
            min_db: -100.0,
            max_db: 24.0,
            refresh_hz: 30.0,
        }
    }
}

impl AnalyzerConfig {
    pub const FFT_ORDER_MIN: u32 = 6;
    pub const FFT_ORDER_MAX: u32 = 15;

    pub fn fft_size(&self) -> usize {
        1 << self.fft_order
    }

    /// Queue capacity: two transform frames
    pub fn queue_capacity(&self) -> usize {
        self.fft_size() * 2
    }
}

/// Complete engine configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Initial stream sample rate in Hz
    pub sample_rate: u32,

    /// Frames per callback
    pub block_size: u32,

    /// Interleaved channel count
    pub channels: usize,

    /// Number of bands in the chain
    pub band_count: usize,

    /// Initial pre-gain in dB
    pub pre_gain_db: f32,

    /// Initial post-gain in dB
    pub post_gain_db: f32,

    pub analyzer: AnalyzerConfig,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            sample_rate: 48000,
            block_size: 512,
            channels: 2,
            band_count: MAX_BANDS,
            pre_gain_db: 0.0,
            post_gain_db: 0.0,
            analyzer: AnalyzerConfig::default(),
        }
    }
}

impl EngineConfig {
    /// Check every field against what the engine can run with
    pub fn validate(&self) -> Result<()> {
        if self.sample_rate == 0 {
            return Err(ConfigError::Invalid("sample rate must be positive".to_string()));
        }
        if self.block_size == 0 {
            return Err(ConfigError::Invalid("block size must be at least one frame".to_string()));
        }
        if self.channels == 0 || self.channels > MAX_CHANNELS {
            return Err(ConfigError::Invalid(format!(
                "channel count {} outside 1..={MAX_CHANNELS}",
                self.channels
            )));
        }
        if self.band_count == 0 || self.band_count > MAX_BANDS {
            return Err(ConfigError::Invalid(format!(
                "band count {} outside 1..={MAX_BANDS}",
                self.band_count
            )));
        }

        let analyzer = &self.analyzer;
        if !(AnalyzerConfig::FFT_ORDER_MIN..=AnalyzerConfig::FFT_ORDER_MAX)
            .contains(&analyzer.fft_order)
        {
            return Err(ConfigError::Invalid(format!(
                "fft order {} outside {}..={}",
                analyzer.fft_order,
                AnalyzerConfig::FFT_ORDER_MIN,
                AnalyzerConfig::FFT_ORDER_MAX
            )));
        }
        if analyzer.display_bins == 0 {
            return Err(ConfigError::Invalid("display bins must be positive".to_string()));
        }
        // Negated comparisons also catch NaN
        if !(analyzer.min_db < analyzer.max_db) {
            return Err(ConfigError::Invalid(format!(
                "min_db {} must be below max_db {}",
                analyzer.min_db, analyzer.max_db
            )));
        }
        if !(analyzer.skew_factor > 0.0) {
            return Err(ConfigError::Invalid("skew factor must be positive".to_string()));
        }
        if !(analyzer.refresh_hz > 0.0) {
            return Err(ConfigError::Invalid("refresh rate must be positive".to_string()));
        }

        Ok(())
    }

    /// Stream description for the initial setup
    pub fn stream_spec(&self) -> StreamSpec {
        StreamSpec {
            sample_rate: SampleRate::from_hz(self.sample_rate),
            block_size: self.block_size,
            channels: self.channels,
        }
    }

    /// Pre-gain clamped to the gain stage range
    pub fn clamped_pre_gain_db(&self) -> f32 {
        clamp_stage_db(self.pre_gain_db)
    }

    /// Post-gain clamped to the gain stage range
    pub fn clamped_post_gain_db(&self) -> f32 {
        clamp_stage_db(self.post_gain_db)
    }

    /// Load configuration from TOML file
    #[instrument(skip(path))]
    pub async fn load_from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        info!(path = %path.display(), "Loading configuration");

        let contents = fs::read_to_string(path).await?;
        let config: Self = toml::from_str(&contents)?;
        config.validate()?;

        debug!("Configuration loaded successfully");
        Ok(config)
    }

    /// Save configuration to TOML file
    #[instrument(skip(self, path))]
    pub async fn save_to_file<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let path = path.as_ref();
        info!(path = %path.display(), "Saving configuration");

        // Create parent directory if it doesn't exist
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).await?;
        }

        let toml_str = toml::to_string_pretty(self)?;
        fs::write(path, toml_str).await?;

        debug!("Configuration saved successfully");
        Ok(())
    }

    /// Load from `path`, falling back to defaults when the file is missing
    ///
    /// A file that exists but cannot be parsed or validated is an error.
    #[instrument(skip(path))]
    pub async fn load_or_default<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        if !fs::try_exists(path).await? {
            warn!(path = %path.display(), "Config file not found, using defaults");
            return Ok(Self::default());
        }
        Self::load_from_file(path).await
    }
}

fn clamp_stage_db(db: f32) -> f32 {
    if db.is_nan() {
        0.0
    } else {
        db.clamp(ranges::STAGE_DB_MIN, ranges::STAGE_DB_MAX)
    }
}
