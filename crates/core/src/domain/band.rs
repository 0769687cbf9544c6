//! Band parameter model
//!
//! A band is described by one small `Copy` record. The control path edits its
//! own copy and publishes the whole record at once; the audio thread never
//! sees individual fields change.

use serde::{Deserialize, Serialize};

/// Maximum number of bands a chain can hold
pub const MAX_BANDS: usize = 12;

/// Declared parameter domains
///
/// Values are clamped to these ranges at the control boundary. Nothing on the
/// audio thread revalidates them.
pub mod ranges {
    pub const FREQ_MIN: f32 = 20.0;
    pub const FREQ_MAX: f32 = 20000.0;

    pub const GAIN_DB_MIN: f32 = -72.0;
    pub const GAIN_DB_MAX: f32 = 12.0;

    pub const QUALITY_MIN: f32 = 0.1;
    pub const QUALITY_MAX: f32 = 10.0;
    /// Step the quality control snaps to
    pub const QUALITY_STEP: f32 = 0.05;

    /// Quality a deleted band is parked at: 0.1 of the way up the control,
    /// snapped to [`QUALITY_STEP`]
    pub const RESET_QUALITY: f32 = 1.1;

    /// Pre/post gain stage range
    pub const STAGE_DB_MIN: f32 = -24.0;
    pub const STAGE_DB_MAX: f32 = 24.0;
}

/// Filter response shape of a band
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FilterKind {
    #[default]
    Peak,
    HighPass,
    LowPass,
    HighShelf,
    LowShelf,
}

impl FilterKind {
    pub const ALL: [FilterKind; 5] = [
        FilterKind::Peak,
        FilterKind::HighPass,
        FilterKind::LowPass,
        FilterKind::HighShelf,
        FilterKind::LowShelf,
    ];

    /// Kind for a choice index, out-of-range indices clamp to the last kind
    pub fn from_index(index: usize) -> Self {
        Self::ALL[index.min(Self::ALL.len() - 1)]
    }

    pub fn index(self) -> usize {
        self as usize
    }

    /// Whether the gain parameter shapes the response
    pub fn uses_gain(self) -> bool {
        matches!(
            self,
            FilterKind::Peak | FilterKind::HighShelf | FilterKind::LowShelf
        )
    }

    pub fn name(self) -> &'static str {
        match self {
            FilterKind::Peak => "peak",
            FilterKind::HighPass => "high_pass",
            FilterKind::LowPass => "low_pass",
            FilterKind::HighShelf => "high_shelf",
            FilterKind::LowShelf => "low_shelf",
        }
    }
}

impl std::str::FromStr for FilterKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().replace('-', "_").as_str() {
            "peak" | "bell" => Ok(FilterKind::Peak),
            "high_pass" | "highpass" | "hp" | "low_cut" => Ok(FilterKind::HighPass),
            "low_pass" | "lowpass" | "lp" | "high_cut" => Ok(FilterKind::LowPass),
            "high_shelf" | "highshelf" | "hs" => Ok(FilterKind::HighShelf),
            "low_shelf" | "lowshelf" | "ls" => Ok(FilterKind::LowShelf),
            other => Err(format!("unknown filter kind '{other}'")),
        }
    }
}

/// Individually addressable field of a band
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BandField {
    Frequency,
    GainDb,
    Quality,
    Kind,
    Bypassed,
    Active,
}

/// Full parameter record of one band
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct BandParams {
    pub frequency: f32,
    pub gain_db: f32,
    pub quality: f32,
    pub kind: FilterKind,
    pub bypassed: bool,
    /// Placed by the control path; an inactive band behaves as if absent
    pub active: bool,
}

impl Default for BandParams {
    fn default() -> Self {
        Self::initial(0)
    }
}

impl BandParams {
    /// Layout a freshly constructed chain starts with: spread-out peaks, all
    /// bypassed and not yet placed
    pub fn initial(index: usize) -> Self {
        Self {
            frequency: (500.0 + 500.0 * index as f32).min(ranges::FREQ_MAX),
            gain_db: 0.0,
            quality: 1.0,
            kind: FilterKind::Peak,
            bypassed: true,
            active: false,
        }
    }

    /// An active, non-bypassed band
    pub fn placed(kind: FilterKind, frequency: f32, gain_db: f32, quality: f32) -> Self {
        Self {
            frequency,
            gain_db,
            quality,
            kind,
            bypassed: false,
            active: true,
        }
    }

    /// Whether the band alters the signal at all
    pub fn is_engaged(&self) -> bool {
        self.active && !self.bypassed
    }

    /// Clamp every numeric field to its declared domain
    pub fn clamped(mut self) -> Self {
        self.frequency = clamp_or(self.frequency, ranges::FREQ_MIN, ranges::FREQ_MAX);
        self.gain_db = clamp_or(self.gain_db, ranges::GAIN_DB_MIN, ranges::GAIN_DB_MAX);
        self.quality = clamp_or(self.quality, ranges::QUALITY_MIN, ranges::QUALITY_MAX);
        self
    }

    /// Replace one field, keeping the rest
    ///
    /// Booleans are on when `value >= 0.5`; kinds take the rounded choice index.
    pub fn with_field(mut self, field: BandField, value: f32) -> Self {
        match field {
            BandField::Frequency => self.frequency = value,
            BandField::GainDb => self.gain_db = value,
            BandField::Quality => self.quality = value,
            BandField::Kind => self.kind = FilterKind::from_index(value.max(0.0).round() as usize),
            BandField::Bypassed => self.bypassed = value >= 0.5,
            BandField::Active => self.active = value >= 0.5,
        }
        self.clamped()
    }

    /// Read one field as a plain number
    pub fn field(&self, field: BandField) -> f32 {
        match field {
            BandField::Frequency => self.frequency,
            BandField::GainDb => self.gain_db,
            BandField::Quality => self.quality,
            BandField::Kind => self.kind.index() as f32,
            BandField::Bypassed => f32::from(u8::from(self.bypassed)),
            BandField::Active => f32::from(u8::from(self.active)),
        }
    }

    /// The record a band is returned to when the user deletes it
    ///
    /// Position (frequency and gain) is kept so a later placement starts there.
    pub fn reset(self) -> Self {
        Self {
            quality: ranges::RESET_QUALITY,
            kind: FilterKind::Peak,
            bypassed: true,
            active: false,
            ..self
        }
    }
}

// NaN falls back to the lower bound so a bad control value can't reach the filter
fn clamp_or(value: f32, min: f32, max: f32) -> f32 {
    if value.is_nan() {
        min
    } else {
        value.clamp(min, max)
    }
}

/// Map a frequency onto [0, 1] logarithmically across the audible range
pub fn frequency_to_normalized(frequency: f32) -> f32 {
    let span = (ranges::FREQ_MAX / ranges::FREQ_MIN).ln();
    ((frequency / ranges::FREQ_MIN).ln() / span).clamp(0.0, 1.0)
}

/// Inverse of [`frequency_to_normalized`]
pub fn normalized_to_frequency(normalized: f32) -> f32 {
    let span = (ranges::FREQ_MAX / ranges::FREQ_MIN).ln();
    ranges::FREQ_MIN * (normalized.clamp(0.0, 1.0) * span).exp()
}
