//! Command-line arguments

use clap::{Args, Parser, Subcommand};
use parametrix_core::domain::{AnalyzerTap, BandParams, FilterKind, MAX_BANDS};
use std::path::PathBuf;
use std::str::FromStr;

#[derive(Parser)]
#[command(name = "parametrix")]
#[command(about = "Real-time parametric equalizer engine", long_about = None)]
pub struct Cli {
    /// Enable verbose logging
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Engine configuration file (defaults to the user config directory)
    #[arg(short, long, global = true)]
    pub config: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand)]
pub enum Command {
    /// Print the aggregate frequency response of a band setup
    Response(ResponseArgs),

    /// Run the engine on a generated signal and report the analyzer output
    Run(RunArgs),

    /// Print the effective configuration, or write it to a file
    Config {
        /// Write the configuration here instead of printing it
        #[arg(long)]
        write: Option<PathBuf>,
    },
}

#[derive(Args)]
pub struct EqArgs {
    /// Band as `index:kind:frequency:gain_db:q`, e.g. `0:peak:200:6:1`
    #[arg(short, long = "band", value_name = "BAND")]
    pub bands: Vec<BandArg>,

    /// Pre-gain in dB
    #[arg(long, allow_hyphen_values = true)]
    pub pre_gain: Option<f32>,

    /// Post-gain in dB
    #[arg(long, allow_hyphen_values = true)]
    pub post_gain: Option<f32>,

    /// Emit JSON instead of text
    #[arg(long)]
    pub json: bool,
}

#[derive(Args)]
pub struct ResponseArgs {
    #[command(flatten)]
    pub eq: EqArgs,

    /// Number of log-spaced points between 20 Hz and 20 kHz
    #[arg(short, long, default_value_t = 32)]
    pub points: usize,
}

#[derive(Args)]
pub struct RunArgs {
    #[command(flatten)]
    pub eq: EqArgs,

    /// Seconds of audio to process
    #[arg(short, long, default_value_t = 2.0)]
    pub seconds: f32,

    /// Test tone frequency in Hz; repeat for several tones
    #[arg(short, long = "tone", default_value = "1000")]
    pub tones: Vec<f32>,

    /// Analyzer tap, overriding the configuration (`off`, `pre`, `post`)
    #[arg(long)]
    pub tap: Option<AnalyzerTap>,

    /// Process as fast as possible instead of pacing blocks in real time
    #[arg(long)]
    pub fast: bool,
}

/// One `--band` argument
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BandArg {
    pub index: usize,
    pub params: BandParams,
}

impl FromStr for BandArg {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let parts: Vec<&str> = s.split(':').collect();
        let [index, kind, frequency, gain_db, quality] = parts.as_slice() else {
            return Err(format!(
                "expected index:kind:frequency:gain_db:q, got '{s}'"
            ));
        };

        let index: usize = index
            .parse()
            .map_err(|_| format!("invalid band index '{index}'"))?;
        if index >= MAX_BANDS {
            return Err(format!("band index {index} must be below {MAX_BANDS}"));
        }

        let kind: FilterKind = kind.parse()?;
        let number = |name: &str, value: &str| {
            value
                .parse::<f32>()
                .map_err(|_| format!("invalid {name} '{value}'"))
        };

        Ok(Self {
            index,
            params: BandParams::placed(
                kind,
                number("frequency", *frequency)?,
                number("gain", *gain_db)?,
                number("q", *quality)?,
            ),
        })
    }
}
