//! Parametrix CLI Application

mod args;
mod simulate;

use anyhow::{anyhow, Context};
use args::{Cli, Command, EqArgs, ResponseArgs, RunArgs};
use clap::Parser;
use parametrix_core::domain::{frequency_to_normalized, EngineConfig};
use parametrix_infra::audio::{AudioEngine, EngineHandle};
use serde::Serialize;
use std::path::PathBuf;
use tracing::{info, warn};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let fallback = if cli.verbose { "debug" } else { "info" };
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(fallback)),
        )
        .with_writer(std::io::stderr)
        .init();

    info!("Parametrix starting...");

    let config_path = match cli.config {
        Some(path) => path,
        None => default_config_path()?,
    };
    let config = EngineConfig::load_or_default(&config_path)
        .await
        .with_context(|| format!("Failed to load {}", config_path.display()))?;

    match cli.command {
        Command::Response(args) => response(&config, args),
        Command::Run(args) => run(config, args).await,
        Command::Config { write } => match write {
            Some(path) => {
                config
                    .save_to_file(&path)
                    .await
                    .with_context(|| format!("Failed to write {}", path.display()))?;
                println!("Configuration written to {}", path.display());
                Ok(())
            }
            None => {
                print!("{}", toml::to_string_pretty(&config)?);
                Ok(())
            }
        },
    }
}

/// `~/.config/parametrix/engine.toml` on Linux, the platform equivalent elsewhere
fn default_config_path() -> anyhow::Result<PathBuf> {
    dirs::config_dir()
        .map(|p| p.join("parametrix").join("engine.toml"))
        .ok_or_else(|| anyhow!("Could not determine config directory"))
}

fn apply_eq(handle: &mut EngineHandle, eq: &EqArgs) -> anyhow::Result<()> {
    let chain = handle.chain_mut();
    for band in &eq.bands {
        if !band.params.kind.uses_gain() && band.params.gain_db != 0.0 {
            warn!(
                band = band.index,
                kind = band.params.kind.name(),
                gain_db = band.params.gain_db,
                "Gain has no effect on this filter kind"
            );
        }
        chain
            .set_band(band.index, band.params)
            .with_context(|| format!("Cannot place band {}", band.index))?;
    }
    if let Some(db) = eq.pre_gain {
        chain.set_pre_gain_db(db);
    }
    if let Some(db) = eq.post_gain {
        chain.set_post_gain_db(db);
    }
    Ok(())
}

#[derive(Serialize)]
struct ResponsePoint {
    frequency_hz: f64,
    /// Position on a 20 Hz..20 kHz log axis, 0 to 1
    position: f32,
    response_db: f64,
}

fn response(config: &EngineConfig, args: ResponseArgs) -> anyhow::Result<()> {
    let (mut engine, mut handle, _spectrum) = AudioEngine::build(config)?;
    apply_eq(&mut handle, &args.eq)?;

    // One silent block lets the audio side apply the bands and publish mirrors
    let mut block = vec![0.0_f32; config.stream_spec().block_samples()];
    engine.process(&mut block);

    let curve: Vec<ResponsePoint> = handle
        .chain()
        .response_curve(args.points)
        .into_iter()
        .map(|(frequency_hz, response_db)| ResponsePoint {
            frequency_hz,
            position: frequency_to_normalized(frequency_hz as f32),
            response_db,
        })
        .collect();

    if args.eq.json {
        println!("{}", serde_json::to_string_pretty(&curve)?);
    } else {
        println!("{:>10}  {:>6}  {:>8}", "Hz", "pos", "dB");
        for point in &curve {
            println!(
                "{:>10.1}  {:>6.3}  {:>+8.2}",
                point.frequency_hz, point.position, point.response_db
            );
        }
    }
    Ok(())
}

async fn run(mut config: EngineConfig, args: RunArgs) -> anyhow::Result<()> {
    if let Some(tap) = args.tap {
        config.analyzer.tap = tap;
    }

    let (engine, mut handle, spectrum) = AudioEngine::build(&config)?;
    apply_eq(&mut handle, &args.eq)?;

    let report = simulate::run(
        &config,
        engine,
        handle,
        spectrum,
        &args.tones,
        args.seconds,
        !args.fast,
    )
    .await?;

    if args.eq.json {
        println!("{}", serde_json::to_string_pretty(&report)?);
    } else {
        println!("Processed {} blocks at {} Hz", report.blocks, report.sample_rate);
        println!(
            "RMS in {:+.2} dB, out {:+.2} dB",
            report.input_rms_db, report.output_rms_db
        );
        match (report.peak_frequency_hz, report.peak_level_db) {
            (Some(frequency), Some(level)) => println!(
                "Spectrum peak {frequency:.1} Hz at {level:+.1} dB over {} frames",
                report.frames_analyzed
            ),
            _ => println!("Spectrum produced no frames"),
        }
        for tone in &report.response_at_tones {
            println!(
                "EQ response at {:.1} Hz: {:+.2} dB",
                tone.frequency_hz, tone.response_db
            );
        }
    }
    Ok(())
}
