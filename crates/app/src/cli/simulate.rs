//! Offline engine run: a paced audio thread plus a visualization cadence

use anyhow::{anyhow, Context};
use parametrix_core::domain::{gain_to_db, EngineConfig};
use parametrix_infra::audio::{AudioEngine, EngineHandle, SpectrumEngine};
use serde::Serialize;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};

/// What a run observed
#[derive(Debug, Serialize)]
pub struct RunReport {
    pub sample_rate: u32,
    pub blocks: u64,
    pub frames_analyzed: u64,
    pub input_rms_db: f32,
    pub output_rms_db: f32,
    pub peak_frequency_hz: Option<f32>,
    pub peak_level_db: Option<f32>,
    pub response_at_tones: Vec<ToneResponse>,
}

#[derive(Debug, Serialize)]
pub struct ToneResponse {
    pub frequency_hz: f32,
    pub response_db: f64,
}

/// Sum of equal-amplitude sines, phase-continuous across blocks
struct ToneGenerator {
    steps: Vec<f32>,
    phases: Vec<f32>,
    amplitude: f32,
}

impl ToneGenerator {
    fn new(tones: &[f32], sample_rate: f32) -> Self {
        let steps = tones
            .iter()
            .map(|f| std::f32::consts::TAU * f / sample_rate)
            .collect();
        Self {
            steps,
            phases: vec![0.0; tones.len()],
            amplitude: 0.5 / tones.len().max(1) as f32,
        }
    }

    fn fill(&mut self, buffer: &mut [f32], channels: usize) {
        for frame in buffer.chunks_exact_mut(channels) {
            let mut sample = 0.0;
            for (phase, step) in self.phases.iter_mut().zip(&self.steps) {
                sample += phase.sin();
                *phase = (*phase + step) % std::f32::consts::TAU;
            }
            frame.fill(sample * self.amplitude);
        }
    }
}

#[derive(Default)]
struct Levels {
    input_energy: AtomicU64,
    output_energy: AtomicU64,
    samples: AtomicU64,
    blocks: AtomicU64,
}

/// RMS level in dB of `samples` samples summing to `energy`
fn energy_db(energy: f64, samples: u64) -> f32 {
    if samples == 0 {
        return gain_to_db(0.0);
    }
    gain_to_db((energy / samples as f64).sqrt() as f32)
}

/// Run `engine` for `seconds` of generated audio
///
/// The audio thread owns the engine; this task keeps the control handle and
/// drives the spectrum at the configured refresh rate.
pub async fn run(
    config: &EngineConfig,
    mut engine: AudioEngine,
    handle: EngineHandle,
    mut spectrum: SpectrumEngine,
    tones: &[f32],
    seconds: f32,
    paced: bool,
) -> anyhow::Result<RunReport> {
    let spec = config.stream_spec();
    engine
        .prepare(spec)
        .context("Failed to prepare audio engine")?;

    let total_blocks = ((seconds.max(0.0) * spec.sample_rate.as_f32()) / spec.block_size as f32)
        .ceil() as u64;
    let block_period = Duration::from_secs_f64(f64::from(spec.block_size) / f64::from(spec.sample_rate.hz()));

    let stop = Arc::new(AtomicBool::new(false));
    let levels = Arc::new(Levels::default());

    info!(
        seconds,
        blocks = total_blocks,
        tones = ?tones,
        paced,
        "Starting audio thread"
    );

    let audio_stop = Arc::clone(&stop);
    let audio_levels = Arc::clone(&levels);
    let mut generator = ToneGenerator::new(tones, spec.sample_rate.as_f32());
    let audio = thread::Builder::new()
        .name("parametrix-audio".to_string())
        .spawn(move || {
            let mut buffer = vec![0.0_f32; spec.block_samples()];
            let started = Instant::now();
            let mut input_energy = 0.0_f64;
            let mut output_energy = 0.0_f64;

            for block in 0..total_blocks {
                if audio_stop.load(Ordering::Relaxed) {
                    break;
                }
                generator.fill(&mut buffer, spec.channels);
                input_energy += buffer.iter().map(|&s| f64::from(s * s)).sum::<f64>();

                engine.process(&mut buffer);

                output_energy += buffer.iter().map(|&s| f64::from(s * s)).sum::<f64>();
                audio_levels.blocks.store(block + 1, Ordering::Relaxed);

                if paced {
                    let due = block_period * (block as u32 + 1);
                    if let Some(wait) = due.checked_sub(started.elapsed()) {
                        thread::sleep(wait);
                    }
                }
            }

            let blocks = audio_levels.blocks.load(Ordering::Relaxed);
            audio_levels
                .input_energy
                .store(input_energy.to_bits(), Ordering::Relaxed);
            audio_levels
                .output_energy
                .store(output_energy.to_bits(), Ordering::Relaxed);
            audio_levels
                .samples
                .store(blocks * buffer.len() as u64, Ordering::Relaxed);

            audio_stop.store(true, Ordering::Release);
            engine
        })
        .context("Failed to spawn audio thread")?;

    let refresh = Duration::from_secs_f32(1.0 / config.analyzer.refresh_hz);
    let mut interval = tokio::time::interval(refresh);
    let mut peak: Option<(f32, f32)> = None;

    loop {
        tokio::select! {
            _ = interval.tick() => {
                if spectrum.consume_and_analyze() {
                    peak = strongest_bin(&spectrum).or(peak);
                    if let Some((frequency, level)) = peak {
                        debug!(frequency, level, frame = spectrum.frames_analyzed(), "Spectrum frame");
                    }
                }
                if stop.load(Ordering::Acquire) && audio.is_finished() {
                    break;
                }
            }
            _ = tokio::signal::ctrl_c() => {
                warn!("Interrupted, stopping audio thread");
                stop.store(true, Ordering::Release);
            }
        }
    }

    let mut engine = audio
        .join()
        .map_err(|_| anyhow!("Audio thread panicked"))?;

    // Whatever the cadence missed at the end, then teardown
    while spectrum.consume_and_analyze() {
        peak = strongest_bin(&spectrum).or(peak);
    }
    engine.release();

    let samples = levels.samples.load(Ordering::Relaxed);
    let report = RunReport {
        sample_rate: spec.sample_rate.hz(),
        blocks: levels.blocks.load(Ordering::Relaxed),
        frames_analyzed: spectrum.frames_analyzed(),
        input_rms_db: energy_db(f64::from_bits(levels.input_energy.load(Ordering::Relaxed)), samples),
        output_rms_db: energy_db(f64::from_bits(levels.output_energy.load(Ordering::Relaxed)), samples),
        peak_frequency_hz: peak.map(|(f, _)| f),
        peak_level_db: peak.map(|(_, l)| l),
        response_at_tones: tones
            .iter()
            .map(|&frequency_hz| ToneResponse {
                frequency_hz,
                response_db: handle.chain().response_db(f64::from(frequency_hz)),
            })
            .collect(),
    };

    info!(
        blocks = report.blocks,
        frames = report.frames_analyzed,
        "Run finished"
    );
    Ok(report)
}

/// Frequency and level of the loudest display bin above the floor
fn strongest_bin(spectrum: &SpectrumEngine) -> Option<(f32, f32)> {
    let (floor, _) = spectrum.db_range();
    spectrum
        .levels_db()
        .iter()
        .enumerate()
        .filter(|(_, level)| **level > floor)
        .max_by(|a, b| a.1.total_cmp(b.1))
        .map(|(i, &level)| (spectrum.bin_frequency(i), level))
}
