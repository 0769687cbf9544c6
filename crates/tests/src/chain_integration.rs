//! Integration tests for the equalizer engine
//!
//! These tests drive the complete pipeline the way a host would: control
//! handle writes, audio callbacks through the engine, and the analyzer
//! consumed on its own cadence.

use parametrix_core::domain::{
    compute_coefficients, db_to_gain, pending_update_slot, AnalyzerTap, BandField, BandParams,
    EngineConfig, FilterKind, SampleRate, StreamSpec,
};
use parametrix_infra::audio::{AnalyzerQueue, AudioEngine, EngineHandle, SpectrumEngine};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;

const SAMPLE_RATE: u32 = 48000;
const BLOCK: usize = 512;

fn mono_engine(tap: AnalyzerTap) -> (AudioEngine, EngineHandle, SpectrumEngine) {
    let mut config = EngineConfig {
        channels: 1,
        ..EngineConfig::default()
    };
    config.analyzer.tap = tap;
    let (mut engine, handle, spectrum) = AudioEngine::build(&config).unwrap();
    engine.prepare(config.stream_spec()).unwrap();
    (engine, handle, spectrum)
}

fn generate_sine_wave(frequency: f32, samples: usize) -> Vec<f32> {
    (0..samples)
        .map(|i| (2.0 * std::f32::consts::PI * frequency * i as f32 / SAMPLE_RATE as f32).sin())
        .collect()
}

fn rms(buffer: &[f32]) -> f32 {
    (buffer.iter().map(|s| s * s).sum::<f32>() / buffer.len() as f32).sqrt()
}

/// Run `signal` through the engine block by block
fn process_signal(engine: &mut AudioEngine, signal: &[f32]) -> Vec<f32> {
    let mut output = signal.to_vec();
    for block in output.chunks_mut(BLOCK) {
        engine.process(block);
    }
    output
}

/// Steady-state gain in dB the engine applies to a unit sine at `frequency`
fn measured_gain_db(engine: &mut AudioEngine, frequency: f32) -> f32 {
    let input = generate_sine_wave(frequency, SAMPLE_RATE as usize);
    let output = process_signal(engine, &input);

    // Second half of one second is a whole number of periods for the test tones
    let half = input.len() / 2;
    20.0 * (rms(&output[half..]) / rms(&input[half..])).log10()
}

fn two_peaks_and_a_bypassed_band(handle: &mut EngineHandle) {
    let chain = handle.chain_mut();
    chain
        .set_band(0, BandParams::placed(FilterKind::Peak, 200.0, 6.0, 1.0))
        .unwrap();
    chain
        .set_band(1, BandParams::placed(FilterKind::Peak, 2000.0, -6.0, 1.0))
        .unwrap();
    chain
        .set_band(
            2,
            BandParams {
                bypassed: true,
                ..BandParams::placed(FilterKind::HighShelf, 5000.0, 12.0, 0.7)
            },
        )
        .unwrap();
}

// ============================================================================
// CASCADE RESPONSE
// ============================================================================

#[test]
fn test_two_peaks_aggregate_response() {
    let (mut engine, mut handle, _spectrum) = mono_engine(AnalyzerTap::Off);
    two_peaks_and_a_bypassed_band(&mut handle);

    let at_200 = measured_gain_db(&mut engine, 200.0);
    engine.release();
    let at_2000 = measured_gain_db(&mut engine, 2000.0);

    // Each peak leaks a few hundredths of a dB into the other's centre
    assert!((at_200 - 6.0).abs() < 0.25, "200 Hz: {at_200} dB");
    assert!((at_2000 + 6.0).abs() < 0.25, "2000 Hz: {at_2000} dB");

    // The mirror-based curve agrees with what the audio path did
    let chain = handle.chain();
    assert!((chain.response_db(200.0) as f32 - at_200).abs() < 0.05);
    assert!((chain.response_db(2000.0) as f32 - at_2000).abs() < 0.05);
    assert!(chain.response_db(20.0).abs() < 0.1);
    assert!(chain.response_db(18000.0).abs() < 0.1);
}

#[test]
fn test_bypassed_band_changes_nothing() {
    let (mut with_bypassed, mut handle_a, _sa) = mono_engine(AnalyzerTap::Off);
    two_peaks_and_a_bypassed_band(&mut handle_a);

    let (mut without, mut handle_b, _sb) = mono_engine(AnalyzerTap::Off);
    let chain = handle_b.chain_mut();
    chain
        .set_band(0, BandParams::placed(FilterKind::Peak, 200.0, 6.0, 1.0))
        .unwrap();
    chain
        .set_band(1, BandParams::placed(FilterKind::Peak, 2000.0, -6.0, 1.0))
        .unwrap();

    // A mix of tones across the range
    let signal: Vec<f32> = generate_sine_wave(90.0, 8192)
        .iter()
        .zip(generate_sine_wave(5000.0, 8192))
        .map(|(a, b)| 0.5 * (a + b))
        .collect();

    let a = process_signal(&mut with_bypassed, &signal);
    let b = process_signal(&mut without, &signal);
    assert_eq!(a, b);

    assert!(!handle_a.chain().mirror_coefficients(2).unwrap().engaged);
    for freq in [20.0, 1000.0, 5000.0, 20000.0] {
        assert!((handle_a.chain().response_db(freq) - handle_b.chain().response_db(freq)).abs() < 1e-12);
    }
}

#[test]
fn test_gain_stages_cancel() {
    let (mut engine, mut handle, _spectrum) = mono_engine(AnalyzerTap::Off);
    handle.chain_mut().set_pre_gain_db(6.0);
    handle.chain_mut().set_post_gain_db(-6.0);

    let input = generate_sine_wave(440.0, 4096);
    let output = process_signal(&mut engine, &input);

    for (out, inp) in output.iter().zip(&input) {
        assert!((out - inp).abs() < 1e-5);
    }
}

#[test]
fn test_unplaced_chain_is_bit_transparent() {
    let (mut engine, handle, _spectrum) = mono_engine(AnalyzerTap::PostEq);
    let input = generate_sine_wave(1234.0, 4096);

    assert_eq!(process_signal(&mut engine, &input), input);
    for i in 0..handle.chain().band_count() {
        assert!(!handle.chain().is_band_active(i).unwrap());
    }
}

// ============================================================================
// UPDATE PROTOCOL
// ============================================================================

#[test]
fn test_identical_writes_match_single_write() {
    let params = BandParams::placed(FilterKind::LowShelf, 150.0, 4.5, 0.8);

    let (mut once, mut handle_once, _a) = mono_engine(AnalyzerTap::Off);
    handle_once.chain_mut().set_band(0, params).unwrap();
    once.process(&mut [0.0; BLOCK]);

    let (mut twice, mut handle_twice, _b) = mono_engine(AnalyzerTap::Off);
    handle_twice.chain_mut().set_band(0, params).unwrap();
    handle_twice.chain_mut().set_band(0, params).unwrap();
    twice.process(&mut [0.0; BLOCK]);

    assert_eq!(
        handle_once.chain().mirror_coefficients(0).unwrap(),
        handle_twice.chain().mirror_coefficients(0).unwrap()
    );
}

#[test]
fn test_coalesced_writes_only_last_is_observed() {
    let a = BandParams::placed(FilterKind::Peak, 300.0, 3.0, 1.0);
    let b = BandParams::placed(FilterKind::HighPass, 80.0, 0.0, 0.707);

    let (mut writer, mut reader) = pending_update_slot(BandParams::initial(0));
    reader.drain_if_dirty();
    writer.write(a);
    writer.write(b);
    assert_eq!(reader.drain_if_dirty(), Some(b));
    assert_eq!(reader.drain_if_dirty(), None);

    // Same through the engine: the mirror shows B's coefficients after one block
    let (mut engine, mut handle, _spectrum) = mono_engine(AnalyzerTap::Off);
    handle.chain_mut().set_band(4, a).unwrap();
    handle.chain_mut().set_band(4, b).unwrap();
    engine.process(&mut [0.0; BLOCK]);

    let expected = compute_coefficients(&b, f64::from(SAMPLE_RATE));
    assert_eq!(handle.chain().mirror_coefficients(4).unwrap().coeffs, expected);
}

#[test]
fn test_field_edits_place_and_reset_a_band() {
    let (mut engine, mut handle, _spectrum) = mono_engine(AnalyzerTap::Off);
    let chain = handle.chain_mut();
    chain.set_band_field(3, BandField::Frequency, 1000.0).unwrap();
    chain.set_band_field(3, BandField::GainDb, 9.0).unwrap();
    chain.set_band_field(3, BandField::Active, 1.0).unwrap();
    chain.set_band_field(3, BandField::Bypassed, 0.0).unwrap();
    engine.process(&mut [0.0; BLOCK]);

    assert!((handle.chain().response_db(1000.0) - 9.0).abs() < 0.01);

    handle.chain_mut().reset_band(3).unwrap();
    engine.process(&mut [0.0; BLOCK]);
    assert!(handle.chain().response_db(1000.0).abs() < 1e-9);
    assert!(!handle.chain().is_band_active(3).unwrap());
}

#[test]
fn test_control_thread_races_audio_thread() {
    let (mut engine, mut handle, _spectrum) = mono_engine(AnalyzerTap::PostEq);
    let mirror = handle.chain().mirror(0).unwrap();
    let running = Arc::new(AtomicBool::new(true));

    let audio_running = Arc::clone(&running);
    let audio = thread::spawn(move || {
        let mut block = generate_sine_wave(500.0, BLOCK);
        while audio_running.load(Ordering::Acquire) {
            engine.process(&mut block);
            assert!(block.iter().all(|s| s.is_finite()));
        }
        // One more callback so the final write is applied
        engine.process(&mut block);
        engine
    });

    let last = BandParams::placed(FilterKind::Peak, 4000.0, -9.0, 3.0);
    for i in 0..5_000 {
        let gain = (i % 24) as f32 - 12.0;
        handle
            .chain_mut()
            .set_band(0, BandParams::placed(FilterKind::Peak, 200.0 + i as f32, gain, 1.0))
            .unwrap();
        handle.chain_mut().set_post_gain_db(-(i % 6) as f32);
    }
    handle.chain_mut().set_band(0, last).unwrap();

    running.store(false, Ordering::Release);
    let _engine = audio.join().unwrap();

    let snapshot = mirror.load();
    assert!(snapshot.engaged);
    assert_eq!(snapshot.coeffs, compute_coefficients(&last, f64::from(SAMPLE_RATE)));
}

#[test]
fn test_sample_rate_change_rebuilds_bands() {
    let (mut engine, mut handle, _spectrum) = mono_engine(AnalyzerTap::Off);
    let params = BandParams::placed(FilterKind::Peak, 10000.0, 8.0, 2.0);
    handle.chain_mut().set_band(0, params).unwrap();
    engine.process(&mut [0.0; BLOCK]);

    engine
        .prepare(StreamSpec {
            sample_rate: SampleRate::Hz96000,
            block_size: 256,
            channels: 1,
        })
        .unwrap();

    assert_eq!(handle.chain().sample_rate(), 96000.0);
    assert_eq!(
        handle.chain().mirror_coefficients(0).unwrap().coeffs,
        compute_coefficients(&params, 96000.0)
    );
    assert!((handle.chain().response_db(10000.0) - 8.0).abs() < 0.01);
}

#[test]
fn test_band_above_nyquist_at_low_host_rate_stays_finite() {
    let (mut engine, mut handle, _spectrum) = mono_engine(AnalyzerTap::Off);
    engine
        .prepare(StreamSpec {
            sample_rate: SampleRate::Custom(32000),
            block_size: BLOCK as u32,
            channels: 1,
        })
        .unwrap();

    handle
        .chain_mut()
        .set_band(0, BandParams::placed(FilterKind::Peak, 20000.0, 6.0, 1.0))
        .unwrap();

    let input: Vec<f32> = (0..BLOCK * 8)
        .map(|i| 0.5 * (std::f32::consts::TAU * 3000.0 * i as f32 / 32000.0).sin())
        .collect();
    let output = process_signal(&mut engine, &input);
    assert!(output.iter().all(|s| s.is_finite() && s.abs() < 2.0));

    // Moving the band back into range keeps filtering normally
    handle
        .chain_mut()
        .set_band_field(0, BandField::Frequency, 3000.0)
        .unwrap();
    let output = process_signal(&mut engine, &input);
    assert!(output.iter().all(|s| s.is_finite()));
    let tail = output.len() / 2;
    let gain_db = 20.0 * (rms(&output[tail..]) / rms(&input[tail..])).log10();
    assert!((gain_db - 6.0).abs() < 0.2, "measured {gain_db} dB");
}

// ============================================================================
// ANALYZER PATH
// ============================================================================

#[test]
fn test_queue_capacity_contract() {
    let (mut producer, mut consumer) = AnalyzerQueue::new(4096);
    let capacity = producer.capacity();
    assert_eq!(capacity, 4096);

    for i in 0..capacity {
        assert!(producer.push(i as f32));
    }
    assert!(!producer.push(-1.0));

    let mut out = vec![0.0; capacity];
    assert_eq!(consumer.pop(&mut out, capacity), capacity);
    assert!(out.iter().enumerate().all(|(i, &s)| s == i as f32));
    assert_eq!(consumer.pop(&mut out, capacity), 0);
}

#[test]
fn test_analyzer_sees_tone_through_engine() {
    let (mut engine, _handle, mut spectrum) = mono_engine(AnalyzerTap::PostEq);

    // FFT bin 43 at 2048 points
    let frequency = 43.0 * SAMPLE_RATE as f32 / 2048.0;
    let signal = generate_sine_wave(frequency, 2048);
    process_signal(&mut engine, &signal);

    assert!(spectrum.consume_and_analyze());
    assert_eq!(spectrum.bins().len(), 512);

    let (peak_bin, peak_db) = spectrum
        .levels_db()
        .iter()
        .copied()
        .enumerate()
        .fold((0, f32::MIN), |best, (i, l)| if l > best.1 { (i, l) } else { best });
    assert!((spectrum.bin_frequency(peak_bin) - frequency).abs() < 1.0);
    assert!(peak_db.abs() < 0.2, "peak {peak_db} dB");
}

#[test]
fn test_pre_and_post_taps_differ_by_eq() {
    let frequency = 43.0 * SAMPLE_RATE as f32 / 2048.0;
    let signal = generate_sine_wave(frequency, 4096);
    let cut = BandParams::placed(FilterKind::Peak, frequency, -12.0, 1.0);

    let mut peak_levels = Vec::new();
    for tap in [AnalyzerTap::PreEq, AnalyzerTap::PostEq] {
        let (mut engine, mut handle, mut spectrum) = mono_engine(tap);
        handle.chain_mut().set_band(0, cut).unwrap();
        process_signal(&mut engine, &signal);

        // Skip the first frame while the filter settles
        assert!(spectrum.consume_and_analyze());
        assert!(spectrum.consume_and_analyze());
        let peak = spectrum.levels_db().iter().copied().fold(f32::MIN, f32::max);
        peak_levels.push(peak);
    }

    let difference = peak_levels[0] - peak_levels[1];
    assert!((difference - 12.0).abs() < 0.5, "pre/post differ by {difference} dB");
}

#[test]
fn test_partial_frame_zero_padded_through_engine() {
    let (mut engine, mut handle, mut spectrum) = mono_engine(AnalyzerTap::PreEq);
    handle.chain_mut().set_post_gain_db(-24.0);

    let mut block = vec![1.0_f32; 1024];
    engine.process(&mut block);

    assert!(spectrum.consume_and_analyze());
    let frame = spectrum.frame();
    assert!(frame[..1024].iter().all(|&s| s == 1.0));
    assert!(frame[1024..].iter().all(|&s| s == 0.0));
    assert!(!spectrum.consume_and_analyze());
}

#[test]
fn test_gain_applied_to_stereo_block() {
    let mut config = EngineConfig::default();
    config.analyzer.tap = AnalyzerTap::Off;
    config.pre_gain_db = -6.0;
    let (mut engine, _handle, _spectrum) = AudioEngine::build(&config).unwrap();
    engine.prepare(config.stream_spec()).unwrap();

    let mut block = vec![0.5_f32; 2 * BLOCK];
    engine.process(&mut block);
    let expected = 0.5 * db_to_gain(-6.0);
    assert!(block.iter().all(|&s| (s - expected).abs() < 1e-6));
}
