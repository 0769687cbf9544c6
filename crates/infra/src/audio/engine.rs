//! Real-time audio engine: the host callback's view of the equalizer
//!
//! This module provides the AudioEngine which runs the filter chain on each
//! block, taps a mono sum into the analyzer queue, and handles stream setup
//! and teardown. The EngineHandle is its control-path counterpart.

use crate::audio::analyzer_queue::{AnalyzerProducer, AnalyzerQueue};
use crate::audio::spectrum::SpectrumEngine;
use parametrix_core::domain::audio::{Result, StreamSpec};
use parametrix_core::domain::{AnalyzerTap, ChainController, EngineConfig, FilterChain};
use std::sync::atomic::{AtomicU32, AtomicU8, Ordering};
use std::sync::Arc;
use tracing::info;

/// Audio-thread engine
///
/// Everything reachable from [`AudioEngine::process`] is allocation-free and
/// lock-free.
pub struct AudioEngine {
    chain: FilterChain,
    producer: AnalyzerProducer,
    tap: Arc<AtomicU8>,
    analyzer_rate: Arc<AtomicU32>,
    spec: StreamSpec,
}

impl AudioEngine {
    /// Build the engine, its control handle and the analyzer consumer
    ///
    /// All buffers are allocated here, sized from `config`.
    pub fn build(config: &EngineConfig) -> Result<(Self, EngineHandle, SpectrumEngine)> {
        let (chain, controller) = FilterChain::new(config)?;
        let spec = config.stream_spec();

        let (producer, consumer) = AnalyzerQueue::new(config.analyzer.queue_capacity());
        let spectrum = SpectrumEngine::new(consumer, &config.analyzer, spec.sample_rate.as_f32());
        let tap = Arc::new(AtomicU8::new(config.analyzer.tap.as_u8()));

        info!(
            sample_rate = spec.sample_rate.hz(),
            block_size = spec.block_size,
            channels = spec.channels,
            tap = ?config.analyzer.tap,
            queue_capacity = producer.capacity(),
            "Audio engine built"
        );

        let engine = Self {
            chain,
            producer,
            tap: Arc::clone(&tap),
            analyzer_rate: spectrum.shared_sample_rate(),
            spec,
        };
        let handle = EngineHandle { controller, tap };
        Ok((engine, handle, spectrum))
    }

    /// Host callback: filter one interleaved block in place
    pub fn process(&mut self, buffer: &mut [f32]) {
        let tap = AnalyzerTap::from_u8(self.tap.load(Ordering::Relaxed));

        if tap == AnalyzerTap::PreEq {
            self.push_mono(buffer);
        }
        self.chain.process(buffer);
        if tap == AnalyzerTap::PostEq {
            self.push_mono(buffer);
        }
    }

    // Samples that don't fit are dropped; filtering never waits on the analyzer
    #[inline]
    fn push_mono(&mut self, buffer: &[f32]) {
        let channels = self.spec.channels;
        for frame in buffer.chunks_exact(channels) {
            self.producer.push(mono_sum(frame));
        }
    }

    /// Stream setup: rebuild every band for the host's format and start clean
    ///
    /// The spectrum engine picks up the new rate for its bin frequencies.
    pub fn prepare(&mut self, spec: StreamSpec) -> Result<()> {
        self.chain.prepare(&spec)?;
        self.producer.clear();
        self.analyzer_rate
            .store(spec.sample_rate.as_f32().to_bits(), Ordering::Relaxed);
        self.spec = spec;

        info!(
            sample_rate = spec.sample_rate.hz(),
            block_size = spec.block_size,
            channels = spec.channels,
            "Audio engine prepared"
        );
        Ok(())
    }

    /// Stream teardown: drop queued analyzer samples and filter history
    pub fn release(&mut self) {
        self.producer.clear();
        self.chain.reset();
        info!("Audio engine released");
    }

    pub fn stream_spec(&self) -> StreamSpec {
        self.spec
    }

    /// Samples waiting for the analyzer
    pub fn queued_analyzer_samples(&self) -> usize {
        self.producer.len()
    }

    pub fn chain(&self) -> &FilterChain {
        &self.chain
    }
}

impl Drop for AudioEngine {
    fn drop(&mut self) {
        info!("Shutting down audio engine");
    }
}

/// Mono sum of one interleaved frame: the first channel for mono, the mean
/// otherwise (`0.5 * (L + R)` for stereo)
#[inline]
pub fn mono_sum(frame: &[f32]) -> f32 {
    match frame {
        [] => 0.0,
        [mono] => *mono,
        [left, right] => 0.5 * (left + right),
        many => many.iter().sum::<f32>() / many.len() as f32,
    }
}

/// Control-path handle to a running engine
pub struct EngineHandle {
    controller: ChainController,
    tap: Arc<AtomicU8>,
}

impl EngineHandle {
    /// Band and gain controls
    pub fn chain(&self) -> &ChainController {
        &self.controller
    }

    pub fn chain_mut(&mut self) -> &mut ChainController {
        &mut self.controller
    }

    /// Switch the analyzer tap; takes effect on the next block
    pub fn set_analyzer_tap(&self, tap: AnalyzerTap) {
        self.tap.store(tap.as_u8(), Ordering::Relaxed);
        info!(?tap, "Analyzer tap changed");
    }

    pub fn analyzer_tap(&self) -> AnalyzerTap {
        AnalyzerTap::from_u8(self.tap.load(Ordering::Relaxed))
    }
}
