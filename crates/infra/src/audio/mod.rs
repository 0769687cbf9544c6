//! Real-time plumbing around the equalizer core
//!
//! - `analyzer_queue`: lock-free SPSC sample queue, audio thread to analyzer
//! - `spectrum`: FFT analysis on the visualization cadence
//! - `engine`: the host callback's view of chain, tap and stream lifecycle

pub mod analyzer_queue;
pub mod engine;
pub mod spectrum;

pub use analyzer_queue::{AnalyzerConsumer, AnalyzerProducer, AnalyzerQueue};
pub use engine::{mono_sum, AudioEngine, EngineHandle};
pub use spectrum::SpectrumEngine;
