//! Audio-thread infrastructure for the parametrix equalizer

pub mod audio;

pub use audio::*;
