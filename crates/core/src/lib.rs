//! Real-time parametric equalizer core
//!
//! Pure domain code: band model, coefficient design, the lock-free update
//! path between control and audio threads, and engine configuration. Nothing
//! here knows about audio devices.

pub mod domain;

pub use domain::*;
