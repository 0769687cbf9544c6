//! Published coefficient snapshots for visualization
//!
//! The audio thread owns each band's live filter. After every recompute it
//! publishes a copy of the coefficients here so the control path can draw a
//! response curve without touching live state.
//!
//! The snapshot is sequence-locked: the single writer never waits, readers
//! retry until they observe a copy no write overlapped.

use crate::domain::dsp::BiquadCoeffs;
use crossbeam::utils::{Backoff, CachePadded};
use std::sync::atomic::{fence, AtomicBool, AtomicU64, AtomicUsize, Ordering};
use std::sync::Arc;

/// What the audio thread last applied to a band
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct MirrorSnapshot {
    pub coeffs: BiquadCoeffs,
    /// Whether the band was active and not bypassed when these were built
    pub engaged: bool,
}

struct CoefficientMirror {
    seq: CachePadded<AtomicUsize>,
    words: [AtomicU64; 5],
    engaged: AtomicBool,
}

impl CoefficientMirror {
    fn new(initial: MirrorSnapshot) -> Self {
        let c = initial.coeffs;
        Self {
            seq: CachePadded::new(AtomicUsize::new(0)),
            words: [c.b0, c.b1, c.b2, c.a1, c.a2].map(|v| AtomicU64::new(v.to_bits())),
            engaged: AtomicBool::new(initial.engaged),
        }
    }

    fn store(&self, snapshot: MirrorSnapshot) {
        let seq = self.seq.load(Ordering::Relaxed);
        // Odd sequence marks a write in progress
        self.seq.store(seq.wrapping_add(1), Ordering::Relaxed);
        fence(Ordering::Release);

        let c = snapshot.coeffs;
        for (word, value) in self.words.iter().zip([c.b0, c.b1, c.b2, c.a1, c.a2]) {
            word.store(value.to_bits(), Ordering::Relaxed);
        }
        self.engaged.store(snapshot.engaged, Ordering::Relaxed);

        self.seq.store(seq.wrapping_add(2), Ordering::Release);
    }

    fn load(&self) -> MirrorSnapshot {
        let backoff = Backoff::new();
        loop {
            let before = self.seq.load(Ordering::Acquire);
            if before & 1 == 0 {
                let [b0, b1, b2, a1, a2] =
                    [0, 1, 2, 3, 4].map(|i| f64::from_bits(self.words[i].load(Ordering::Relaxed)));
                let engaged = self.engaged.load(Ordering::Relaxed);

                fence(Ordering::Acquire);
                if self.seq.load(Ordering::Relaxed) == before {
                    return MirrorSnapshot {
                        coeffs: BiquadCoeffs { b0, b1, b2, a1, a2 },
                        engaged,
                    };
                }
            }
            backoff.snooze();
        }
    }
}

/// Create a mirror holding `initial`
pub fn coefficient_mirror(initial: MirrorSnapshot) -> (MirrorPublisher, MirrorReader) {
    let mirror = Arc::new(CoefficientMirror::new(initial));
    (MirrorPublisher(Arc::clone(&mirror)), MirrorReader(mirror))
}

/// Audio-thread side; there is exactly one per mirror
pub struct MirrorPublisher(Arc<CoefficientMirror>);

impl MirrorPublisher {
    /// Publish a new snapshot. Wait-free.
    pub fn publish(&self, snapshot: MirrorSnapshot) {
        self.0.store(snapshot);
    }
}

/// Read side, shareable with any number of threads
#[derive(Clone)]
pub struct MirrorReader(Arc<CoefficientMirror>);

impl MirrorReader {
    /// Last published snapshot; may trail the live filter by one block
    pub fn load(&self) -> MirrorSnapshot {
        self.0.load()
    }
}

impl std::fmt::Debug for MirrorReader {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_tuple("MirrorReader").field(&self.load()).finish()
    }
}
