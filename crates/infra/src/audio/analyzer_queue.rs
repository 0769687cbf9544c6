//! Lock-free sample queue from the audio thread to the analyzer
//!
//! Single producer, single consumer. Uses cache-padded cursors so the two
//! sides don't false-share, and stores samples as `f32` bit patterns in
//! atomics so neither side needs `unsafe`.
//!
//! Performance characteristics:
//! - Wait-free push and pop
//! - Lossy: a push into a full queue drops the sample
//! - No allocations after construction

use crossbeam::utils::CachePadded;
use std::sync::atomic::{AtomicU32, AtomicUsize, Ordering};
use std::sync::Arc;

struct Shared {
    /// Sample storage, `f32::to_bits`
    slots: Box<[AtomicU32]>,

    /// Total samples ever written; advanced only by the producer
    write_pos: CachePadded<AtomicUsize>,

    /// Total samples ever read; advanced only by the consumer
    read_pos: CachePadded<AtomicUsize>,

    /// Mask for fast modulo operation (capacity - 1)
    mask: usize,
}

impl Shared {
    #[inline]
    fn capacity(&self) -> usize {
        self.slots.len()
    }

    fn len(&self) -> usize {
        let write_pos = self.write_pos.load(Ordering::Acquire);
        let read_pos = self.read_pos.load(Ordering::Acquire);
        write_pos.wrapping_sub(read_pos)
    }

    fn clear(&self) {
        self.write_pos.store(0, Ordering::Release);
        self.read_pos.store(0, Ordering::Release);
    }
}

/// Constructor namespace for the analyzer queue
pub struct AnalyzerQueue;

impl AnalyzerQueue {
    /// Create a queue holding at least `capacity` samples
    ///
    /// Capacity is rounded up to the next power of 2. Every slot is usable:
    /// a queue of capacity C accepts C pushes before rejecting.
    pub fn new(capacity: usize) -> (AnalyzerProducer, AnalyzerConsumer) {
        let capacity = capacity.max(1).next_power_of_two();
        let slots: Box<[AtomicU32]> = (0..capacity).map(|_| AtomicU32::new(0)).collect();

        let shared = Arc::new(Shared {
            slots,
            write_pos: CachePadded::new(AtomicUsize::new(0)),
            read_pos: CachePadded::new(AtomicUsize::new(0)),
            mask: capacity - 1,
        });

        (
            AnalyzerProducer {
                shared: Arc::clone(&shared),
            },
            AnalyzerConsumer { shared },
        )
    }
}

/// Audio-thread side of the queue
pub struct AnalyzerProducer {
    shared: Arc<Shared>,
}

impl AnalyzerProducer {
    /// Append one sample; returns `false` and drops it if the queue is full
    #[inline]
    pub fn push(&mut self, sample: f32) -> bool {
        let shared = &*self.shared;
        let write_pos = shared.write_pos.load(Ordering::Relaxed);
        let read_pos = shared.read_pos.load(Ordering::Acquire);

        if write_pos.wrapping_sub(read_pos) >= shared.capacity() {
            return false;
        }

        shared.slots[write_pos & shared.mask].store(sample.to_bits(), Ordering::Relaxed);
        // Release publishes the sample before the cursor moves
        shared
            .write_pos
            .store(write_pos.wrapping_add(1), Ordering::Release);
        true
    }

    /// Append as many samples as fit; returns how many were accepted
    pub fn push_slice(&mut self, samples: &[f32]) -> usize {
        let shared = &*self.shared;
        let write_pos = shared.write_pos.load(Ordering::Relaxed);
        let read_pos = shared.read_pos.load(Ordering::Acquire);

        let free = shared.capacity() - write_pos.wrapping_sub(read_pos);
        let to_write = samples.len().min(free);

        for (i, sample) in samples[..to_write].iter().enumerate() {
            let pos = write_pos.wrapping_add(i) & shared.mask;
            shared.slots[pos].store(sample.to_bits(), Ordering::Relaxed);
        }

        shared
            .write_pos
            .store(write_pos.wrapping_add(to_write), Ordering::Release);
        to_write
    }

    /// Reset both cursors to empty
    ///
    /// Only at quiescent points (stream setup or teardown) when no pop is
    /// in flight.
    pub fn clear(&mut self) {
        self.shared.clear();
    }

    pub fn capacity(&self) -> usize {
        self.shared.capacity()
    }

    /// Current fill level
    pub fn len(&self) -> usize {
        self.shared.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Visualization side of the queue
pub struct AnalyzerConsumer {
    shared: Arc<Shared>,
}

impl AnalyzerConsumer {
    /// Copy up to `max_count` samples into `destination` in FIFO order
    ///
    /// Returns how many were copied; 0 when empty. Never reads past
    /// `destination`'s length.
    pub fn pop(&mut self, destination: &mut [f32], max_count: usize) -> usize {
        let shared = &*self.shared;
        let read_pos = shared.read_pos.load(Ordering::Relaxed);
        let write_pos = shared.write_pos.load(Ordering::Acquire);

        let available = write_pos.wrapping_sub(read_pos);
        let to_read = available.min(max_count).min(destination.len());

        for (i, slot) in destination[..to_read].iter_mut().enumerate() {
            let pos = read_pos.wrapping_add(i) & shared.mask;
            *slot = f32::from_bits(shared.slots[pos].load(Ordering::Relaxed));
        }

        // Release hands the slots back to the producer after they were read
        shared
            .read_pos
            .store(read_pos.wrapping_add(to_read), Ordering::Release);
        to_read
    }

    /// Reset both cursors to empty; same quiescence rule as the producer's
    pub fn clear(&mut self) {
        self.shared.clear();
    }

    pub fn capacity(&self) -> usize {
        self.shared.capacity()
    }

    /// Samples available to pop
    pub fn len(&self) -> usize {
        self.shared.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
