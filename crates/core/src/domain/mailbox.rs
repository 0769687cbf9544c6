//! Last-write-wins parameter mailbox
//!
//! One writer (the control path) publishes whole records; one reader (the
//! audio thread) drains the latest record at most once per change. Built on a
//! triple buffer, so both sides are wait-free and the reader always observes
//! a complete record, never a mix of old and new fields.
//!
//! The two halves are not `Clone`: owning a [`SlotWriter`] is what makes a
//! thread the single writer, and the same holds for [`SlotReader`].

use triple_buffer::{Input, Output, TripleBuffer};

/// Create a mailbox holding `initial`, already marked dirty
///
/// The first drain returns `initial`, so the audio thread builds coefficients
/// on its first callback without any write from the control path.
pub fn pending_update_slot<T: Clone + Send>(initial: T) -> (SlotWriter<T>, SlotReader<T>) {
    let (mut input, output) = TripleBuffer::new(&initial).split();
    input.write(initial);
    (SlotWriter { input }, SlotReader { output })
}

/// Control-path half of a mailbox
pub struct SlotWriter<T: Send> {
    input: Input<T>,
}

impl<T: Clone + Send> SlotWriter<T> {
    /// Replace the stored record and mark it dirty
    ///
    /// Never blocks. Records written before the next drain are discarded.
    pub fn write(&mut self, value: T) {
        self.input.write(value);
    }
}

/// Audio-thread half of a mailbox
pub struct SlotReader<T: Send> {
    output: Output<T>,
}

impl<T: Clone + Send> SlotReader<T> {
    /// Take the latest record if one was written since the last drain
    ///
    /// Bounded and allocation-free for `Copy` records.
    pub fn drain_if_dirty(&mut self) -> Option<T> {
        if self.output.update() {
            Some(self.output.read().clone())
        } else {
            None
        }
    }
}
