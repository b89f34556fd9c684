//! Ring-buffer sink.
//!
//! The producer half lives with the worker as the [`OutputSink`]; the
//! consumer half is handed to whatever drains bytes into the real device
//! (an audio callback, a presenter, a test). Backpressure falls out of the
//! buffer bound: a write is rejected whole when there is not enough vacant
//! space, never split or silently truncated.

use ringbuf::{
    traits::{Observer, Producer, Split},
    HeapRb,
};

use crate::buffer::{OutputBuffer, AUDIO_BUFFER_BYTES};
use crate::sink::OutputSink;

/// Consumer half handed to the device side.
pub type RingConsumer = ringbuf::HeapCons<u8>;

/// Bounded byte-stream sink over a heap ring buffer.
pub struct RingSink {
    producer: ringbuf::HeapProd<u8>,
}

impl RingSink {
    /// Create a sink with room for `capacity` bytes.
    pub fn new(capacity: usize) -> (Self, RingConsumer) {
        let rb = HeapRb::<u8>::new(capacity);
        let (producer, consumer) = rb.split();
        (Self { producer }, consumer)
    }

    /// Sixteen audio buffers of headroom, enough to ride out device-side
    /// scheduling jitter without masking real backpressure.
    pub fn with_default_capacity() -> (Self, RingConsumer) {
        Self::new(AUDIO_BUFFER_BYTES * 16)
    }

    /// Bytes currently waiting to be drained.
    pub fn pending_bytes(&self) -> usize {
        self.producer.occupied_len()
    }
}

impl OutputSink for RingSink {
    fn write(&mut self, buffer: &OutputBuffer) -> bool {
        if self.producer.vacant_len() < buffer.len() {
            return false;
        }
        let pushed = self.producer.push_slice(buffer.as_bytes());
        debug_assert_eq!(pushed, buffer.len());
        true
    }
}
