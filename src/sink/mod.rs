//! Output sinks.
//!
//! A sink accepts [`OutputBuffer`]s from the worker and forwards them to
//! the consuming device, reporting backpressure through the `write` return
//! value. Sinks own no buffers across calls; every `write` either copies
//! the bytes out or rejects the whole call.

pub mod ring;

#[cfg(feature = "device")]
pub mod device;

use thiserror::Error;

use crate::buffer::OutputBuffer;

/// Bounded-buffer write boundary to the consuming device.
pub trait OutputSink {
    /// Attempt to hand `buffer` to the device.
    ///
    /// `true` means the device will consume it. `false` means the device's
    /// queue is full or it has stopped accepting — a flow-control signal
    /// ("pause production"), not an error. The caller decides when repeated
    /// refusal amounts to a lost device.
    fn write(&mut self, buffer: &OutputBuffer) -> bool;
}

/// Failures while setting up a device-backed sink.
#[derive(Debug, Error)]
pub enum SinkError {
    #[error("no audio device available")]
    NoDevice,
    #[error("failed to initialize audio device: {0}")]
    DeviceInit(String),
    #[error("failed to create audio stream: {0}")]
    StreamCreate(String),
    #[error("playback error: {0}")]
    Playback(String),
}
