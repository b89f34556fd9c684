//! cpal-backed audio device sink.
//!
//! Opens the default output device and drains a [`RingSink`] consumer from
//! the stream callback. The [`RingSink`] half goes to the worker thread;
//! [`DeviceStream`] stays with the controller and keeps the stream alive —
//! dropping it stops playback, after which the worker sees permanent write
//! rejection and reports the device as lost.

use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use cpal::StreamConfig;
use ringbuf::traits::Consumer;

use crate::sink::ring::{RingConsumer, RingSink};
use crate::sink::SinkError;

/// Keepalive handle for a running cpal output stream.
pub struct DeviceStream {
    _stream: cpal::Stream,
    sample_rate: u32,
}

impl DeviceStream {
    pub fn sample_rate(&self) -> u32 {
        self.sample_rate
    }
}

/// Open the default output device with roughly 100ms of ring headroom.
pub fn open_default() -> Result<(RingSink, DeviceStream), SinkError> {
    let host = cpal::default_host();
    let device = host.default_output_device().ok_or(SinkError::NoDevice)?;

    let config = device
        .default_output_config()
        .map_err(|e| SinkError::DeviceInit(e.to_string()))?;
    let mut config: StreamConfig = config.into();
    // The callback assumes 2-channel interleaving.
    config.channels = 2;

    let sample_rate = config.sample_rate.0;
    // 100ms of stereo 16-bit PCM.
    let capacity = (sample_rate as usize / 10) * 4;
    let (sink, consumer) = RingSink::new(capacity);

    let stream = build_stream(&device, &config, consumer)?;
    stream
        .play()
        .map_err(|e| SinkError::Playback(e.to_string()))?;

    tracing::info!(sample_rate, "audio device stream started");
    Ok((
        sink,
        DeviceStream {
            _stream: stream,
            sample_rate,
        },
    ))
}

fn build_stream(
    device: &cpal::Device,
    config: &StreamConfig,
    mut consumer: RingConsumer,
) -> Result<cpal::Stream, SinkError> {
    let channels = config.channels as usize;

    device
        .build_output_stream(
            config,
            move |data: &mut [f32], _: &cpal::OutputCallbackInfo| {
                for frame in data.chunks_mut(channels) {
                    let left = pop_sample(&mut consumer);
                    let right = pop_sample(&mut consumer);
                    // Stereo pair; zero-fill any extra channels.
                    for (i, sample) in frame.iter_mut().enumerate() {
                        *sample = match i {
                            0 => left,
                            1 => right,
                            _ => 0.0,
                        };
                    }
                }
            },
            |err| tracing::warn!(error = %err, "audio stream error"),
            None,
        )
        .map_err(|e| SinkError::StreamCreate(e.to_string()))
}

/// Pop one 16-bit little-endian sample; silence on underrun.
fn pop_sample(consumer: &mut RingConsumer) -> f32 {
    let (Some(lo), Some(hi)) = (consumer.try_pop(), consumer.try_pop()) else {
        return 0.0;
    };
    i16::from_le_bytes([lo, hi]) as f32 / 32768.0
}
