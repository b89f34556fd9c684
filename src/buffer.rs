//! Output buffers handed from an execution context to an output sink.

/// Frames per audio buffer, matching Glicol's fixed block size.
pub const FRAMES_PER_BUFFER: usize = 128;

/// Interleaved stereo.
pub const CHANNELS: usize = 2;

/// 16-bit samples.
pub const BYTES_PER_SAMPLE: usize = 2;

/// Size in bytes of one audio buffer.
pub const AUDIO_BUFFER_BYTES: usize = FRAMES_PER_BUFFER * CHANNELS * BYTES_PER_SAMPLE;

/// A fixed-size byte sequence produced by one execution attempt.
///
/// Audio contexts fill it with interleaved stereo 16-bit little-endian
/// samples; visual contexts with a rendered frame. Ownership transfers to
/// the sink on `write`; the sink either copies the bytes out or rejects the
/// call, it never retains a reference afterwards.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutputBuffer {
    bytes: Box<[u8]>,
}

impl OutputBuffer {
    pub fn from_bytes(bytes: Vec<u8>) -> Self {
        Self {
            bytes: bytes.into_boxed_slice(),
        }
    }

    /// Pack interleaved i16 samples as little-endian bytes.
    pub fn from_interleaved_i16(samples: &[i16]) -> Self {
        let mut bytes = Vec::with_capacity(samples.len() * BYTES_PER_SAMPLE);
        for sample in samples {
            bytes.extend_from_slice(&sample.to_le_bytes());
        }
        Self::from_bytes(bytes)
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.bytes
    }

    pub fn len(&self) -> usize {
        self.bytes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }
}

/// Convert a normalized f32 sample to i16 with clamping.
pub fn sample_to_i16(sample: f32) -> i16 {
    (sample.clamp(-1.0, 1.0) * i16::MAX as f32) as i16
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn interleaved_packing_is_little_endian() {
        let buf = OutputBuffer::from_interleaved_i16(&[1, -2]);
        assert_eq!(buf.as_bytes(), &[0x01, 0x00, 0xfe, 0xff]);
        assert_eq!(buf.len(), 4);
    }

    #[test]
    fn sample_conversion_clamps() {
        assert_eq!(sample_to_i16(2.0), i16::MAX);
        assert_eq!(sample_to_i16(-2.0), -i16::MAX);
        assert_eq!(sample_to_i16(0.0), 0);
    }

    #[test]
    fn audio_buffer_byte_size() {
        // 128 frames of stereo 16-bit PCM.
        assert_eq!(AUDIO_BUFFER_BYTES, 512);
    }
}
