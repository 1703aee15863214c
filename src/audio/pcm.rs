//! Float to 16-bit linear PCM.

/// Full-scale value for a sample of exactly 1.0
pub const PCM_FULL_SCALE: f32 = 32767.0;

/// One block of 16-bit PCM derived from exactly one [`AudioFrame`].
///
/// [`AudioFrame`]: super::AudioFrame
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EncodedChunk {
    samples: Vec<i16>,
}

impl EncodedChunk {
    pub fn samples(&self) -> &[i16] {
        &self.samples
    }

    pub fn len(&self) -> usize {
        self.samples.len()
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    /// Wire layout: little-endian i16, no header, no length prefix.
    pub fn into_bytes(self) -> Vec<u8> {
        self.samples.iter().flat_map(|s| s.to_le_bytes()).collect()
    }
}

/// Encode float samples as i16 PCM.
///
/// Only the upper bound is clamped (`min(s, 1.0) * 32767`, truncated toward
/// zero). Values below -1.0 are left to the float-to-int cast, which saturates
/// at `i16::MIN`; NaN encodes as 0.
pub fn encode(samples: &[f32]) -> EncodedChunk {
    let samples = samples
        .iter()
        .map(|&s| {
            // `f32::min` would turn NaN into 1.0
            let s = if s > 1.0 { 1.0 } else { s };
            (s * PCM_FULL_SCALE) as i16
        })
        .collect();
    EncodedChunk { samples }
}
