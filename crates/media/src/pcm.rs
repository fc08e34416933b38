//! PCM helpers for the inbound path: stereo→mono mixdown, 48 kHz→16 kHz
//! downsampling for the VAD, and fixed-size frame chunking.

use crate::{VAD_CHUNK_SIZE, VAD_SAMPLE_RATE};

/// Mix interleaved stereo i16 down to mono f32 in [-1, 1].
pub fn stereo_to_mono_f32(samples: &[i16]) -> Vec<f32> {
    samples
        .chunks_exact(2)
        .map(|pair| (pair[0] as f32 + pair[1] as f32) / 2.0 / 32_767.0)
        .collect()
}

/// Mix interleaved stereo i16 down to mono i16 (audio snapshots).
pub fn stereo_to_mono_i16(samples: &[i16]) -> Vec<i16> {
    samples
        .chunks_exact(2)
        .map(|pair| ((pair[0] as i32 + pair[1] as i32) / 2) as i16)
        .collect()
}

/// Interpret little-endian 16-bit PCM bytes as samples.
pub fn bytes_to_i16(bytes: &[u8]) -> Vec<i16> {
    bytes
        .chunks_exact(2)
        .map(|b| i16::from_le_bytes([b[0], b[1]]))
        .collect()
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Downsampler
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// Integer-factor downsampler (48 kHz → 16 kHz is an exact factor of 3).
/// Each output sample averages one input group, which doubles as a cheap
/// anti-aliasing filter — plenty for a VAD front end.
pub struct Downsampler {
    factor: usize,
    pending: Vec<f32>,
}

impl Downsampler {
    pub fn new(input_rate: u32, output_rate: u32) -> Self {
        debug_assert!(input_rate % output_rate == 0);
        Self {
            factor: (input_rate / output_rate) as usize,
            pending: Vec::new(),
        }
    }

    /// 48 kHz → 16 kHz, the configuration the VAD path uses.
    pub fn for_vad() -> Self {
        Self::new(crate::TRANSPORT_SAMPLE_RATE, VAD_SAMPLE_RATE)
    }

    pub fn push(&mut self, samples: &[f32]) -> Vec<f32> {
        self.pending.extend_from_slice(samples);
        let complete = self.pending.len() / self.factor * self.factor;
        let out: Vec<f32> = self.pending[..complete]
            .chunks_exact(self.factor)
            .map(|group| group.iter().sum::<f32>() / self.factor as f32)
            .collect();
        self.pending.drain(..complete);
        out
    }

    pub fn reset(&mut self) {
        self.pending.clear();
    }
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Frame chunker
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// Accumulates samples and yields fixed-size frames (the VAD model wants
/// exactly 512 samples per inference call).
pub struct FrameChunker {
    frame_size: usize,
    buffer: Vec<f32>,
}

impl FrameChunker {
    pub fn new(frame_size: usize) -> Self {
        Self {
            frame_size,
            buffer: Vec::new(),
        }
    }

    pub fn for_vad() -> Self {
        Self::new(VAD_CHUNK_SIZE)
    }

    pub fn push(&mut self, samples: &[f32]) -> Vec<Vec<f32>> {
        self.buffer.extend_from_slice(samples);
        let mut frames = Vec::new();
        while self.buffer.len() >= self.frame_size {
            frames.push(self.buffer.drain(..self.frame_size).collect());
        }
        frames
    }

    pub fn reset(&mut self) {
        self.buffer.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn stereo_mixdown_averages_channels() {
        let mono = stereo_to_mono_f32(&[32_767, 32_767, 0, 32_767]);
        assert!((mono[0] - 1.0).abs() < 1e-4);
        assert!((mono[1] - 0.5).abs() < 1e-4);
    }

    #[test]
    fn i16_mixdown_averages_without_overflow() {
        let mono = stereo_to_mono_i16(&[1000, 3000, -2000, -4000, 32_767, 32_767]);
        assert_eq!(mono, vec![2000, -3000, 32_767]);
    }

    #[test]
    fn downsampler_factor_three() {
        let mut ds = Downsampler::for_vad();
        let out = ds.push(&[0.3, 0.3, 0.3, 0.6, 0.6, 0.6]);
        assert_eq!(out.len(), 2);
        assert!((out[0] - 0.3).abs() < 1e-6);
        assert!((out[1] - 0.6).abs() < 1e-6);
    }

    #[test]
    fn downsampler_carries_remainder() {
        let mut ds = Downsampler::for_vad();
        assert!(ds.push(&[0.1, 0.1]).is_empty());
        let out = ds.push(&[0.1]);
        assert_eq!(out.len(), 1);
    }

    #[test]
    fn chunker_yields_exact_frames() {
        let mut chunker = FrameChunker::new(4);
        assert!(chunker.push(&[0.0; 3]).is_empty());
        let frames = chunker.push(&[0.0; 6]);
        assert_eq!(frames.len(), 2);
        assert_eq!(frames[0].len(), 4);
    }

    #[test]
    fn bytes_to_i16_little_endian() {
        assert_eq!(bytes_to_i16(&[0x01, 0x00, 0xff, 0x7f]), vec![1, 32_767]);
    }
}
