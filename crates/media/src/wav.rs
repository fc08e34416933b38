//! Minimal 16-bit PCM WAV writer for inbound-audio snapshots.

use std::io::Write;
use std::path::Path;

use cb_domain::Result;

/// Write interleaved 16-bit PCM samples as a canonical 44-byte-header WAV.
pub fn write_wav(path: &Path, samples: &[i16], sample_rate: u32, channels: u16) -> Result<()> {
    let data_len = (samples.len() * 2) as u32;
    let byte_rate = sample_rate * channels as u32 * 2;
    let block_align = channels * 2;

    let mut file = std::fs::File::create(path)?;
    file.write_all(b"RIFF")?;
    file.write_all(&(36 + data_len).to_le_bytes())?;
    file.write_all(b"WAVE")?;

    file.write_all(b"fmt ")?;
    file.write_all(&16u32.to_le_bytes())?;
    file.write_all(&1u16.to_le_bytes())?; // PCM
    file.write_all(&channels.to_le_bytes())?;
    file.write_all(&sample_rate.to_le_bytes())?;
    file.write_all(&byte_rate.to_le_bytes())?;
    file.write_all(&block_align.to_le_bytes())?;
    file.write_all(&16u16.to_le_bytes())?; // bits per sample

    file.write_all(b"data")?;
    file.write_all(&data_len.to_le_bytes())?;

    let mut buf = Vec::with_capacity(samples.len() * 2);
    for s in samples {
        buf.extend_from_slice(&s.to_le_bytes());
    }
    file.write_all(&buf)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn header_and_payload_roundtrip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("snap.wav");
        write_wav(&path, &[0, 1, -1, 32_767], 48_000, 2).unwrap();

        let raw = std::fs::read(&path).unwrap();
        assert_eq!(&raw[..4], b"RIFF");
        assert_eq!(&raw[8..12], b"WAVE");
        assert_eq!(raw.len(), 44 + 8);
        // sample rate field
        assert_eq!(u32::from_le_bytes([raw[24], raw[25], raw[26], raw[27]]), 48_000);
        // first sample after the header
        assert_eq!(i16::from_le_bytes([raw[44], raw[45]]), 0);
        assert_eq!(i16::from_le_bytes([raw[46], raw[47]]), 1);
    }
}
