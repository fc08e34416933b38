//! Opus packet timing.
//!
//! Packet duration is fully determined by the TOC byte (RFC 6716 §3.1):
//! the config number fixes the per-frame duration, the frame-count code
//! fixes how many frames the packet holds. That is all the scheduler
//! needs — no decoder required to pace playback.

use cb_domain::{Error, Result};

/// The canonical 20 ms mono silence packet used as outbound filler.
pub const SILENCE_PACKET: [u8; 3] = [0xf8, 0xff, 0xfe];

/// Duration of the silence filler, seconds.
pub const SILENCE_DURATION: f64 = 0.02;

/// Per-frame duration in microseconds for a TOC config number.
fn frame_duration_us(config: u8) -> u64 {
    match config {
        // SILK-only: 10/20/40/60 ms
        0..=11 => match config % 4 {
            0 => 10_000,
            1 => 20_000,
            2 => 40_000,
            _ => 60_000,
        },
        // Hybrid: 10/20 ms
        12..=15 => match config % 2 {
            0 => 10_000,
            _ => 20_000,
        },
        // CELT-only: 2.5/5/10/20 ms
        _ => match config % 4 {
            0 => 2_500,
            1 => 5_000,
            2 => 10_000,
            _ => 20_000,
        },
    }
}

/// Number of frames in the packet, from the TOC frame-count code.
fn frame_count(packet: &[u8]) -> Result<u64> {
    match packet[0] & 0x03 {
        0 => Ok(1),
        1 | 2 => Ok(2),
        _ => {
            // code 3: count lives in the next byte
            let count = packet
                .get(1)
                .map(|b| (b & 0x3F) as u64)
                .ok_or_else(|| Error::Audio("truncated code-3 opus packet".into()))?;
            if count == 0 {
                return Err(Error::Audio("code-3 opus packet with zero frames".into()));
            }
            Ok(count)
        }
    }
}

/// Samples this packet decodes to at `sample_rate`.
pub fn packet_sample_count(packet: &[u8], sample_rate: u32) -> Result<u64> {
    if packet.is_empty() {
        return Err(Error::Audio("empty opus packet".into()));
    }
    let config = packet[0] >> 3;
    let frames = frame_count(packet)?;
    let duration_us = frames * frame_duration_us(config);
    Ok(duration_us * sample_rate as u64 / 1_000_000)
}

/// Packet duration in seconds at `sample_rate`.
pub fn packet_duration(packet: &[u8], sample_rate: u32) -> Result<f64> {
    let samples = packet_sample_count(packet, sample_rate)?;
    Ok(samples as f64 / sample_rate as f64)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn silence_packet_is_20ms() {
        // 0xf8 = config 31 (CELT fullband 20 ms), code 0 → one frame
        let samples = packet_sample_count(&SILENCE_PACKET, 48_000).unwrap();
        assert_eq!(samples, 960);
    }

    #[test]
    fn celt_10ms_single_frame() {
        // config 30 (CELT fullband 10 ms), code 0
        let toc = 30u8 << 3;
        assert_eq!(packet_sample_count(&[toc, 0], 48_000).unwrap(), 480);
    }

    #[test]
    fn two_frame_codes_double_duration() {
        let toc_code1 = (31u8 << 3) | 1;
        let toc_code2 = (31u8 << 3) | 2;
        assert_eq!(packet_sample_count(&[toc_code1, 0], 48_000).unwrap(), 1920);
        assert_eq!(packet_sample_count(&[toc_code2, 0], 48_000).unwrap(), 1920);
    }

    #[test]
    fn code3_reads_frame_count_byte() {
        // config 31, code 3, 3 frames of 20 ms → 60 ms
        let packet = [(31u8 << 3) | 3, 3];
        assert_eq!(packet_sample_count(&packet, 48_000).unwrap(), 2880);
    }

    #[test]
    fn silk_60ms() {
        // config 3 (SILK NB 60 ms), code 0
        let toc = 3u8 << 3;
        assert_eq!(packet_sample_count(&[toc, 0], 48_000).unwrap(), 2880);
    }

    #[test]
    fn sample_rate_scales_counts() {
        assert_eq!(packet_sample_count(&SILENCE_PACKET, 24_000).unwrap(), 480);
    }

    #[test]
    fn empty_and_truncated_packets_error() {
        assert!(packet_sample_count(&[], 48_000).is_err());
        assert!(packet_sample_count(&[(31u8 << 3) | 3], 48_000).is_err());
    }

    #[test]
    fn duration_matches_sample_count() {
        let d = packet_duration(&SILENCE_PACKET, 48_000).unwrap();
        assert!((d - 0.02).abs() < 1e-9);
    }
}
