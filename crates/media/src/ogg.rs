//! Incremental Ogg-Opus page reader.
//!
//! The TTS vendor streams an Ogg container; we only need the framed Opus
//! packets inside it. Pages are parsed as bytes arrive: a page that is not
//! yet complete stays buffered until the next push. Two meta pages open the
//! stream — `OpusHead` (parsed) and `OpusTags` (skipped) — and every
//! segment of the audio pages that follow is one Opus packet.
//!
//! The header sample rate is multiplied by two before use. That looks
//! wrong, but downstream packet pacing was tuned against it and playback
//! drifts without it; measure against a reference before touching it.

/// Bytes `OggS` — start of every page header.
const PAGE_MAGIC: &[u8; 4] = b"OggS";
/// Identification header payload magic.
const HEAD_MAGIC: &[u8; 8] = b"OpusHead";
/// Comment header payload magic.
const TAGS_MAGIC: &[u8; 8] = b"OpusTags";

/// Minimum page header size: everything before the segment table.
const HEADER_BASE: usize = 27;

/// Stream parameters from the `OpusHead` page.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct OpusStreamMeta {
    pub version: u8,
    pub channel_count: u8,
    pub pre_skip: u16,
    /// Header rate doubled (see module docs).
    pub sample_rate: u32,
}

/// Incremental page parser. Feed arbitrary byte slices with [`push`];
/// complete audio segments are handed to the callback in stream order.
///
/// [`push`]: OggPageReader::push
#[derive(Default)]
pub struct OggPageReader {
    buffer: Vec<u8>,
    meta: Option<OpusStreamMeta>,
}

impl OggPageReader {
    pub fn new() -> Self {
        Self::default()
    }

    /// Stream metadata, available once the `OpusHead` page was seen.
    pub fn meta(&self) -> Option<&OpusStreamMeta> {
        self.meta.as_ref()
    }

    /// Append bytes and process every complete page now available.
    ///
    /// The callback receives each audio segment together with the stream
    /// meta. Segments are never delivered before `OpusHead` arrived.
    pub fn push(&mut self, bytes: &[u8], mut on_segment: impl FnMut(&[u8], &OpusStreamMeta)) {
        self.buffer.extend_from_slice(bytes);

        let mut i = 0;
        while self.buffer.len() >= i + HEADER_BASE {
            if &self.buffer[i..i + 4] != PAGE_MAGIC {
                // resync: scan forward one byte at a time
                i += 1;
                continue;
            }

            let num_segments = self.buffer[i + 26] as usize;
            let header_size = HEADER_BASE + num_segments;
            if self.buffer.len() < i + header_size {
                return; // wait for more data
            }

            let segment_sizes: Vec<usize> = self.buffer[i + HEADER_BASE..i + header_size]
                .iter()
                .map(|&b| b as usize)
                .collect();
            let page_size = header_size + segment_sizes.iter().sum::<usize>();
            if self.buffer.len() < i + page_size {
                return; // wait for more data
            }

            let page = &self.buffer[i..i + page_size];
            let payload = &page[header_size..];

            if payload.len() >= 8 && &payload[..8] == HEAD_MAGIC {
                self.meta = Some(parse_head(payload));
            } else if payload.len() >= 8 && &payload[..8] == TAGS_MAGIC {
                // comment page, nothing to do
            } else if let Some(meta) = &self.meta {
                let mut offset = 0;
                for size in &segment_sizes {
                    on_segment(&payload[offset..offset + size], meta);
                    offset += size;
                }
            }

            self.buffer.drain(..i + page_size);
            i = 0;
        }
    }
}

/// Parse the `OpusHead` payload. Field layout (little-endian):
/// magic[0..8], version[8], channel count[9], pre-skip[10..12],
/// sample rate[12..16], gain[16..18], mapping family[18].
fn parse_head(payload: &[u8]) -> OpusStreamMeta {
    let channel_count = payload.get(9).copied().unwrap_or(1);
    let version = payload.get(8).copied().unwrap_or(0);
    let pre_skip = payload
        .get(10..12)
        .map(|b| u16::from_le_bytes([b[0], b[1]]))
        .unwrap_or(0);
    let sample_rate = payload
        .get(12..16)
        .map(|b| u32::from_le_bytes([b[0], b[1], b[2], b[3]]))
        .unwrap_or(48_000);

    let meta = OpusStreamMeta {
        version,
        channel_count,
        pre_skip,
        sample_rate: sample_rate * 2,
    };
    tracing::debug!(?meta, "opus stream head");
    meta
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Tests
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[cfg(test)]
mod tests {
    use super::*;

    /// Build a minimal page with the given payload split into segments.
    fn page(segments: &[&[u8]]) -> Vec<u8> {
        let mut out = Vec::new();
        out.extend_from_slice(PAGE_MAGIC);
        out.extend_from_slice(&[0u8; 22]); // version..checksum
        out.push(segments.len() as u8);
        for s in segments {
            assert!(s.len() < 255, "test segments must fit one lacing value");
            out.push(s.len() as u8);
        }
        for s in segments {
            out.extend_from_slice(s);
        }
        out
    }

    fn head_page(channels: u8, rate: u32) -> Vec<u8> {
        let mut payload = Vec::new();
        payload.extend_from_slice(HEAD_MAGIC);
        payload.push(1); // version
        payload.push(channels);
        payload.extend_from_slice(&312u16.to_le_bytes()); // pre-skip
        payload.extend_from_slice(&rate.to_le_bytes());
        payload.extend_from_slice(&0i16.to_le_bytes()); // gain
        payload.push(0); // mapping family
        page(&[&payload])
    }

    fn tags_page() -> Vec<u8> {
        let mut payload = Vec::new();
        payload.extend_from_slice(TAGS_MAGIC);
        payload.extend_from_slice(&[0u8; 8]);
        page(&[&payload])
    }

    fn collect_segments(reader: &mut OggPageReader, bytes: &[u8]) -> Vec<Vec<u8>> {
        let mut segments = Vec::new();
        reader.push(bytes, |seg, _| segments.push(seg.to_vec()));
        segments
    }

    #[test]
    fn head_sample_rate_is_doubled() {
        let mut reader = OggPageReader::new();
        reader.push(&head_page(1, 24_000), |_, _| {});
        let meta = reader.meta().unwrap();
        assert_eq!(meta.sample_rate, 48_000);
        assert_eq!(meta.channel_count, 1);
        assert_eq!(meta.pre_skip, 312);
    }

    #[test]
    fn audio_segments_after_meta_pages() {
        let mut stream = head_page(1, 24_000);
        stream.extend(tags_page());
        stream.extend(page(&[b"pkt1", b"packet-two"]));
        stream.extend(page(&[b"p3"]));

        let mut reader = OggPageReader::new();
        let segments = collect_segments(&mut reader, &stream);
        assert_eq!(segments, vec![b"pkt1".to_vec(), b"packet-two".to_vec(), b"p3".to_vec()]);
    }

    #[test]
    fn audio_before_head_is_dropped() {
        let mut reader = OggPageReader::new();
        let segments = collect_segments(&mut reader, &page(&[b"orphan"]));
        assert!(segments.is_empty());
    }

    #[test]
    fn byte_at_a_time_equals_whole_buffer() {
        let mut stream = head_page(2, 24_000);
        stream.extend(tags_page());
        stream.extend(page(&[b"alpha", b"beta"]));
        stream.extend(page(&[b"gamma", b"delta", b"epsilon"]));

        let mut whole = OggPageReader::new();
        let expected = collect_segments(&mut whole, &stream);

        let mut trickle = OggPageReader::new();
        let mut got = Vec::new();
        for byte in &stream {
            trickle.push(std::slice::from_ref(byte), |seg, _| got.push(seg.to_vec()));
        }

        assert_eq!(expected, got);
        assert_eq!(expected.len(), 5);
    }

    #[test]
    fn resyncs_over_garbage_between_pages() {
        let mut stream = head_page(1, 24_000);
        stream.extend(b"\x01\x02\x03garbage");
        stream.extend(page(&[b"ok"]));

        let mut reader = OggPageReader::new();
        let segments = collect_segments(&mut reader, &stream);
        assert_eq!(segments, vec![b"ok".to_vec()]);
    }

    #[test]
    fn partial_page_waits_for_more_data() {
        let full = page(&[b"deferred"]);
        let (first, rest) = full.split_at(10);

        let mut reader = OggPageReader::new();
        reader.push(&head_page(1, 24_000), |_, _| {});

        let mut segments = collect_segments(&mut reader, first);
        assert!(segments.is_empty());
        segments.extend(collect_segments(&mut reader, rest));
        assert_eq!(segments, vec![b"deferred".to_vec()]);
    }
}
