//! Splits the LLM token stream into sentence-sized units for synthesis.
//!
//! A buffered prefix is flushed once it ends on a sentence delimiter, the
//! next delta does not continue that delimiter run, and the buffer is long
//! enough. The first chunk of a turn flushes at 50 characters to get audio
//! out fast; later chunks wait for 150 so the synthesizer gets better
//! prosody. Each flushed chunk has its leading whitespace stripped.

/// Characters that may end a sentence unit.
const DELIMITERS: &[char] = &['.', '!', '?', '\n', '\t', ';'];

/// Minimum buffered length before the first flush of a turn.
const MIN_FIRST: usize = 50;
/// Minimum buffered length for every later flush.
const MIN_REST: usize = 150;

pub struct SentenceChunker {
    buffer: String,
    emitted: usize,
}

impl SentenceChunker {
    pub fn new() -> Self {
        Self {
            buffer: String::new(),
            emitted: 0,
        }
    }

    /// Number of chunks flushed so far.
    pub fn emitted(&self) -> usize {
        self.emitted
    }

    fn min_len(&self) -> usize {
        if self.emitted == 0 {
            MIN_FIRST
        } else {
            MIN_REST
        }
    }

    fn ends_on_delimiter(&self) -> bool {
        self.buffer.ends_with(DELIMITERS)
    }

    /// Feed one stream delta; returns a flushed chunk if the boundary
    /// rules fired.
    pub fn push(&mut self, delta: &str) -> Option<String> {
        let mut out = None;
        if self.ends_on_delimiter()
            && !delta.starts_with(DELIMITERS)
            && self.buffer.trim_start().len() >= self.min_len()
        {
            out = self.take_buffer();
        }
        self.buffer.push_str(delta);
        out
    }

    /// Flush whatever is left at end of stream. Not called on
    /// cancellation — a cancelled tail is stale by definition.
    pub fn finish(&mut self) -> Option<String> {
        self.take_buffer()
    }

    fn take_buffer(&mut self) -> Option<String> {
        let chunk = std::mem::take(&mut self.buffer);
        let chunk = chunk.trim_start();
        if chunk.is_empty() {
            return None;
        }
        self.emitted += 1;
        Some(chunk.to_string())
    }
}

impl Default for SentenceChunker {
    fn default() -> Self {
        Self::new()
    }
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Tests
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
