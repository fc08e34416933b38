//! Incremental SSE parsing for the chat-completions stream.
//!
//! Line oriented: network bytes are split on newlines as they arrive,
//! `data:` lines accumulate into the current event, and a blank line
//! completes it. Multi-line data is joined with `\n` per the SSE format.
//! The vendor only ever sends `data:` fields, so `event:`, `id:`,
//! `retry:`, and comment lines are ignored.

#[derive(Default)]
pub(crate) struct SseBuffer {
    partial_line: String,
    event_data: Vec<String>,
}

impl SseBuffer {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    /// Feed one network chunk; returns the data payload of every event
    /// the chunk completed.
    pub(crate) fn feed(&mut self, bytes: &[u8]) -> Vec<String> {
        let mut completed = Vec::new();
        for c in String::from_utf8_lossy(bytes).chars() {
            if c != '\n' {
                self.partial_line.push(c);
                continue;
            }
            let line = self.take_line();
            if line.is_empty() {
                completed.extend(self.complete_event());
            } else {
                self.push_field(&line);
            }
        }
        completed
    }

    /// End of stream: an unterminated trailing event still counts.
    pub(crate) fn finish(&mut self) -> Option<String> {
        let line = self.take_line();
        self.push_field(&line);
        self.complete_event()
    }

    fn take_line(&mut self) -> String {
        let mut line = std::mem::take(&mut self.partial_line);
        if line.ends_with('\r') {
            line.pop();
        }
        line
    }

    fn push_field(&mut self, line: &str) {
        if let Some(payload) = line.strip_prefix("data:") {
            let payload = payload.strip_prefix(' ').unwrap_or(payload);
            if !payload.is_empty() {
                self.event_data.push(payload.to_string());
            }
        }
    }

    fn complete_event(&mut self) -> Option<String> {
        if self.event_data.is_empty() {
            return None;
        }
        let joined = self.event_data.join("\n");
        self.event_data.clear();
        Some(joined)
    }
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Tests
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn one_event_per_blank_line() {
        let mut sse = SseBuffer::new();
        let events = sse.feed(b"data: {\"a\":1}\n\ndata: {\"b\":2}\n\n");
        assert_eq!(events, vec!["{\"a\":1}", "{\"b\":2}"]);
    }

    #[test]
    fn multi_line_data_joins_with_newline() {
        let mut sse = SseBuffer::new();
        let events = sse.feed(b"data: first\ndata: second\n\n");
        assert_eq!(events, vec!["first\nsecond"]);
    }

    #[test]
    fn crlf_line_endings() {
        let mut sse = SseBuffer::new();
        let events = sse.feed(b"data: payload\r\n\r\n");
        assert_eq!(events, vec!["payload"]);
    }

    #[test]
    fn bytes_may_split_anywhere() {
        let raw = b"data: torn apart\n\ndata: [DONE]\n\n";
        let mut sse = SseBuffer::new();
        let mut events = Vec::new();
        for byte in raw {
            events.extend(sse.feed(std::slice::from_ref(byte)));
        }
        assert_eq!(events, vec!["torn apart", "[DONE]"]);
    }

    #[test]
    fn other_fields_and_comments_ignored() {
        let mut sse = SseBuffer::new();
        let events = sse.feed(b"event: message\nid: 7\nretry: 1000\n: keep-alive\ndata: x\n\n");
        assert_eq!(events, vec!["x"]);
    }

    #[test]
    fn blank_lines_without_data_yield_nothing() {
        let mut sse = SseBuffer::new();
        assert!(sse.feed(b"\n\n\n").is_empty());
        assert!(sse.feed(b"data: \n\n").is_empty());
        assert!(sse.finish().is_none());
    }

    #[test]
    fn finish_flushes_unterminated_event() {
        let mut sse = SseBuffer::new();
        assert!(sse.feed(b"data: no trailing blank line").is_empty());
        assert_eq!(sse.finish().as_deref(), Some("no trailing blank line"));
        // finish drains: a second call finds nothing
        assert!(sse.finish().is_none());
    }
}
