//! Server-sent-events line parsing
//!
//! Shared by every strategy whose vendor streams over SSE. The parser is
//! incremental: feed it raw body bytes, drain complete events.

/// One complete SSE event.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SseEvent {
    /// Value of the `event:` field, when the vendor sends one
    pub event: Option<String>,
    /// Concatenated `data:` payload
    pub data: String,
}

impl SseEvent {
    /// The OpenAI-style terminator frame.
    pub fn is_done(&self) -> bool {
        self.data.trim() == "[DONE]"
    }
}

/// Incremental SSE parser with an internal line buffer.
#[derive(Debug, Default)]
pub struct SseParser {
    buffer: String,
    pending_event: Option<String>,
    pending_data: Vec<String>,
}

impl SseParser {
    pub fn new() -> Self {
        Self::default()
    }

    /// Feed a chunk of body bytes; returns every event completed by it.
    pub fn feed(&mut self, bytes: &[u8]) -> Vec<SseEvent> {
        self.buffer.push_str(&String::from_utf8_lossy(bytes));

        let mut events = Vec::new();
        while let Some(pos) = self.buffer.find('\n') {
            let line = self.buffer[..pos].trim_end_matches('\r').to_string();
            self.buffer.drain(..=pos);
            if let Some(event) = self.take_line(&line) {
                events.push(event);
            }
        }
        events
    }

    /// Flush any half-finished event at end of body.
    pub fn finish(&mut self) -> Option<SseEvent> {
        if self.pending_data.is_empty() {
            return None;
        }
        Some(SseEvent {
            event: self.pending_event.take(),
            data: std::mem::take(&mut self.pending_data).join("\n"),
        })
    }

    fn take_line(&mut self, line: &str) -> Option<SseEvent> {
        if line.is_empty() {
            // Blank line terminates the in-flight event.
            if self.pending_data.is_empty() {
                self.pending_event = None;
                return None;
            }
            return Some(SseEvent {
                event: self.pending_event.take(),
                data: std::mem::take(&mut self.pending_data).join("\n"),
            });
        }
        if line.starts_with(':') {
            return None; // comment / keep-alive
        }
        if let Some(rest) = line.strip_prefix("event:") {
            self.pending_event = Some(rest.trim().to_string());
            return None;
        }
        if let Some(rest) = line.strip_prefix("data:") {
            self.pending_data.push(rest.strip_prefix(' ').unwrap_or(rest).to_string());
        }
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_single_event() {
        let mut p = SseParser::new();
        let events = p.feed(b"data: {\"x\":1}\n\n");
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].data, "{\"x\":1}");
        assert_eq!(events[0].event, None);
    }

    #[test]
    fn test_typed_event() {
        let mut p = SseParser::new();
        let events = p.feed(b"event: message_start\ndata: {}\n\n");
        assert_eq!(events[0].event.as_deref(), Some("message_start"));
    }

    #[test]
    fn test_split_across_feeds() {
        let mut p = SseParser::new();
        assert!(p.feed(b"data: {\"pa").is_empty());
        assert!(p.feed(b"rt\":true}").is_empty());
        let events = p.feed(b"\n\n");
        assert_eq!(events[0].data, "{\"part\":true}");
    }

    #[test]
    fn test_multiline_data_joined() {
        let mut p = SseParser::new();
        let events = p.feed(b"data: line1\ndata: line2\n\n");
        assert_eq!(events[0].data, "line1\nline2");
    }

    #[test]
    fn test_comments_and_blank_lines_ignored() {
        let mut p = SseParser::new();
        assert!(p.feed(b": keep-alive\n\n\n").is_empty());
    }

    #[test]
    fn test_done_marker() {
        let mut p = SseParser::new();
        let events = p.feed(b"data: [DONE]\n\n");
        assert!(events[0].is_done());
    }

    #[test]
    fn test_crlf_lines() {
        let mut p = SseParser::new();
        let events = p.feed(b"data: hi\r\n\r\n");
        assert_eq!(events[0].data, "hi");
    }

    #[test]
    fn test_finish_flushes_partial_event() {
        let mut p = SseParser::new();
        p.feed(b"data: tail\n");
        let event = p.finish().unwrap();
        assert_eq!(event.data, "tail");
        assert!(p.finish().is_none());
    }
}
