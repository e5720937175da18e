use bytes::{Buf, BytesMut};
use serde::Serialize;

/// A single decoded SSE record
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct SseEvent {
    /// Value of the last `event:` line, if any
    pub event: Option<String>,
    /// All `data:` lines joined with `\n`
    pub data: Option<String>,
    /// Value of the last `id:` line, if any
    pub id: Option<String>,
}

impl SseEvent {
    /// Event name, defaulting to `message` like browsers do
    pub fn name(&self) -> &str {
        self.event.as_deref().unwrap_or("message")
    }
}

/// Record boundary variants accepted by the wire format
const BOUNDARIES: [&[u8]; 3] = [b"\n\n", b"\r\n\r\n", b"\r\r"];

/// Bytes of a buffer tail that may hold the start of a marker still missing
/// its last byte
const MARKER_OVERLAP: usize = 3;

/// Stateful parser for a line-oriented `text/event-stream` body.
///
/// Chunks can be split anywhere, including inside a boundary marker or a
/// multi-byte character; bytes are buffered until a full record is delimited.
pub struct FrameParser {
    buffer: BytesMut,
    /// Offset before which the buffer is known to hold no marker
    scanned: usize,
    finished: bool,
}

impl FrameParser {
    pub fn new() -> Self {
        Self {
            buffer: BytesMut::with_capacity(8192),
            scanned: 0,
            finished: false,
        }
    }

    /// Feed new data and extract every fully delimited event
    pub fn feed(&mut self, chunk: impl AsRef<[u8]>) -> Vec<SseEvent> {
        if self.finished {
            return Vec::new();
        }

        self.buffer.extend_from_slice(chunk.as_ref());
        self.extract_events()
    }

    fn extract_events(&mut self) -> Vec<SseEvent> {
        let mut events = Vec::new();

        while let Some((idx, len)) = self.find_boundary() {
            let record = self.buffer.split_to(idx);
            self.buffer.advance(len);
            self.scanned = 0;

            if let Some(event) = parse_record(&String::from_utf8_lossy(&record)) {
                events.push(event);
            }
        }

        self.scanned = self.buffer.len().saturating_sub(MARKER_OVERLAP);
        if !self.buffer.is_empty() {
            tracing::trace!(buffered = self.buffer.len(), "Waiting for record boundary");
        }

        events
    }

    /// Earliest boundary among all marker variants, as (index, marker length).
    /// Only the part of the buffer not yet ruled out is searched.
    fn find_boundary(&self) -> Option<(usize, usize)> {
        let start = self.scanned.min(self.buffer.len());
        let unscanned = &self.buffer[start..];

        BOUNDARIES
            .iter()
            .filter_map(|marker| {
                unscanned
                    .windows(marker.len())
                    .position(|window| window == *marker)
                    .map(|idx| (start + idx, marker.len()))
            })
            .min_by_key(|(idx, _)| *idx)
    }

    /// Signal end of transport. Undelimited bytes are dropped and their count
    /// returned; no partial record is ever emitted.
    pub fn finish(&mut self) -> usize {
        let discarded = self.buffer.len();
        if discarded > 0 {
            tracing::debug!(discarded, "Discarding undelimited tail at end of stream");
        }
        self.buffer.clear();
        self.scanned = 0;
        self.finished = true;
        discarded
    }

    /// Stop processing after a transport failure
    pub fn fail(&mut self) {
        self.buffer.clear();
        self.scanned = 0;
        self.finished = true;
    }

    /// Whether `finish` or `fail` has been called since the last reset
    pub fn is_finished(&self) -> bool {
        self.finished
    }

    /// Bytes currently waiting for a boundary
    pub fn buffered_len(&self) -> usize {
        self.buffer.len()
    }

    /// Reset the parser state (useful for connection reuse)
    pub fn reset(&mut self) {
        self.buffer.clear();
        if self.buffer.capacity() > 65536 {
            // 64KB max, reallocate if too large
            self.buffer = BytesMut::with_capacity(8192);
        }
        self.scanned = 0;
        self.finished = false;
    }
}

impl Default for FrameParser {
    fn default() -> Self {
        Self::new()
    }
}

/// Parse one raw record into an event. Returns `None` when the record holds
/// no recognized field (comments, heartbeats, stray lines).
fn parse_record(raw: &str) -> Option<SseEvent> {
    let mut event = SseEvent::default();
    let mut data_lines: Vec<&str> = Vec::new();
    let mut recognized = false;

    for line in raw.split("\r\n").flat_map(|l| l.split(['\n', '\r'])) {
        if line.is_empty() || line.starts_with(':') {
            continue;
        }

        if let Some(value) = line.strip_prefix("event:") {
            event.event = Some(value.trim().to_string());
            recognized = true;
        } else if let Some(value) = line.strip_prefix("data:") {
            data_lines.push(value.strip_prefix(' ').unwrap_or(value));
            recognized = true;
        } else if let Some(value) = line.strip_prefix("id:") {
            event.id = Some(value.trim().to_string());
            recognized = true;
        }
    }

    if !data_lines.is_empty() {
        event.data = Some(data_lines.join("\n"));
    }

    recognized.then_some(event)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_complete_record() {
        let mut parser = FrameParser::new();
        let events = parser.feed("event: update\ndata: hello\nid: 7\n\n");
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].event.as_deref(), Some("update"));
        assert_eq!(events[0].data.as_deref(), Some("hello"));
        assert_eq!(events[0].id.as_deref(), Some("7"));
    }

    #[test]
    fn test_boundary_split_across_feeds() {
        let mut parser = FrameParser::new();

        assert!(parser.feed(r#"data: {"a":1"#).is_empty());
        let events = parser.feed("}\n\n");
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].data.as_deref(), Some(r#"{"a":1}"#));
    }

    #[test]
    fn test_marker_split_between_bytes() {
        let mut parser = FrameParser::new();

        assert!(parser.feed("data: x\r\n\r").is_empty());
        let events = parser.feed("\ndata: y\n\n");
        assert_eq!(events.len(), 2);
        assert_eq!(events[0].data.as_deref(), Some("x"));
        assert_eq!(events[1].data.as_deref(), Some("y"));
    }

    #[test]
    fn test_large_record_in_small_chunks() {
        let mut parser = FrameParser::new();
        let payload = "x".repeat(100_000);
        let record = format!("data: {}\r\n\r\n", payload);

        let mut events = Vec::new();
        for chunk in record.as_bytes().chunks(7) {
            events.extend(parser.feed(chunk));
        }

        assert_eq!(events.len(), 1);
        assert_eq!(events[0].data.as_deref(), Some(payload.as_str()));
        assert_eq!(parser.buffered_len(), 0);
    }

    #[test]
    fn test_scan_resumes_near_buffer_end() {
        let mut parser = FrameParser::new();

        assert!(parser.feed("data: abcdef\r\n").is_empty());
        assert_eq!(parser.scanned, parser.buffered_len() - MARKER_OVERLAP);

        assert!(parser.feed("\r").is_empty());
        let events = parser.feed("\ndata: next\n\n");
        let data: Vec<_> = events.iter().map(|e| e.data.clone().unwrap()).collect();
        assert_eq!(data, vec!["abcdef", "next"]);
        assert_eq!(parser.scanned, 0);
    }

    #[test]
    fn test_earliest_marker_wins() {
        let mut parser = FrameParser::new();
        let events = parser.feed("data: a\r\rdata: b\n\ndata: c\r\n\r\n");
        let data: Vec<_> = events.iter().map(|e| e.data.clone().unwrap()).collect();
        assert_eq!(data, vec!["a", "b", "c"]);
    }

    #[test]
    fn test_multiline_data_joined() {
        let mut parser = FrameParser::new();
        let events = parser.feed("data: first\ndata:second\ndata:  third\n\n");
        assert_eq!(events[0].data.as_deref(), Some("first\nsecond\n third"));
    }

    #[test]
    fn test_comments_and_unknown_fields() {
        let mut parser = FrameParser::new();
        let events = parser.feed(": heartbeat\n\nretry: 10\nfoo\ndata: kept\n\n");
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].data.as_deref(), Some("kept"));
        assert_eq!(events[0].name(), "message");
    }

    #[test]
    fn test_last_event_name_wins() {
        let mut parser = FrameParser::new();
        let events = parser.feed("event: one\nevent: two\n\n");
        assert_eq!(events[0].event.as_deref(), Some("two"));
        assert_eq!(events[0].data, None);
    }

    #[test]
    fn test_multibyte_char_split() {
        let mut parser = FrameParser::new();
        let bytes = "data: héllo\n\n".as_bytes();
        // split inside the two-byte 'é'
        assert!(parser.feed(&bytes[..8]).is_empty());
        let events = parser.feed(&bytes[8..]);
        assert_eq!(events[0].data.as_deref(), Some("héllo"));
    }

    #[test]
    fn test_finish_discards_tail() {
        let mut parser = FrameParser::new();
        parser.feed("data: done\n\ndata: partial");
        assert_eq!(parser.buffered_len(), 13);

        assert_eq!(parser.finish(), 13);
        assert!(parser.is_finished());
        assert!(parser.feed("\n\n").is_empty());
    }

    #[test]
    fn test_parser_reset() {
        let mut parser = FrameParser::new();
        parser.feed("data: partial");
        parser.fail();
        assert!(parser.is_finished());

        parser.reset();
        assert!(!parser.is_finished());
        assert_eq!(parser.buffered_len(), 0);
        assert_eq!(parser.feed("data: again\n\n").len(), 1);
    }
}
