//! SSE framing decoder
//!
//! Incremental line decoder for `text/event-stream` bodies. Bytes arrive
//! in arbitrary network-sized frames; complete lines come out. Field
//! parsing follows the SSE wire format: `data:` and `event:` fields are
//! surfaced, comments (leading `:`) and unknown fields are dropped.

/// One parsed SSE line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SseLine {
    /// `data: <payload>` with the optional single leading space removed
    Data(String),
    /// `event: <name>` (Anthropic-style named events)
    Event(String),
    /// Blank line, terminating one event
    Blank,
}

/// Incremental decoder over a byte stream.
///
/// Keeps the trailing incomplete line buffered between `push` calls.
#[derive(Debug, Default)]
pub struct SseDecoder {
    buffer: String,
}

impl SseDecoder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Feed raw bytes; returns the lines completed by this frame.
    pub fn push(&mut self, bytes: &[u8]) -> Vec<SseLine> {
        self.buffer.push_str(&String::from_utf8_lossy(bytes));

        let mut lines = Vec::new();
        while let Some(pos) = self.buffer.find('\n') {
            let raw: String = self.buffer.drain(..=pos).collect();
            let line = raw.trim_end_matches(['\n', '\r']);
            if let Some(parsed) = Self::parse_line(line) {
                lines.push(parsed);
            }
        }
        lines
    }

    fn parse_line(line: &str) -> Option<SseLine> {
        if line.is_empty() {
            return Some(SseLine::Blank);
        }
        // comment line
        if line.starts_with(':') {
            return None;
        }
        if let Some(value) = line.strip_prefix("data:") {
            return Some(SseLine::Data(value.trim_start_matches(' ').to_string()));
        }
        if let Some(value) = line.strip_prefix("event:") {
            return Some(SseLine::Event(value.trim_start_matches(' ').to_string()));
        }
        // id:, retry: and unknown fields are irrelevant here
        None
    }
}

/// True when a data payload is the OpenAI-family end-of-stream marker.
/// Case-sensitive; trailing whitespace is tolerated.
pub fn is_done_marker(payload: &str) -> bool {
    payload.trim_end() == "[DONE]"
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn splits_data_lines() {
        let mut decoder = SseDecoder::new();
        let lines = decoder.push(b"data: {\"a\":1}\n\ndata: [DONE]\n\n");
        assert_eq!(
            lines,
            vec![
                SseLine::Data("{\"a\":1}".to_string()),
                SseLine::Blank,
                SseLine::Data("[DONE]".to_string()),
                SseLine::Blank,
            ]
        );
    }

    #[test]
    fn buffers_partial_lines_across_frames() {
        let mut decoder = SseDecoder::new();
        assert!(decoder.push(b"data: {\"id\":").is_empty());
        let lines = decoder.push(b"\"x\"}\n");
        assert_eq!(lines, vec![SseLine::Data("{\"id\":\"x\"}".to_string())]);
    }

    #[test]
    fn ignores_comments_and_unknown_fields() {
        let mut decoder = SseDecoder::new();
        let lines = decoder.push(b": keep-alive\nid: 42\nretry: 1000\ndata: x\n");
        assert_eq!(lines, vec![SseLine::Data("x".to_string())]);
    }

    #[test]
    fn surfaces_event_names() {
        let mut decoder = SseDecoder::new();
        let lines = decoder.push(b"event: message_start\ndata: {}\n");
        assert_eq!(
            lines,
            vec![
                SseLine::Event("message_start".to_string()),
                SseLine::Data("{}".to_string()),
            ]
        );
    }

    #[test]
    fn handles_crlf() {
        let mut decoder = SseDecoder::new();
        let lines = decoder.push(b"data: x\r\n\r\n");
        assert_eq!(
            lines,
            vec![SseLine::Data("x".to_string()), SseLine::Blank]
        );
    }

    #[test]
    fn done_marker_tolerates_trailing_whitespace() {
        assert!(is_done_marker("[DONE]"));
        assert!(is_done_marker("[DONE] "));
        assert!(!is_done_marker("[done]"));
        assert!(!is_done_marker(" [DONE]"));
    }
}
