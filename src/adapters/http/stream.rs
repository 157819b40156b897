//! Framing for the streamed reply body.
//!
//! The service writes newline-delimited parts: `0:"<text>"` carries answer text (the first
//! one carries the encoded context block and marker), `3:<message>` reports a failure.
//! Some notices arrive as bare text with no part prefix.

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StreamPart {
    Text(String),
    Error(String),
    Ignored,
}

#[derive(Debug, Default)]
pub struct StreamDecoder {
    buffer: Vec<u8>,
}

impl StreamDecoder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Consumes a body chunk and returns the parts of every line it completed.
    pub fn feed(&mut self, chunk: &[u8]) -> Vec<StreamPart> {
        self.buffer.extend_from_slice(chunk);

        let mut parts = Vec::new();
        while let Some(line_end) = self.buffer.iter().position(|b| *b == b'\n') {
            let line = self.buffer.drain(..=line_end).collect::<Vec<u8>>();
            let line = String::from_utf8_lossy(&line[..line.len() - 1]);
            let line = line.strip_suffix('\r').unwrap_or(&line);
            if let Some(part) = parse_line(line, true) {
                parts.push(part);
            }
        }
        parts
    }

    /// Flushes a trailing line that had no newline.
    pub fn finish(&mut self) -> Option<StreamPart> {
        if self.buffer.is_empty() {
            return None;
        }
        let rest = std::mem::take(&mut self.buffer);
        let line = String::from_utf8_lossy(&rest);
        parse_line(line.trim_end_matches('\r'), false)
    }
}

fn parse_line(line: &str, terminated: bool) -> Option<StreamPart> {
    if line.is_empty() {
        return None;
    }

    if let Some((code, payload)) = split_part(line) {
        return Some(match code {
            '0' => StreamPart::Text(unescape_text(payload)),
            '3' => StreamPart::Error(unescape_text(payload)),
            _ => StreamPart::Ignored,
        });
    }

    let mut text = line.to_string();
    if terminated {
        text.push('\n');
    }
    Some(StreamPart::Text(text))
}

fn split_part(line: &str) -> Option<(char, &str)> {
    let mut chars = line.chars();
    let code = chars.next()?;
    if !(code.is_ascii_digit() || ('a'..='k').contains(&code)) {
        return None;
    }
    let payload = chars.as_str().strip_prefix(':')?;
    let looks_typed = match code {
        '3' => true,
        '0' => payload.starts_with('"'),
        _ => payload
            .chars()
            .next()
            .is_some_and(|c| matches!(c, '"' | '[' | '{') || c.is_ascii_digit()),
    };
    looks_typed.then_some((code, payload))
}

/// The service escapes only quotes and newlines, so payloads are not always valid JSON.
fn unescape_text(payload: &str) -> String {
    if let Ok(text) = serde_json::from_str::<String>(payload) {
        return text;
    }
    let inner = payload
        .strip_prefix('"')
        .and_then(|rest| rest.strip_suffix('"'))
        .unwrap_or(payload);
    inner.replace("\\n", "\n").replace("\\\"", "\"")
}

#[cfg(test)]
mod tests {
    use super::{StreamDecoder, StreamPart};

    fn text(value: &str) -> StreamPart {
        StreamPart::Text(value.to_string())
    }

    #[test]
    fn decodes_text_parts_across_chunk_boundaries() {
        let mut decoder = StreamDecoder::new();
        let mut parts = decoder.feed(b"0:\"eyJjb250ZXh0IjpbXX0=__LLM_RESPONSE__\"\n0:\"Hel");
        parts.extend(decoder.feed(b"lo\\nworld\"\n"));
        assert_eq!(
            parts,
            vec![text("eyJjb250ZXh0IjpbXX0=__LLM_RESPONSE__"), text("Hello\nworld")]
        );
        assert_eq!(decoder.finish(), None);
    }

    #[test]
    fn multibyte_characters_split_between_chunks_survive() {
        let bytes = "0:\"café\"\n".as_bytes();
        let (head, tail) = bytes.split_at(6);
        let mut decoder = StreamDecoder::new();
        let mut parts = decoder.feed(head);
        parts.extend(decoder.feed(tail));
        assert_eq!(parts, vec![text("café")]);
    }

    #[test]
    fn lenient_unescape_for_invalid_json_payloads() {
        let mut decoder = StreamDecoder::new();
        let parts = decoder.feed(b"0:\"path C:\\temp\\x and \\\"quoted\\\"\"\n");
        assert_eq!(parts, vec![text("path C:\\temp\\x and \"quoted\"")]);
    }

    #[test]
    fn error_parts_accept_bare_and_quoted_messages() {
        let mut decoder = StreamDecoder::new();
        let parts = decoder.feed(b"3:Error generating response: boom\r\n3:\"quoted\"\n");
        assert_eq!(
            parts,
            vec![
                StreamPart::Error("Error generating response: boom".to_string()),
                StreamPart::Error("quoted".to_string()),
            ]
        );
    }

    #[test]
    fn unknown_typed_parts_are_ignored() {
        let mut decoder = StreamDecoder::new();
        let parts = decoder.feed(b"d:{\"finishReason\":\"stop\"}\n8:[{}]\n");
        assert_eq!(parts, vec![StreamPart::Ignored, StreamPart::Ignored]);
    }

    #[test]
    fn bare_text_without_newline_is_flushed_on_finish() {
        let mut decoder = StreamDecoder::new();
        assert!(decoder
            .feed(b"No documents found for the provided knowledge bases")
            .is_empty());
        assert_eq!(
            decoder.finish(),
            Some(text("No documents found for the provided knowledge bases"))
        );
    }

    #[test]
    fn prose_that_resembles_a_prefix_stays_text() {
        let mut decoder = StreamDecoder::new();
        let parts = decoder.feed(b"a: first option\n\n");
        assert_eq!(parts, vec![text("a: first option\n")]);
    }
}
