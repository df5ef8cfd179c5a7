//! Incremental decoder for the newline-delimited record protocol
//!
//! The response body is a sequence of `<tag>: <payload>` lines. Network reads
//! split those lines at arbitrary byte positions, so [`RecordDecoder`] keeps
//! the unterminated tail of the previous read and only hands out complete
//! lines. [`classify_record`] turns one line into a typed [`StreamEvent`].

use crate::config::GuestRateLimitSentinel;
use crate::protocol::{ErrorEvent, RecordTag, ResultPayload, StreamEvent};
use thiserror::Error;
use tracing::debug;

/// Shown for a guest-limit error record that carries no message of its own
pub const GUEST_LIMIT_MESSAGE: &str = "Guest message limit reached. Sign in to continue.";

/// Failures of the line reassembly itself
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DecodeError {
    #[error("record exceeds {limit} bytes without a line terminator")]
    RecordTooLong { limit: usize },
}

/// Reassembles complete lines from arbitrarily split byte chunks
#[derive(Debug)]
pub struct RecordDecoder {
    buf: Vec<u8>,
    /// Start of the first line not yet handed out
    consumed: usize,
    /// Bytes of `buf` already searched for a newline
    scanned: usize,
    max_record_bytes: usize,
}

impl RecordDecoder {
    pub fn new(max_record_bytes: usize) -> Self {
        Self {
            buf: Vec::new(),
            consumed: 0,
            scanned: 0,
            max_record_bytes,
        }
    }

    /// Append bytes from one network read.
    ///
    /// Lines handed out since the previous read are dropped from the buffer
    /// here, once per read rather than once per line.
    pub fn push_chunk(&mut self, chunk: &[u8]) {
        if self.consumed > 0 {
            self.buf.drain(..self.consumed);
            self.scanned -= self.consumed;
            self.consumed = 0;
        }
        self.buf.extend_from_slice(chunk);
    }

    /// Take the next complete line, without its terminator.
    ///
    /// Returns `Ok(None)` when more bytes are needed.
    pub fn next_line(&mut self) -> Result<Option<String>, DecodeError> {
        match self.buf[self.scanned..].iter().position(|b| *b == b'\n') {
            Some(offset) => {
                let idx = self.scanned + offset;
                if idx - self.consumed > self.max_record_bytes {
                    return Err(DecodeError::RecordTooLong {
                        limit: self.max_record_bytes,
                    });
                }
                let line = line_from_bytes(&self.buf[self.consumed..idx]);
                self.consumed = idx + 1;
                self.scanned = self.consumed;
                Ok(Some(line))
            }
            None => {
                self.scanned = self.buf.len();
                if self.buffered_len() > self.max_record_bytes {
                    return Err(DecodeError::RecordTooLong {
                        limit: self.max_record_bytes,
                    });
                }
                Ok(None)
            }
        }
    }

    /// Flush an unterminated final line once the body has ended
    pub fn finish(&mut self) -> Option<String> {
        let tail = &self.buf[self.consumed..];
        let line = (!tail.is_empty()).then(|| line_from_bytes(tail));
        self.buf.clear();
        self.consumed = 0;
        self.scanned = 0;
        line
    }

    /// Bytes currently held for an incomplete record
    pub fn buffered_len(&self) -> usize {
        self.buf.len() - self.consumed
    }
}

fn line_from_bytes(bytes: &[u8]) -> String {
    let bytes = bytes.strip_suffix(b"\r").unwrap_or(bytes);
    String::from_utf8_lossy(bytes).into_owned()
}

/// Classify one complete line.
///
/// Returns `None` for lines that carry no event: blank lines, lines without a
/// tag separator and unknown tags.
pub fn classify_record(line: &str, sentinel: &GuestRateLimitSentinel) -> Option<StreamEvent> {
    if line.trim().is_empty() {
        return None;
    }

    let Some((raw_tag, rest)) = line.split_once(':') else {
        debug!("Skipping untagged record ({} bytes)", line.len());
        return None;
    };

    let Some(tag) = RecordTag::parse(raw_tag.trim()) else {
        debug!("Skipping record with unknown tag '{}'", raw_tag.trim());
        return None;
    };

    let payload = rest.strip_prefix(' ').unwrap_or(rest);

    let event = match tag {
        RecordTag::Log => StreamEvent::Log {
            text: payload.to_string(),
        },
        RecordTag::Chunk => StreamEvent::Chunk {
            text: payload.to_string(),
        },
        RecordTag::Result => decode_result(payload),
        RecordTag::Error => decode_error(payload, sentinel),
    };

    Some(event)
}

fn decode_result(payload: &str) -> StreamEvent {
    match serde_json::from_str::<ResultPayload>(payload) {
        Ok(result) => StreamEvent::Result(result),
        Err(e) => StreamEvent::Error(ErrorEvent::generic(format!(
            "malformed result record: {}",
            e
        ))),
    }
}

fn decode_error(payload: &str, sentinel: &GuestRateLimitSentinel) -> StreamEvent {
    let value = match serde_json::from_str::<serde_json::Value>(payload) {
        Ok(value) => value,
        Err(e) => {
            return StreamEvent::Error(ErrorEvent::generic(format!(
                "malformed error record: {}",
                e
            )))
        }
    };

    let message = value.get("message").and_then(|m| m.as_str());

    // the sentinel alone decides the kind, with or without a message
    if sentinel.matches(&value) {
        return StreamEvent::Error(ErrorEvent::rate_limited_guest(
            message.unwrap_or(GUEST_LIMIT_MESSAGE),
        ));
    }

    match message {
        Some(message) => StreamEvent::Error(ErrorEvent::generic(message)),
        None => StreamEvent::Error(ErrorEvent::generic(
            "malformed error record: missing string field 'message'",
        )),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::ErrorKind;

    fn drain(decoder: &mut RecordDecoder) -> Vec<String> {
        let mut lines = Vec::new();
        while let Some(line) = decoder.next_line().unwrap() {
            lines.push(line);
        }
        lines
    }

    #[test]
    fn test_decoder_handles_partial_chunk_boundaries() {
        let mut decoder = RecordDecoder::new(1024);
        decoder.push_chunk(b"log: thin");
        assert!(drain(&mut decoder).is_empty());
        decoder.push_chunk(b"king\nchunk: He");
        assert_eq!(drain(&mut decoder), vec!["log: thinking"]);
        decoder.push_chunk(b"llo\r\n");
        assert_eq!(drain(&mut decoder), vec!["chunk: Hello"]);
        assert_eq!(decoder.buffered_len(), 0);
    }

    #[test]
    fn test_multibyte_char_split_across_reads() {
        let mut decoder = RecordDecoder::new(1024);
        let bytes = "chunk: Zürich\n".as_bytes();
        let split = bytes.iter().position(|b| *b == 0xC3).unwrap() + 1;
        decoder.push_chunk(&bytes[..split]);
        assert!(drain(&mut decoder).is_empty());
        decoder.push_chunk(&bytes[split..]);
        assert_eq!(drain(&mut decoder), vec!["chunk: Zürich"]);
    }

    #[test]
    fn test_finish_flushes_unterminated_line() {
        let mut decoder = RecordDecoder::new(1024);
        decoder.push_chunk(b"chunk: a\nresult: {}");
        assert_eq!(drain(&mut decoder), vec!["chunk: a"]);
        assert_eq!(decoder.finish().as_deref(), Some("result: {}"));
        assert_eq!(decoder.finish(), None);
    }

    #[test]
    fn test_record_limit() {
        let mut decoder = RecordDecoder::new(8);
        decoder.push_chunk(b"chunk: 0123456789");
        assert_eq!(
            decoder.next_line(),
            Err(DecodeError::RecordTooLong { limit: 8 })
        );

        let mut decoder = RecordDecoder::new(8);
        decoder.push_chunk(b"log: ok\n");
        assert_eq!(decoder.next_line().unwrap().as_deref(), Some("log: ok"));
    }

    #[test]
    fn test_classify_plain_text_records() {
        let sentinel = GuestRateLimitSentinel::default();
        assert_eq!(
            classify_record("log: thinking", &sentinel),
            Some(StreamEvent::Log {
                text: "thinking".to_string()
            })
        );
        assert_eq!(
            classify_record("chunk: , world", &sentinel),
            Some(StreamEvent::Chunk {
                text: ", world".to_string()
            })
        );
        // only the separator space is removed
        assert_eq!(
            classify_record("chunk:   indented", &sentinel),
            Some(StreamEvent::Chunk {
                text: "  indented".to_string()
            })
        );
    }

    #[test]
    fn test_classify_skips_noise() {
        let sentinel = GuestRateLimitSentinel::default();
        assert_eq!(classify_record("", &sentinel), None);
        assert_eq!(classify_record("   ", &sentinel), None);
        assert_eq!(classify_record("no separator here", &sentinel), None);
        assert_eq!(classify_record("heartbeat: 1", &sentinel), None);
    }

    #[test]
    fn test_classify_result() {
        let sentinel = GuestRateLimitSentinel::default();
        let event = classify_record(
            r#"result: {"response":"Hello, world","sources":[]}"#,
            &sentinel,
        );
        assert_eq!(
            event,
            Some(StreamEvent::Result(ResultPayload::with_answer("Hello, world")))
        );
    }

    #[test]
    fn test_malformed_json_is_generic_error() {
        let sentinel = GuestRateLimitSentinel::default();
        let Some(StreamEvent::Error(err)) = classify_record("result: {not json", &sentinel) else {
            panic!("expected error event");
        };
        assert_eq!(err.kind, ErrorKind::Generic);
        assert!(err.message.starts_with("malformed result record"));

        let Some(StreamEvent::Error(err)) =
            classify_record(r#"error: {"code":"UPSTREAM"}"#, &sentinel)
        else {
            panic!("expected error event");
        };
        assert_eq!(err.kind, ErrorKind::Generic);
        assert!(err.message.starts_with("malformed error record"));
    }

    #[test]
    fn test_sentinel_without_message_is_guest_limit() {
        let sentinel = GuestRateLimitSentinel::default();
        let event = classify_record(r#"error: {"code":"GUEST_RATE_LIMIT"}"#, &sentinel);
        assert_eq!(
            event,
            Some(StreamEvent::Error(ErrorEvent::rate_limited_guest(
                GUEST_LIMIT_MESSAGE
            )))
        );
    }

    #[test]
    fn test_many_lines_in_one_read_compact_once() {
        let mut decoder = RecordDecoder::new(64);
        let body: String = (0..500).map(|i| format!("chunk: {i}\n")).collect();
        decoder.push_chunk(body.as_bytes());
        decoder.push_chunk(b"log: ta");

        let lines = drain(&mut decoder);
        assert_eq!(lines.len(), 500);
        assert_eq!(lines[499], "chunk: 499");
        assert_eq!(decoder.buffered_len(), "log: ta".len());

        decoder.push_chunk(b"il\n");
        assert_eq!(decoder.buf.len(), "log: tail\n".len());
        assert_eq!(drain(&mut decoder), vec!["log: tail"]);
        assert_eq!(decoder.buffered_len(), 0);
    }

    #[test]
    fn test_error_classification_uses_sentinel() {
        let sentinel = GuestRateLimitSentinel {
            field: "error_type".to_string(),
            value: "guest_limit".to_string(),
        };
        let Some(StreamEvent::Error(err)) = classify_record(
            r#"error: {"message":"Sign in to keep chatting","error_type":"guest_limit"}"#,
            &sentinel,
        ) else {
            panic!("expected error event");
        };
        assert_eq!(err, ErrorEvent::rate_limited_guest("Sign in to keep chatting"));

        // the default sentinel no longer applies
        let Some(StreamEvent::Error(err)) = classify_record(
            r#"error: {"message":"quota","code":"GUEST_RATE_LIMIT"}"#,
            &sentinel,
        ) else {
            panic!("expected error event");
        };
        assert_eq!(err.kind, ErrorKind::Generic);
    }
}
