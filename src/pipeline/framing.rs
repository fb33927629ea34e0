//! Line framing and JSON fragment joining.

use crate::pipeline::Framing;
use serde_json::Value;

/// Bytes received but not yet terminated by a newline.
///
/// Lines are decoded only once complete, so a multi-byte character split across
/// two reads is reassembled before UTF-8 decoding.
#[derive(Debug, Default)]
pub struct LineBuffer {
    buf: Vec<u8>,
}

impl LineBuffer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, chunk: &[u8]) {
        self.buf.extend_from_slice(chunk);
    }

    /// Next complete line without its terminator (`\n` or `\r\n`).
    pub fn next_line(&mut self) -> Option<String> {
        let idx = self.buf.iter().position(|b| *b == b'\n')?;
        let mut line: Vec<u8> = self.buf.drain(..=idx).collect();
        line.pop();
        if line.last() == Some(&b'\r') {
            line.pop();
        }
        Some(String::from_utf8_lossy(&line).into_owned())
    }

    /// Unterminated tail left at end of input, if it holds anything but whitespace.
    pub fn take_remainder(&mut self) -> Option<String> {
        let rest = std::mem::take(&mut self.buf);
        let text = String::from_utf8_lossy(&rest);
        let trimmed = text.trim();
        if trimmed.is_empty() {
            None
        } else {
            Some(trimmed.to_string())
        }
    }

    pub fn pending_bytes(&self) -> usize {
        self.buf.len()
    }
}

/// Payload carried by one line, or `None` for blank lines, comments and SSE fields
/// other than `data`.
pub fn payload_of(framing: Framing, line: &str) -> Option<&str> {
    let trimmed = line.trim();
    if trimmed.is_empty() {
        return None;
    }
    match framing {
        Framing::Sse => {
            // Ignore SSE comment lines
            if trimmed.starts_with(':') {
                return None;
            }
            let data = trimmed.strip_prefix("data:")?.trim_start();
            if data.is_empty() {
                None
            } else {
                Some(data)
            }
        }
        Framing::Ndjson | Framing::Document => Some(trimmed),
    }
}

#[derive(Debug, PartialEq)]
pub enum Joined {
    Complete(Value),
    /// Incomplete so far; feed the next payload.
    Pending,
    Malformed(String),
}

/// Joins JSON objects that a provider split across several payloads.
///
/// A fragment that fails with a premature end of input is held and retried with the
/// following payload appended, up to `max_joins` times. Syntax errors are final.
#[derive(Debug)]
pub struct FragmentJoiner {
    pending: String,
    joins: usize,
    max_joins: usize,
}

impl FragmentJoiner {
    pub fn new(max_joins: usize) -> Self {
        Self {
            pending: String::new(),
            joins: 0,
            max_joins,
        }
    }

    pub fn feed(&mut self, payload: &str) -> Joined {
        let continuing = !self.pending.is_empty();
        let mut candidate = std::mem::take(&mut self.pending);
        candidate.push_str(payload);

        match serde_json::from_str::<Value>(&candidate) {
            Ok(v) => {
                self.joins = 0;
                Joined::Complete(v)
            }
            Err(e) if e.is_eof() => {
                let joins = if continuing { self.joins + 1 } else { 0 };
                let exhausted = if continuing {
                    joins >= self.max_joins
                } else {
                    self.max_joins == 0
                };
                if exhausted {
                    self.joins = 0;
                    Joined::Malformed(format!(
                        "JSON fragment still incomplete after {} joins: {}",
                        joins,
                        preview(&candidate)
                    ))
                } else {
                    self.joins = joins;
                    self.pending = candidate;
                    Joined::Pending
                }
            }
            Err(e) => {
                self.joins = 0;
                Joined::Malformed(format!("{}: {}", e, preview(&candidate)))
            }
        }
    }

    pub fn is_pending(&self) -> bool {
        !self.pending.is_empty()
    }

    pub fn pending_preview(&self) -> String {
        preview(&self.pending)
    }
}

fn preview(s: &str) -> String {
    const MAX: usize = 80;
    if s.chars().count() <= MAX {
        s.to_string()
    } else {
        let head: String = s.chars().take(MAX).collect();
        format!("{}…", head)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn lines_resume_across_reads() {
        let mut lines = LineBuffer::new();
        lines.push(b"data: {\"a\"");
        assert_eq!(lines.next_line(), None);
        lines.push(b":1}\r\ndata: [DONE]\n");
        assert_eq!(lines.next_line().as_deref(), Some("data: {\"a\":1}"));
        assert_eq!(lines.next_line().as_deref(), Some("data: [DONE]"));
        assert_eq!(lines.next_line(), None);
        assert_eq!(lines.pending_bytes(), 0);
    }

    #[test]
    fn split_utf8_is_reassembled() {
        let text = "héllo\n".as_bytes();
        let mut lines = LineBuffer::new();
        lines.push(&text[..2]);
        lines.push(&text[2..]);
        assert_eq!(lines.next_line().as_deref(), Some("héllo"));
    }

    #[test]
    fn sse_payloads() {
        assert_eq!(payload_of(Framing::Sse, "data: {}"), Some("{}"));
        assert_eq!(payload_of(Framing::Sse, "data:{}"), Some("{}"));
        assert_eq!(payload_of(Framing::Sse, ": keep-alive"), None);
        assert_eq!(payload_of(Framing::Sse, "event: message_stop"), None);
        assert_eq!(payload_of(Framing::Sse, ""), None);
        assert_eq!(payload_of(Framing::Ndjson, " {\"done\":true} "), Some("{\"done\":true}"));
    }

    #[test]
    fn joins_split_objects() {
        let mut joiner = FragmentJoiner::new(3);
        assert_eq!(joiner.feed(r#"{"text":"hel"#), Joined::Pending);
        assert!(joiner.is_pending());
        assert_eq!(joiner.feed(r#"lo"}"#), Joined::Complete(json!({"text": "hello"})));
        assert!(!joiner.is_pending());
    }

    #[test]
    fn join_bound_is_enforced() {
        let mut joiner = FragmentJoiner::new(2);
        assert_eq!(joiner.feed(r#"{"a":"#), Joined::Pending);
        assert_eq!(joiner.feed(r#"["#), Joined::Pending);
        assert!(matches!(joiner.feed(r#"1,"#), Joined::Malformed(_)));
        assert!(!joiner.is_pending());
    }

    #[test]
    fn syntax_errors_are_final() {
        let mut joiner = FragmentJoiner::new(3);
        assert!(matches!(joiner.feed("not json"), Joined::Malformed(_)));
    }
}
