//! Incremental line framing for the child's output stream.
//!
//! The child writes newline-delimited JSON, but the pipe delivers arbitrary
//! byte chunks; a single line may arrive split across several reads. The
//! framer buffers the unterminated tail between calls so every returned line
//! is complete, regardless of how the chunks were cut.

/// Splits a raw byte stream into complete lines.
///
/// The pending buffer is unbounded: a child that never terminates a line
/// grows it without limit. Accepted limitation; truncating mid-line would
/// corrupt the protocol.
#[derive(Debug, Default)]
pub struct LineFramer {
    pending: Vec<u8>,
}

impl LineFramer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Feed one chunk, returning every newly completed line in arrival order.
    ///
    /// Lines are terminated by `\n`; a preceding `\r` is stripped. Empty and
    /// whitespace-only lines are dropped. Bytes after the last terminator are
    /// retained for the next call.
    pub fn feed(&mut self, chunk: &[u8]) -> Vec<String> {
        self.pending.extend_from_slice(chunk);

        let mut lines = Vec::new();
        while let Some(pos) = self.pending.iter().position(|&b| b == b'\n') {
            let mut raw: Vec<u8> = self.pending.drain(..=pos).collect();
            raw.pop();
            if raw.last() == Some(&b'\r') {
                raw.pop();
            }
            let line = String::from_utf8_lossy(&raw);
            if !line.trim().is_empty() {
                lines.push(line.into_owned());
            }
        }
        lines
    }

    /// The buffered, not-yet-terminated tail.
    pub fn pending(&self) -> &[u8] {
        &self.pending
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_whole_lines_pass_through() {
        let mut framer = LineFramer::new();
        let lines = framer.feed(b"{\"id\":1}\n{\"id\":2}\n");
        assert_eq!(lines, vec!["{\"id\":1}", "{\"id\":2}"]);
        assert!(framer.pending().is_empty());
    }

    #[test]
    fn test_split_line_reassembled_across_feeds() {
        let mut framer = LineFramer::new();
        assert!(framer.feed(b"{\"id\":1,\"re").is_empty());
        assert_eq!(framer.pending(), b"{\"id\":1,\"re");
        let lines = framer.feed(b"sult\":\"ok\"}\n");
        assert_eq!(lines, vec!["{\"id\":1,\"result\":\"ok\"}"]);
        assert!(framer.pending().is_empty());
    }

    #[test]
    fn test_split_is_equivalent_to_whole() {
        let input = b"{\"jsonrpc\":\"2.0\",\"id\":7,\"result\":null}\n";
        for cut in 0..input.len() {
            let mut whole = LineFramer::new();
            let mut split = LineFramer::new();
            let expected = whole.feed(input);
            let mut got = split.feed(&input[..cut]);
            got.extend(split.feed(&input[cut..]));
            assert_eq!(got, expected, "split at byte {}", cut);
        }
    }

    #[test]
    fn test_crlf_terminator_stripped() {
        let mut framer = LineFramer::new();
        let lines = framer.feed(b"{\"id\":1}\r\n{\"id\":2}\r\n");
        assert_eq!(lines, vec!["{\"id\":1}", "{\"id\":2}"]);
    }

    #[test]
    fn test_blank_and_whitespace_lines_dropped() {
        let mut framer = LineFramer::new();
        let lines = framer.feed(b"\n   \n\t\r\n{\"id\":1}\n\n");
        assert_eq!(lines, vec!["{\"id\":1}"]);
    }

    #[test]
    fn test_multibyte_char_split_across_chunks() {
        let mut framer = LineFramer::new();
        let input = "{\"name\":\"caf\u{e9}\"}\n".as_bytes();
        // Cut inside the two-byte UTF-8 sequence.
        let cut = input.len() - 4;
        assert!(framer.feed(&input[..cut]).is_empty());
        let lines = framer.feed(&input[cut..]);
        assert_eq!(lines, vec!["{\"name\":\"caf\u{e9}\"}"]);
    }

    #[test]
    fn test_unterminated_tail_stays_buffered() {
        let mut framer = LineFramer::new();
        assert!(framer.feed(b"no newline yet").is_empty());
        assert_eq!(framer.pending(), b"no newline yet");
    }
}
