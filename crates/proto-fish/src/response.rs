//! Marker-line detection: `### NNN` at the start of a line ends a reply,
//! with every line since the previous marker collected as its free-form
//! message text.

/// A completed reply: the three-digit marker code and the text the shell
/// emitted before it.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct Reply {
    pub code: u16,
    pub message: String,
}

impl Reply {
    #[must_use]
    pub fn is_success(&self) -> bool {
        self.code < 500
    }

    #[must_use]
    pub fn is_data_begin(&self) -> bool {
        self.code == 100
    }
}

/// Parses a single line as a marker (`### NNN...`), if it is one.
#[must_use]
pub fn parse_marker(line: &str) -> Option<u16> {
    let rest = line.strip_prefix("### ")?;
    let digits: String = rest.chars().take_while(char::is_ascii_digit).collect();
    if digits.len() < 3 {
        return None;
    }
    digits.parse().ok()
}

/// Accumulates free-text lines until a marker line completes a [`Reply`].
#[derive(Default)]
pub struct ReplyAccumulator {
    message: String,
}

impl ReplyAccumulator {
    /// Feeds one line (without its trailing newline). Returns a completed
    /// reply if `line` was a marker; otherwise the line is appended to the
    /// in-flight message and `None` is returned.
    pub fn feed_line(&mut self, line: &str) -> Option<Reply> {
        if let Some(code) = parse_marker(line) {
            let message = std::mem::take(&mut self.message);
            return Some(Reply { code, message });
        }
        if !self.message.is_empty() {
            self.message.push('\n');
        }
        self.message.push_str(line);
        None
    }
}

/// Finds the byte offset of the next marker prefix in a raw (not
/// necessarily line-aligned) byte buffer, used while streaming a file
/// body so binary data is never mistaken for text lines.
#[must_use]
pub fn find_marker(bytes: &[u8]) -> Option<usize> {
    memchr::memmem::find(bytes, b"### ")
}

const MARKER_PREFIX: &[u8] = b"### ";

/// The length of the longest suffix of `bytes` that is also a proper
/// prefix of `"### "`, so a marker split across two reads is never
/// flushed to the caller as file data.
#[must_use]
pub fn partial_marker_suffix_len(bytes: &[u8]) -> usize {
    let max = MARKER_PREFIX.len().min(bytes.len());
    for len in (1..=max).rev() {
        if bytes[bytes.len() - len..] == MARKER_PREFIX[..len] {
            return len;
        }
    }
    0
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn marker_line_parses_its_code() {
        assert_eq!(parse_marker("### 200"), Some(200));
        assert_eq!(parse_marker("### 000 trailing text"), Some(0));
        assert_eq!(parse_marker("not a marker"), None);
    }

    #[test]
    fn accumulator_collects_lines_until_marker() {
        let mut acc = ReplyAccumulator::default();
        assert_eq!(acc.feed_line("-rw-r--r-- 1 a a 10 Jan  1 00:00 file"), None);
        let reply = acc.feed_line("### 200").unwrap();
        assert_eq!(reply.code, 200);
        assert!(reply.message.starts_with("-rw-r--r--"));
    }

    #[test]
    fn find_marker_locates_embedded_prefix_in_binary_data() {
        let body = b"abc\x00def### 200\n";
        assert_eq!(find_marker(body), Some(7));
    }

    #[test]
    fn partial_suffix_detects_a_marker_split_across_reads() {
        assert_eq!(partial_marker_suffix_len(b"some data ##"), 2);
        assert_eq!(partial_marker_suffix_len(b"some data"), 0);
        assert_eq!(partial_marker_suffix_len(b"### "), 4);
    }
}
