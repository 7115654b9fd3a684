//! Streaming chunked-transfer-encoding decoder. Trailers (headers sent
//! after the terminal `0` chunk) are parsed the same way a status block's
//! headers are, and handed back as ordinary `(name, value)` pairs.

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
enum State {
    ChunkSize,
    ChunkData(usize),
    ChunkTrailingCrlf,
    Trailers,
    Done,
}

pub struct ChunkedDecoder {
    state: State,
    trailers: Vec<(String, String)>,
}

impl Default for ChunkedDecoder {
    fn default() -> Self {
        Self { state: State::ChunkSize, trailers: Vec::new() }
    }
}

impl ChunkedDecoder {
    #[must_use]
    pub fn is_done(&self) -> bool {
        self.state == State::Done
    }

    #[must_use]
    pub fn trailers(&self) -> &[(String, String)] {
        &self.trailers
    }

    /// Consumes as much of `buf` as forms complete chunk framing, appending
    /// decoded body bytes to `out`. Returns the number of bytes consumed
    /// from the front of `buf`; a partial chunk size/trailer line at the
    /// end of `buf` is left unconsumed for the next call.
    pub fn feed(&mut self, buf: &[u8], out: &mut Vec<u8>) -> usize {
        let mut pos = 0;
        loop {
            match self.state {
                State::Done => return pos,
                State::ChunkSize => {
                    let Some(nl) = memchr::memchr(b'\n', &buf[pos..]) else { return pos };
                    let line_end = pos + nl;
                    let line = trim_cr(&buf[pos..line_end]);
                    pos = line_end + 1;
                    let size_text = line.split(|&b| b == b';').next().unwrap_or(line);
                    let size = match std::str::from_utf8(size_text).ok().and_then(|s| usize::from_str_radix(s.trim(), 16).ok()) {
                        Some(size) => size,
                        None => {
                            self.state = State::Done;
                            return pos;
                        }
                    };
                    self.state = if size == 0 { State::Trailers } else { State::ChunkData(size) };
                }
                State::ChunkData(remaining) => {
                    let available = buf.len() - pos;
                    let take = available.min(remaining);
                    out.extend_from_slice(&buf[pos..pos + take]);
                    pos += take;
                    let left = remaining - take;
                    if left > 0 {
                        self.state = State::ChunkData(left);
                        return pos;
                    }
                    self.state = State::ChunkTrailingCrlf;
                }
                State::ChunkTrailingCrlf => {
                    let Some(nl) = memchr::memchr(b'\n', &buf[pos..]) else { return pos };
                    pos += nl + 1;
                    self.state = State::ChunkSize;
                }
                State::Trailers => {
                    let Some(nl) = memchr::memchr(b'\n', &buf[pos..]) else { return pos };
                    let line_end = pos + nl;
                    let line = trim_cr(&buf[pos..line_end]);
                    pos = line_end + 1;
                    if line.is_empty() {
                        self.state = State::Done;
                        return pos;
                    }
                    if let Some(colon) = line.iter().position(|&b| b == b':') {
                        let name = String::from_utf8_lossy(&line[..colon]).trim().to_string();
                        let value = String::from_utf8_lossy(&line[colon + 1..]).trim().to_string();
                        self.trailers.push((name, value));
                    }
                }
            }
        }
    }
}

fn trim_cr(line: &[u8]) -> &[u8] {
    line.strip_suffix(b"\r").unwrap_or(line)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn decodes_a_single_chunk_with_terminator() {
        let mut decoder = ChunkedDecoder::default();
        let mut out = Vec::new();
        let consumed = decoder.feed(b"5\r\nhello\r\n0\r\n\r\n", &mut out);
        assert_eq!(out, b"hello");
        assert!(decoder.is_done());
        assert_eq!(consumed, "5\r\nhello\r\n0\r\n\r\n".len());
    }

    #[test]
    fn decodes_across_multiple_feed_calls() {
        let mut decoder = ChunkedDecoder::default();
        let mut out = Vec::new();
        decoder.feed(b"3\r\nab", &mut out);
        assert_eq!(out, b"ab");
        assert!(!decoder.is_done());
        decoder.feed(b"c\r\n0\r\n\r\n", &mut out);
        assert_eq!(out, b"abc");
        assert!(decoder.is_done());
    }

    #[test]
    fn collects_trailer_headers_after_final_chunk() {
        let mut decoder = ChunkedDecoder::default();
        let mut out = Vec::new();
        decoder.feed(b"0\r\nX-Checksum: deadbeef\r\n\r\n", &mut out);
        assert!(decoder.is_done());
        assert_eq!(decoder.trailers(), &[("X-Checksum".to_string(), "deadbeef".to_string())]);
    }
}
