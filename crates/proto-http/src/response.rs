//! Status-line and header parsing. Headers arrive as one `\r\n`-terminated
//! block; this only ever looks at bytes already buffered, so it is driven
//! incrementally by whatever has accumulated in the engine's read buffer.

/// A parsed response header block, lowercased header names for
/// case-insensitive lookup.
#[derive(Clone, Debug)]
pub struct Response {
    pub status: u16,
    pub reason: String,
    pub headers: Vec<(String, String)>,
}

impl Response {
    #[must_use]
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers.iter().find(|(k, _)| k.eq_ignore_ascii_case(name)).map(|(_, v)| v.as_str())
    }

    #[must_use]
    pub fn content_length(&self) -> Option<u64> {
        self.header("content-length").and_then(|v| v.trim().parse().ok())
    }

    #[must_use]
    pub fn is_chunked(&self) -> bool {
        self.header("transfer-encoding").is_some_and(|v| v.eq_ignore_ascii_case("chunked"))
    }

    #[must_use]
    pub fn is_redirect(&self) -> bool {
        matches!(self.status, 301 | 302 | 303 | 307 | 308)
    }

    /// Whether the connection stays usable for another request: success or
    /// redirect statuses only, and never on a method the caller marks as
    /// mutating a body it can't safely discard (callers decide that).
    #[must_use]
    pub fn keeps_alive(&self) -> bool {
        if self.header("connection").is_some_and(|v| v.eq_ignore_ascii_case("close")) {
            return false;
        }
        matches!(self.status, 200..=299 | 301..=308 | 404 | 416)
    }

    /// Extracts the total resource size lftp's HTTP backend recovers from
    /// a 416 Requested Range Not Satisfiable: `Content-Range: bytes */SIZE`.
    #[must_use]
    pub fn unsatisfiable_range_size(&self) -> Option<u64> {
        let value = self.header("content-range")?;
        let (_, after_slash) = value.rsplit_once('/')?;
        after_slash.trim().parse().ok()
    }
}

/// Looks for the blank-line terminator (`\r\n\r\n`) of a header block in
/// `buf`. Returns the header block (without the terminator) and the total
/// byte length consumed including it.
#[must_use]
pub fn find_header_block(buf: &[u8]) -> Option<(&[u8], usize)> {
    let pos = memchr::memmem::find(buf, b"\r\n\r\n")?;
    Some((&buf[..pos], pos + 4))
}

#[derive(Debug, thiserror::Error)]
pub enum ParseError {
    #[error("malformed status line: {0}")]
    BadStatusLine(String),
    #[error("malformed header line: {0}")]
    BadHeaderLine(String),
}

/// Parses a complete header block (as returned by [`find_header_block`],
/// status line plus header lines, no terminating blank line) into a
/// [`Response`].
pub fn parse_headers(block: &[u8]) -> Result<Response, ParseError> {
    let text = String::from_utf8_lossy(block);
    let mut lines = text.split("\r\n");

    let status_line = lines.next().unwrap_or_default();
    let mut parts = status_line.splitn(3, ' ');
    let _version = parts.next();
    let status: u16 = parts
        .next()
        .and_then(|s| s.parse().ok())
        .ok_or_else(|| ParseError::BadStatusLine(status_line.to_string()))?;
    let reason = parts.next().unwrap_or_default().to_string();

    let mut headers = Vec::new();
    for line in lines {
        if line.is_empty() {
            continue;
        }
        let (name, value) = line.split_once(':').ok_or_else(|| ParseError::BadHeaderLine(line.to_string()))?;
        headers.push((name.trim().to_string(), value.trim().to_string()));
    }

    Ok(Response { status, reason, headers })
}
