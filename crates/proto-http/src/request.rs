//! Builds request lines and header blocks for every method the engine
//! issues. Every builder returns the bytes ready to write to the wire;
//! headers are appended in a fixed order to keep golden-trace diffs small.

use base64::Engine;

use xfer_path::Path;

/// A range restriction for a GET (resume download) or PUT (resume upload).
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum Range {
    /// `bytes=pos-`
    From(u64),
    /// `bytes=pos-limit-1`
    Bounded(u64, u64),
}

impl Range {
    #[must_use]
    pub fn header_value(&self) -> String {
        match self {
            Range::From(pos) => format!("bytes={pos}-"),
            Range::Bounded(pos, limit) => format!("bytes={pos}-{}", limit.saturating_sub(1)),
        }
    }
}

pub struct RequestBuilder {
    lines: Vec<String>,
}

impl RequestBuilder {
    #[must_use]
    pub fn new(method: &str, target: &str) -> Self {
        Self { lines: vec![format!("{method} {target} HTTP/1.1")] }
    }

    #[must_use]
    pub fn header(mut self, name: &str, value: impl AsRef<str>) -> Self {
        self.lines.push(format!("{name}: {}", value.as_ref()));
        self
    }

    #[must_use]
    pub fn header_opt(self, name: &str, value: Option<&str>) -> Self {
        match value {
            Some(v) => self.header(name, v),
            None => self,
        }
    }

    #[must_use]
    pub fn basic_auth(self, user: &str, password: &str) -> Self {
        let token = base64::engine::general_purpose::STANDARD.encode(format!("{user}:{password}"));
        self.header("Authorization", format!("Basic {token}"))
    }

    #[must_use]
    pub fn proxy_basic_auth(self, user: &str, password: &str) -> Self {
        let token = base64::engine::general_purpose::STANDARD.encode(format!("{user}:{password}"));
        self.header("Proxy-Authorization", format!("Basic {token}"))
    }

    #[must_use]
    pub fn finish(mut self) -> Vec<u8> {
        self.lines.push(String::new());
        self.lines.push(String::new());
        self.lines.join("\r\n").into_bytes()
    }
}

fn target_path(path: &Path) -> String {
    let text = path.to_string();
    if text.is_empty() {
        "/".to_string()
    } else if text.starts_with('/') {
        text
    } else {
        format!("/{text}")
    }
}

pub fn get(host: &str, path: &Path, user_agent: &str, range: Option<Range>) -> Vec<u8> {
    RequestBuilder::new("GET", &target_path(path))
        .header("Host", host)
        .header("User-Agent", user_agent)
        .header("Connection", "keep-alive")
        .header_opt("Range", range.as_ref().map(Range::header_value).as_deref())
        .finish()
}

pub fn head(host: &str, path: &Path, user_agent: &str) -> Vec<u8> {
    RequestBuilder::new("HEAD", &target_path(path))
        .header("Host", host)
        .header("User-Agent", user_agent)
        .header("Connection", "keep-alive")
        .finish()
}

pub fn put(host: &str, path: &Path, user_agent: &str, content_length: u64, resume_pos: Option<u64>) -> Vec<u8> {
    let content_range = resume_pos.filter(|&pos| pos > 0).map(|pos| format!("bytes {pos}-{}/*", pos + content_length - 1));
    RequestBuilder::new("PUT", &target_path(path))
        .header("Host", host)
        .header("User-Agent", user_agent)
        .header("Connection", "keep-alive")
        .header("Content-Length", content_length.to_string())
        .header_opt("Content-Range", content_range.as_deref())
        .finish()
}

pub fn delete(host: &str, path: &Path, user_agent: &str) -> Vec<u8> {
    RequestBuilder::new("DELETE", &target_path(path))
        .header("Host", host)
        .header("User-Agent", user_agent)
        .header("Connection", "keep-alive")
        .finish()
}

pub fn mkcol(host: &str, path: &Path, user_agent: &str) -> Vec<u8> {
    RequestBuilder::new("MKCOL", &target_path(path))
        .header("Host", host)
        .header("User-Agent", user_agent)
        .header("Connection", "keep-alive")
        .finish()
}

pub fn mv(host: &str, path: &Path, destination: &str, user_agent: &str) -> Vec<u8> {
    RequestBuilder::new("MOVE", &target_path(path))
        .header("Host", host)
        .header("User-Agent", user_agent)
        .header("Destination", destination)
        .header("Connection", "keep-alive")
        .finish()
}

/// `Depth: 1` lists `path`'s immediate children; `Depth: 0` asks only
/// about `path` itself, used as a cheap existence/type check.
pub fn propfind(host: &str, path: &Path, user_agent: &str, depth: u8) -> Vec<u8> {
    const BODY: &str = "<?xml version=\"1.0\"?><D:propfind xmlns:D=\"DAV:\"><D:allprop/></D:propfind>";
    RequestBuilder::new("PROPFIND", &target_path(path))
        .header("Host", host)
        .header("User-Agent", user_agent)
        .header("Depth", depth.to_string())
        .header("Content-Type", "text/xml; charset=\"utf-8\"")
        .header("Content-Length", BODY.len().to_string())
        .header("Connection", "keep-alive")
        .finish()
        .into_iter()
        .chain(BODY.bytes())
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn range_from_formats_open_ended() {
        assert_eq!(Range::From(100).header_value(), "bytes=100-");
    }

    #[test]
    fn range_bounded_is_inclusive_of_the_last_byte() {
        assert_eq!(Range::Bounded(0, 1024).header_value(), "bytes=0-1023");
    }

    #[test]
    fn get_request_includes_range_header_when_resuming() {
        let bytes = get("example.com", &Path::parse("/file.bin"), "xfer-core/0.1", Some(Range::From(512)));
        let text = String::from_utf8(bytes).unwrap();
        assert!(text.contains("GET /file.bin HTTP/1.1\r\n"));
        assert!(text.contains("Range: bytes=512-\r\n"));
    }

    #[test]
    fn propfind_sets_depth_and_carries_allprop_body() {
        let bytes = propfind("example.com", &Path::parse("/dir/"), "xfer-core/0.1", 1);
        let text = String::from_utf8(bytes).unwrap();
        assert!(text.contains("PROPFIND /dir/ HTTP/1.1\r\n"));
        assert!(text.contains("Depth: 1\r\n"));
        assert!(text.ends_with("<D:allprop/></D:propfind>"));
    }
}
