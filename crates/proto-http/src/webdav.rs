//! A tolerant, forward-only tokenizer over a WebDAV `multistatus` body:
//! good enough to pull the handful of properties this engine cares about
//! out of a `<D:response>` block without pulling in a full XML/DOM crate,
//! same tradeoff lftp's own hand-rolled DAV parser makes.

use xfer_path::Path;

use crate::cookie::parse_http_date;

#[derive(Clone, Debug, PartialEq)]
pub struct DavEntry {
    pub href: String,
    pub is_collection: bool,
    pub size: Option<u64>,
    pub mtime: Option<std::time::SystemTime>,
    pub owner: Option<String>,
    pub executable: bool,
}

/// Splits `body` into the text between matching `<tag>...</tag>` pairs for
/// `local_name`, ignoring any namespace prefix the element carries.
fn tag_bodies<'a>(body: &'a str, local_name: &str) -> Vec<&'a str> {
    let mut out = Vec::new();
    let mut rest = body;
    loop {
        let Some(open_start) = find_tag_open(rest, local_name) else { break };
        let Some(open_end) = rest[open_start..].find('>') else { break };
        let tag_text = &rest[open_start + 1..open_start + open_end];
        if tag_text.ends_with('/') {
            out.push("");
            rest = &rest[open_start + open_end + 1..];
            continue;
        }
        let content_start = open_start + open_end + 1;
        let close_needle = format!("</{}", tag_text.split(':').last().unwrap_or(tag_text).trim());
        let Some(close_rel) = rest[content_start..].find(&close_needle) else { break };
        out.push(&rest[content_start..content_start + close_rel]);
        let Some(gt) = rest[content_start + close_rel..].find('>') else { break };
        rest = &rest[content_start + close_rel + gt + 1..];
    }
    out
}

fn find_tag_open(text: &str, local_name: &str) -> Option<usize> {
    let mut search_from = 0;
    while let Some(lt) = text[search_from..].find('<') {
        let pos = search_from + lt;
        let after = &text[pos + 1..];
        if after.starts_with('/') {
            search_from = pos + 1;
            continue;
        }
        let tag_end = after.find(|c: char| c == '>' || c.is_whitespace() || c == '/').unwrap_or(after.len());
        let tag_name = &after[..tag_end];
        let bare = tag_name.split(':').last().unwrap_or(tag_name);
        if bare.eq_ignore_ascii_case(local_name) {
            return Some(pos);
        }
        search_from = pos + 1;
    }
    None
}

/// Splits a full `multistatus` document into its individual `response`
/// element bodies.
fn response_blocks(body: &str) -> Vec<&str> {
    tag_bodies(body, "response")
}

fn unescape(text: &str) -> String {
    text.replace("&amp;", "&").replace("&lt;", "<").replace("&gt;", ">").replace("&quot;", "\"").replace("&apos;", "'")
}

/// Parses a `multistatus` PROPFIND response body into one [`DavEntry`] per
/// `<D:response>` block.
#[must_use]
pub fn parse_multistatus(body: &str) -> Vec<DavEntry> {
    response_blocks(body)
        .into_iter()
        .filter_map(|block| {
            let href = tag_bodies(block, "href").first().map(|s| unescape(s.trim()))?;
            let is_collection = !tag_bodies(block, "collection").is_empty();
            let size = tag_bodies(block, "getcontentlength").first().and_then(|s| s.trim().parse().ok());
            let mtime = tag_bodies(block, "getlastmodified").first().and_then(|s| parse_http_date(s.trim()));
            let owner = tag_bodies(block, "owner").first().map(|s| unescape(s.trim())).filter(|s| !s.is_empty());
            let executable = tag_bodies(block, "executable").first().is_some_and(|s| s.trim() == "T" || s.trim() == "true");
            Some(DavEntry { href, is_collection, size, mtime, owner, executable })
        })
        .collect()
}

/// The last path component of `entry.href`, decoded as a plain name
/// relative to `base`.
#[must_use]
pub fn entry_name(entry: &DavEntry, base: &Path) -> Option<String> {
    let href_path = Path::parse(&entry.href);
    let base_components = base.components();
    let href_components = href_path.components();
    if href_components.len() <= base_components.len() {
        return None;
    }
    Some(href_components[base_components.len()..].join("/"))
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE: &str = r#"<?xml version="1.0"?>
<D:multistatus xmlns:D="DAV:">
  <D:response>
    <D:href>/dav/file.txt</D:href>
    <D:propstat>
      <D:prop>
        <D:resourcetype/>
        <D:getcontentlength>1234</D:getcontentlength>
        <D:getlastmodified>Wed, 09 Jun 2021 10:18:14 GMT</D:getlastmodified>
        <D:owner>alice</D:owner>
      </D:prop>
      <D:status>HTTP/1.1 200 OK</D:status>
    </D:propstat>
  </D:response>
  <D:response>
    <D:href>/dav/subdir/</D:href>
    <D:propstat>
      <D:prop>
        <D:resourcetype><D:collection/></D:resourcetype>
      </D:prop>
      <D:status>HTTP/1.1 200 OK</D:status>
    </D:propstat>
  </D:response>
</D:multistatus>"#;

    #[test]
    fn parses_a_file_entry_with_size_and_mtime() {
        let entries = parse_multistatus(SAMPLE);
        let file = entries.iter().find(|e| e.href.ends_with("file.txt")).unwrap();
        assert_eq!(file.size, Some(1234));
        assert!(!file.is_collection);
        assert_eq!(file.owner.as_deref(), Some("alice"));
        assert!(file.mtime.is_some());
    }

    #[test]
    fn parses_a_collection_entry() {
        let entries = parse_multistatus(SAMPLE);
        let dir = entries.iter().find(|e| e.href.ends_with("subdir/")).unwrap();
        assert!(dir.is_collection);
        assert_eq!(dir.size, None);
    }

    #[test]
    fn entry_name_is_relative_to_the_request_base() {
        let entries = parse_multistatus(SAMPLE);
        let file = entries.iter().find(|e| e.href.ends_with("file.txt")).unwrap();
        let base = Path::parse("/dav/");
        assert_eq!(entry_name(file, &base), Some("file.txt".to_string()));
    }
}
