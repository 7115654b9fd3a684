//! HTTP proxy request framing: absolute-URI GETs through a plain proxy, and
//! `CONNECT` tunneling for HTTPS through one.

pub struct ProxyAuth<'a> {
    pub user: &'a str,
    pub password: &'a str,
}

/// Rewrites a request's request-line target from origin-form (`/path`) to
/// absolute-form (`http://host/path`), the form a plain (non-CONNECT) proxy
/// expects for everything but `CONNECT` itself.
#[must_use]
pub fn absolute_target(host: &str, path_and_query: &str) -> String {
    format!("http://{host}{path_and_query}")
}

/// Builds a `CONNECT host:port HTTP/1.1` request, the first thing sent on a
/// freshly dialed proxy socket before a TLS handshake can begin.
#[must_use]
pub fn connect_request(host: &str, port: u16, user_agent: &str, auth: Option<ProxyAuth>) -> Vec<u8> {
    let target = format!("{host}:{port}");
    let mut builder = crate::request::RequestBuilder::new("CONNECT", &target)
        .header("Host", &target)
        .header("User-Agent", user_agent)
        .header("Proxy-Connection", "keep-alive");
    if let Some(auth) = auth {
        builder = builder.proxy_basic_auth(auth.user, auth.password);
    }
    builder.finish()
}

/// A `CONNECT` response's own status line is parsed exactly like any other
/// response; the tunnel is ready once its status is 2xx and the header
/// block after it has been fully consumed from the buffer.
#[must_use]
pub fn connect_established(response: &crate::response::Response) -> bool {
    matches!(response.status, 200..=299)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn absolute_target_prefixes_scheme_and_host() {
        assert_eq!(absolute_target("example.com", "/a/b?c=1"), "http://example.com/a/b?c=1");
    }

    #[test]
    fn connect_request_targets_host_colon_port() {
        let bytes = connect_request("example.com", 443, "xfer-core/0.1", None);
        let text = String::from_utf8(bytes).unwrap();
        assert!(text.starts_with("CONNECT example.com:443 HTTP/1.1\r\n"));
        assert!(text.contains("Host: example.com:443\r\n"));
    }

    #[test]
    fn connect_request_carries_proxy_auth_when_given() {
        let bytes = connect_request("example.com", 443, "xfer-core/0.1", Some(ProxyAuth { user: "u", password: "p" }));
        let text = String::from_utf8(bytes).unwrap();
        assert!(text.contains("Proxy-Authorization: Basic"));
    }

    #[test]
    fn connect_established_accepts_only_2xx() {
        let ok = crate::response::parse_headers(b"HTTP/1.1 200 Connection Established").unwrap();
        assert!(connect_established(&ok));
        let denied = crate::response::parse_headers(b"HTTP/1.1 407 Proxy Authentication Required").unwrap();
        assert!(!connect_established(&denied));
    }
}
