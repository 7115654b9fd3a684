//! A minimal cookie jar: `Set-Cookie` parsing, storage keyed by
//! `(domain, path, secure)`, and a `Cookie:` header builder for
//! subsequent requests to the same scope.
//!
//! `expires=` is parsed and kept on every [`Cookie`] but [`CookieJar::get`]
//! never consults it — only [`CookieJar::sweep_expired`] does, and nothing
//! in the request path calls that. lftp's own cookie jar never expired
//! entries either; sessions live only as long as the process does.

use std::time::SystemTime;

#[derive(Clone, Debug, PartialEq, Eq, Hash)]
struct CookieKey {
    domain: String,
    path: String,
    secure: bool,
}

#[derive(Clone, Debug)]
pub struct Cookie {
    pub name: String,
    pub value: String,
    pub expires: Option<SystemTime>,
}

#[derive(Default)]
pub struct CookieJar {
    entries: Vec<(CookieKey, Cookie)>,
}

impl CookieJar {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Parses one `Set-Cookie` header value and stores it under
    /// `(domain, path, secure)`, replacing any existing cookie of the
    /// same name in that scope.
    pub fn store(&mut self, domain: &str, default_path: &str, header_value: &str) {
        let mut attrs = header_value.split(';').map(str::trim);
        let Some(name_value) = attrs.next() else { return };
        let Some((name, value)) = name_value.split_once('=') else { return };

        let mut path = default_path.to_string();
        let mut secure = false;
        let mut expires = None;
        for attr in attrs {
            let (attr_name, attr_value) = attr.split_once('=').unwrap_or((attr, ""));
            match attr_name.to_ascii_lowercase().as_str() {
                "path" => path = attr_value.to_string(),
                "secure" => secure = true,
                "expires" => expires = parse_http_date(attr_value),
                _ => {}
            }
        }

        let key = CookieKey { domain: domain.to_string(), path, secure };
        let cookie = Cookie { name: name.trim().to_string(), value: value.trim().to_string(), expires };
        self.entries.retain(|(k, c)| !(*k == key && c.name == cookie.name));
        self.entries.push((key, cookie));
    }

    /// Builds the `Cookie:` header value for a request to `domain`/`path`,
    /// `secure` being whether the request is over TLS.
    #[must_use]
    pub fn header_for(&self, domain: &str, path: &str, secure: bool) -> Option<String> {
        let named: Vec<String> = self
            .entries
            .iter()
            .filter(|(k, _)| k.domain == domain && path.starts_with(&k.path) && (secure || !k.secure))
            .map(|(_, c)| format!("{}={}", c.name, c.value))
            .collect();
        if named.is_empty() { None } else { Some(named.join("; ")) }
    }

    /// Drops every cookie past its `expires` time. Never called from the
    /// request path; kept for callers that want an explicit sweep (e.g.
    /// a long-lived interactive session reclaiming memory).
    pub fn sweep_expired(&mut self, now: SystemTime) {
        self.entries.retain(|(_, c)| match c.expires {
            Some(expires) => expires > now,
            None => true,
        });
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// Parses an RFC 1123 `expires=` date (`Wdy, DD Mon YYYY HH:MM:SS GMT`);
/// returns `None` for anything else rather than attempting full RFC 850 /
/// asctime fallback parsing.
pub(crate) fn parse_http_date(text: &str) -> Option<SystemTime> {
    let months = ["Jan", "Feb", "Mar", "Apr", "May", "Jun", "Jul", "Aug", "Sep", "Oct", "Nov", "Dec"];
    let fields: Vec<&str> = text.split_whitespace().collect();
    let [_wdy, day, mon, year, time, _tz] = fields[..] else { return None };
    let day: u64 = day.parse().ok()?;
    let month_index = months.iter().position(|m| *m == mon)? as u64;
    let year: u64 = year.parse().ok()?;
    let mut parts = time.split(':');
    let hour: u64 = parts.next()?.parse().ok()?;
    let minute: u64 = parts.next()?.parse().ok()?;
    let second: u64 = parts.next()?.parse().ok()?;

    let days_since_epoch = days_from_civil(year, month_index + 1, day);
    let secs = days_since_epoch * 86_400 + hour * 3600 + minute * 60 + second;
    Some(SystemTime::UNIX_EPOCH + std::time::Duration::from_secs(secs))
}

/// Howard Hinnant's civil-from-days algorithm, the inverse direction:
/// days since the Unix epoch for a given (year, month, day).
fn days_from_civil(y: u64, m: u64, d: u64) -> u64 {
    let y = y as i64 - i64::from(m <= 2);
    let era = if y >= 0 { y } else { y - 399 } / 400;
    let yoe = (y - era * 400) as u64;
    let mp = (m + 9) % 12;
    let doy = (153 * mp + 2) / 5 + d - 1;
    let doe = yoe * 365 + yoe / 4 - yoe / 100 + doy;
    (era * 146_097 + doe as i64 - 719_468) as u64
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn stores_and_retrieves_a_simple_cookie() {
        let mut jar = CookieJar::new();
        jar.store("example.com", "/", "session=abc123; Path=/");
        assert_eq!(jar.header_for("example.com", "/dir/", false), Some("session=abc123".to_string()));
    }

    #[test]
    fn secure_cookies_are_withheld_from_plaintext_requests() {
        let mut jar = CookieJar::new();
        jar.store("example.com", "/", "sid=xyz; Secure");
        assert_eq!(jar.header_for("example.com", "/", false), None);
        assert_eq!(jar.header_for("example.com", "/", true), Some("sid=xyz".to_string()));
    }

    #[test]
    fn replacing_a_cookie_name_drops_the_old_value() {
        let mut jar = CookieJar::new();
        jar.store("example.com", "/", "a=1");
        jar.store("example.com", "/", "a=2");
        assert_eq!(jar.len(), 1);
        assert_eq!(jar.header_for("example.com", "/", false), Some("a=2".to_string()));
    }

    #[test]
    fn sweep_expired_is_never_called_by_header_for_but_works_when_invoked() {
        let mut jar = CookieJar::new();
        jar.store("example.com", "/", "a=1; Expires=Wed, 09 Jun 2021 10:18:14 GMT");
        assert_eq!(jar.len(), 1);
        jar.sweep_expired(SystemTime::now());
        assert!(jar.is_empty());
    }
}
