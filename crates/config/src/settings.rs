//! # Overview
//!
//! [`Settings`] is a generic `(key, closure)` store: a
//! value is looked up for a key together with a "closure" — typically a
//! host name or `user@host` string — and resolution falls back from the
//! most specific closure to the least specific, and finally to a key's
//! global default.
//!
//! # Design
//!
//! Closures are matched by exact string first, then by stripping a leading
//! `user@` if present (so a value set for `host` also applies to
//! `user@host` unless a more specific entry exists), mirroring lftp's
//! `set cmd:x val host` / `set cmd:x val user@host` precedence.

use std::collections::HashMap;

/// A hierarchical string-valued key store keyed on `(key, closure)`.
#[derive(Clone, Debug, Default)]
pub struct Settings {
    defaults: HashMap<String, String>,
    overrides: HashMap<(String, String), String>,
}

impl Settings {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the global default value for `key`.
    pub fn set_default(&mut self, key: impl Into<String>, value: impl Into<String>) {
        self.defaults.insert(key.into(), value.into());
    }

    /// Sets a closure-specific override for `key`.
    pub fn set_for_closure(
        &mut self,
        key: impl Into<String>,
        closure: impl Into<String>,
        value: impl Into<String>,
    ) {
        self.overrides.insert((key.into(), closure.into()), value.into());
    }

    /// Resolves `key` for an optional `closure`, falling back from the
    /// exact closure, to the closure with any `user@` prefix stripped, to
    /// the key's global default.
    #[must_use]
    pub fn lookup(&self, key: &str, closure: Option<&str>) -> Option<&str> {
        if let Some(closure) = closure {
            if let Some(value) = self.overrides.get(&(key.to_owned(), closure.to_owned())) {
                return Some(value);
            }
            if let Some(host_only) = closure.rsplit_once('@').map(|(_, host)| host) {
                if let Some(value) = self.overrides.get(&(key.to_owned(), host_only.to_owned())) {
                    return Some(value);
                }
            }
        }
        self.defaults.get(key).map(String::as_str)
    }

    /// Like [`Self::lookup`] but parses the resolved string via [`str::parse`].
    pub fn lookup_parsed<T: std::str::FromStr>(&self, key: &str, closure: Option<&str>) -> Option<T> {
        self.lookup(key, closure).and_then(|v| v.parse().ok())
    }

    /// Convenience for boolean keys, accepting `yes`/`on`/`true`/`1` as true
    /// and `no`/`off`/`false`/`0` as false (lftp's boolean syntax).
    #[must_use]
    pub fn lookup_bool(&self, key: &str, closure: Option<&str>) -> Option<bool> {
        self.lookup(key, closure).and_then(|v| match v.to_ascii_lowercase().as_str() {
            "yes" | "on" | "true" | "1" => Some(true),
            "no" | "off" | "false" | "0" => Some(false),
            _ => None,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn closure_override_beats_default() {
        let mut s = Settings::new();
        s.set_default("ftp:sync-mode", "on");
        s.set_for_closure("ftp:sync-mode", "slow.example.com", "off");
        assert_eq!(s.lookup("ftp:sync-mode", Some("slow.example.com")), Some("off"));
        assert_eq!(s.lookup("ftp:sync-mode", Some("other.example.com")), Some("on"));
    }

    #[test]
    fn user_at_host_falls_back_to_host_only() {
        let mut s = Settings::new();
        s.set_for_closure("net:timeout", "host.example.com", "30");
        assert_eq!(s.lookup("net:timeout", Some("anon@host.example.com")), Some("30"));
    }

    #[test]
    fn bool_parsing_accepts_lftp_syntax() {
        let mut s = Settings::new();
        s.set_default("ftp:use-pret", "yes");
        assert_eq!(s.lookup_bool("ftp:use-pret", None), Some(true));
    }
}
