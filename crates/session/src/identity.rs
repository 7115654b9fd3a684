//! The tuple the pool and cache use to decide whether two sessions are
//! interchangeable.

use std::hash::{Hash, Hasher};

use urlgrammar::{Proto, Url};

/// `(protocol, host, port, user, password, home)` — two sessions are
/// *same-site* iff they agree on everything but `home`; *same-location*
/// additionally requires an equal current working directory, which is
/// session state rather than identity and so is compared separately.
#[derive(Clone, Debug)]
pub struct SessionIdentity {
    pub proto: Proto,
    pub host: String,
    pub port: u16,
    pub user: Option<String>,
    pub password: Option<String>,
    pub home: Option<String>,
}

impl SessionIdentity {
    #[must_use]
    pub fn from_url(url: &Url) -> Option<Self> {
        Some(Self {
            proto: url.proto,
            host: url.host.clone(),
            port: url.effective_port()?,
            user: url.user.clone(),
            password: url.password.clone(),
            home: None,
        })
    }

    /// Two sessions sharing (protocol, host, port, user, password).
    #[must_use]
    pub fn same_site(&self, other: &SessionIdentity) -> bool {
        self.site_key() == other.site_key()
    }

    /// The cache/pool key: identity minus password, since the cache and
    /// pool are never keyed on credentials.
    #[must_use]
    pub fn site_key(&self) -> SiteKey {
        SiteKey {
            proto: self.proto,
            host: self.host.clone(),
            port: self.port,
            user: self.user.clone(),
        }
    }
}

/// [`SessionIdentity`] minus the password, used as the cache/pool key.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct SiteKey {
    proto: Proto,
    host: String,
    port: u16,
    user: Option<String>,
}

impl Hash for SiteKey {
    fn hash<H: Hasher>(&self, state: &mut H) {
        (self.proto as u8 as u32).hash(state);
        self.host.hash(state);
        self.port.hash(state);
        self.user.hash(state);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn identity(user: &str, password: &str) -> SessionIdentity {
        SessionIdentity {
            proto: Proto::Ftp,
            host: "example.com".into(),
            port: 21,
            user: Some(user.into()),
            password: Some(password.into()),
            home: None,
        }
    }

    #[test]
    fn same_site_ignores_password() {
        let a = identity("anon", "pw1");
        let b = identity("anon", "pw2");
        assert!(a.same_site(&b));
    }

    #[test]
    fn different_user_is_not_same_site() {
        let a = identity("anon", "pw");
        let b = identity("bob", "pw");
        assert!(!a.same_site(&b));
    }

    #[test]
    fn site_key_is_stable_across_password_changes() {
        let a = identity("anon", "pw1");
        let b = identity("anon", "pw2");
        assert_eq!(a.site_key(), b.site_key());
    }
}
