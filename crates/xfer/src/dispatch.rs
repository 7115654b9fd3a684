//! Turns a parsed URL plus the global [`Settings`] into a concrete,
//! unopened [`AnySession`], resolving each protocol's config snapshot at
//! the closure the identity implies (`user@host`, falling back to `host`).

use config::{FishConfig, FtpConfig, HttpConfig, Settings, SftpConfig};
use session::{SessionIdentity, XferError};
use urlgrammar::{Proto, Url};

use proto_fish::FishEngine;
use proto_ftp::{FtpEngine, FtpSettings};
use proto_http::HttpEngine;
use proto_sftp::{SftpEngine, SftpSettings};

use crate::session::AnySession;

fn closure_for(identity: &SessionIdentity) -> Option<String> {
    identity.user.as_deref().map(|user| format!("{user}@{}", identity.host))
}

/// Builds the `FtpSettings` an `FtpEngine` actually branches on from the
/// config snapshot plus the identity. `retry_530`/`retry_530_anonymous` are
/// user-editable strings in `config` (so they round-trip through a
/// settings file) but the engine wants them pre-compiled; a pattern that
/// fails to compile falls back to the engine's own default rather than
/// rejecting the whole session.
fn ftp_settings(cfg: &FtpConfig, identity: &SessionIdentity) -> FtpSettings {
    let default = FtpSettings::default();
    FtpSettings {
        use_epsv: cfg.prefer_epsv,
        passive_mode: cfg.passive_mode,
        verify_address: cfg.verify_address,
        ignore_pasv_address: cfg.ignore_pasv_address,
        anonymous: matches!(identity.user.as_deref(), None | Some("anonymous")),
        use_tls: identity.proto == Proto::Ftps || cfg.ssl_force,
        retry_530: regex::Regex::new(&cfg.retry_530).unwrap_or(default.retry_530),
        retry_530_anonymous: regex::Regex::new(&cfg.retry_530_anonymous).unwrap_or(default.retry_530_anonymous),
    }
}

/// Parses `url`, resolves its identity, and constructs the matching
/// protocol engine with its config snapshot. The returned session is
/// unopened; the caller drives it through [`session::Session::open`].
pub fn open_session(url: &str, settings: &Settings) -> Result<AnySession, XferError> {
    let parsed = Url::parse(url).map_err(|e| XferError::Fatal(e.to_string()))?;
    let identity = SessionIdentity::from_url(&parsed)
        .ok_or_else(|| XferError::Fatal("URL is missing a host or has no default port for its scheme".into()))?;
    let closure = closure_for(&identity);
    let closure = closure.as_deref();

    match identity.proto {
        Proto::Ftp | Proto::Ftps | Proto::Hftp => {
            let cfg = FtpConfig::from_settings(settings, closure);
            let ftp = ftp_settings(&cfg, &identity);
            Ok(AnySession::Ftp(FtpEngine::new(identity, ftp)))
        }
        Proto::Sftp => {
            let cfg = SftpConfig::from_settings(settings, closure);
            let sftp = SftpSettings { max_packets_in_flight: cfg.max_packets_in_flight, size_read: cfg.size_read };
            Ok(AnySession::Sftp(SftpEngine::new(identity, cfg.connect_program, sftp)))
        }
        Proto::Fish => {
            // `FishConfig::charset`/`auto_confirm` have no engine hook yet;
            // `FishEngine` always negotiates a fixed command set.
            let _ = FishConfig::from_settings(settings, closure);
            Ok(AnySession::Fish(FishEngine::new(identity)))
        }
        Proto::Http | Proto::Https => {
            let cfg = HttpConfig::from_settings(settings, closure);
            Ok(AnySession::Http(HttpEngine::new(identity, cfg)))
        }
        Proto::File | Proto::Bookmark | Proto::Slot => {
            Err(XferError::Fatal(format!("{:?} is not a session this core dials directly", identity.proto)))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ftp_url_dispatches_to_ftp_engine() {
        let settings = Settings::new();
        let session = open_session("ftp://example.com/pub", &settings).unwrap();
        assert!(matches!(session, AnySession::Ftp(_)));
    }

    #[test]
    fn ftps_url_also_dispatches_to_ftp_engine() {
        let settings = Settings::new();
        let session = open_session("ftps://example.com/pub", &settings).unwrap();
        assert!(matches!(session, AnySession::Ftp(_)));
    }

    #[test]
    fn sftp_url_dispatches_to_sftp_engine() {
        let settings = Settings::new();
        let session = open_session("sftp://example.com/home", &settings).unwrap();
        assert!(matches!(session, AnySession::Sftp(_)));
    }

    #[test]
    fn fish_url_dispatches_to_fish_engine() {
        let settings = Settings::new();
        let session = open_session("fish://example.com/", &settings).unwrap();
        assert!(matches!(session, AnySession::Fish(_)));
    }

    #[test]
    fn https_url_dispatches_to_http_engine() {
        let settings = Settings::new();
        let session = open_session("https://example.com/index.html", &settings).unwrap();
        assert!(matches!(session, AnySession::Http(_)));
    }

    #[test]
    fn file_scheme_is_rejected() {
        let settings = Settings::new();
        let err = open_session("file:///tmp/x", &settings).unwrap_err();
        assert!(matches!(err, XferError::Fatal(_)));
    }

    #[test]
    fn malformed_url_is_rejected() {
        let settings = Settings::new();
        assert!(open_session("not a url at all", &settings).is_err());
    }

    #[test]
    fn anonymous_ftp_closure_has_no_user() {
        let parsed = Url::parse("ftp://example.com/").unwrap();
        let identity = SessionIdentity::from_url(&parsed).unwrap();
        assert_eq!(closure_for(&identity), None);
    }

    #[test]
    fn user_ftp_closure_includes_user_at_host() {
        let parsed = Url::parse("ftp://alice@example.com/").unwrap();
        let identity = SessionIdentity::from_url(&parsed).unwrap();
        assert_eq!(closure_for(&identity).as_deref(), Some("alice@example.com"));
    }

    #[test]
    fn malformed_retry_530_pattern_falls_back_to_default() {
        let mut settings = Settings::new();
        settings.set_default("ftp:retry-530", "(unterminated");
        let cfg = FtpConfig::from_settings(&settings, None);
        let parsed = Url::parse("ftp://example.com/").unwrap();
        let identity = SessionIdentity::from_url(&parsed).unwrap();
        let built = ftp_settings(&cfg, &identity);
        assert_eq!(built.retry_530.as_str(), FtpSettings::default().retry_530.as_str());
    }
}
