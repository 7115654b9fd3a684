//! Classifies a reply against the failure taxonomy: which errors are
//! transient-looking network drops worth a reconnect, which `530`s are
//! worth retrying, and which special cases (`550` empty listing, `226`
//! after `ABOR`) aren't failures at all.

use std::sync::OnceLock;

use regex::Regex;

use crate::response::Reply;

fn transient_message_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"(?i)broken pipe|timed out|too many|closed by the remote host|data was received").unwrap()
    })
}

/// A `4xx`/`5xx` reply whose text reads like a network drop rather than a
/// genuine protocol-level rejection.
#[must_use]
pub fn looks_like_network_drop(reply: &Reply) -> bool {
    (reply.is_transient_failure() || reply.is_permanent_failure()) && transient_message_re().is_match(&reply.text())
}

/// `530` classified against the configured retry regexes; unmatched is a
/// fatal login failure.
#[must_use]
pub fn should_retry_530(reply: &Reply, retry_530: &Regex, retry_530_anonymous: &Regex, anonymous_login: bool) -> bool {
    debug_assert_eq!(reply.code, 530);
    if anonymous_login && retry_530_anonymous.is_match(&reply.text()) {
        return true;
    }
    retry_530.is_match(&reply.text())
}

/// `550` on a directory listing with no filename argument, or `450 No
/// files found`, means an empty directory, not an error.
#[must_use]
pub fn is_empty_listing(reply: &Reply, had_filename_argument: bool) -> bool {
    (reply.code == 550 && !had_filename_argument) || reply.code == 450
}

/// `226`/`225` with a data socket already open signals the transfer (or
/// the `ABOR` it was cancelled with) completed normally.
#[must_use]
pub fn is_transfer_complete(reply: &Reply) -> bool {
    matches!(reply.code, 226 | 225)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn reply(code: u16, text: &str) -> Reply {
        Reply { code, lines: vec![text.to_owned()] }
    }

    #[test]
    fn recognizes_network_drop_phrases() {
        assert!(looks_like_network_drop(&reply(426, "Connection closed by the remote host")));
        assert!(looks_like_network_drop(&reply(550, "Broken pipe")));
        assert!(!looks_like_network_drop(&reply(550, "No such file or directory")));
    }

    #[test]
    fn unmatched_530_is_not_retried() {
        let retry_530 = Regex::new(r"(?i)temporarily").unwrap();
        let retry_530_anon = Regex::new(r"(?i)too many users").unwrap();
        assert!(!should_retry_530(&reply(530, "Login incorrect"), &retry_530, &retry_530_anon, false));
        assert!(should_retry_530(&reply(530, "Temporarily unavailable"), &retry_530, &retry_530_anon, false));
    }

    #[test]
    fn empty_listing_cases() {
        assert!(is_empty_listing(&reply(450, "No files found"), true));
        assert!(is_empty_listing(&reply(550, "No such file or directory"), false));
        assert!(!is_empty_listing(&reply(550, "No such file or directory"), true));
    }
}
