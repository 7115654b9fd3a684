//! The exhaustive error taxonomy every protocol engine reports through.

use thiserror::Error;

/// A single, tagged outcome for every fallible session operation. `Ok(())`
/// stands in for the source enum's `OK`; `DoAgain` is folded into
/// [`crate::api::Outcome::InProgress`] rather than kept as an error variant,
/// since it is a would-block sentinel, not a failure.
#[derive(Debug, Error)]
pub enum XferError {
    /// A syscall failed; `errno` is preserved verbatim with a contextual
    /// prefix describing what was attempted.
    #[error("{context}: {source}")]
    SeeErrno {
        context: String,
        #[source]
        source: std::io::Error,
    },

    #[error("could not resolve host '{host}': {detail}")]
    LookupError { host: String, detail: String },

    #[error("not connected to '{host}' and cannot connect")]
    NoHost { host: String },

    #[error("no such file or directory: {path}")]
    NoFile { path: String },

    #[error("moved to {location}")]
    FileMoved { location: String },

    #[error("fatal: {0}")]
    Fatal(String),

    #[error("store did not confirm: {0}")]
    StoreFailed(String),

    #[error("login failed: {0}")]
    LoginFailed(String),

    #[error("server does not support this operation: {0}")]
    NotSupp(String),
}

impl XferError {
    /// Whether a retry is worth attempting without operator intervention,
    /// per the default policy table.
    #[must_use]
    pub fn is_retryable(&self) -> bool {
        match self {
            XferError::SeeErrno { source, .. } => is_transient_errno(source),
            XferError::LookupError { .. } => true,
            XferError::StoreFailed(_) => true,
            XferError::NoHost { .. }
            | XferError::NoFile { .. }
            | XferError::FileMoved { .. }
            | XferError::Fatal(_)
            | XferError::LoginFailed(_)
            | XferError::NotSupp(_) => false,
        }
    }
}

fn is_transient_errno(error: &std::io::Error) -> bool {
    use std::io::ErrorKind;
    matches!(
        error.kind(),
        ErrorKind::Interrupted
            | ErrorKind::WouldBlock
            | ErrorKind::BrokenPipe
            | ErrorKind::ConnectionReset
            | ErrorKind::ConnectionAborted
            | ErrorKind::ConnectionRefused
            | ErrorKind::NotConnected
            | ErrorKind::TimedOut
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn connection_reset_is_retryable() {
        let error = XferError::SeeErrno {
            context: "read".into(),
            source: std::io::Error::from(std::io::ErrorKind::ConnectionReset),
        };
        assert!(error.is_retryable());
    }

    #[test]
    fn fatal_is_never_retryable() {
        assert!(!XferError::Fatal("certificate verification failed".into()).is_retryable());
    }

    #[test]
    fn login_failed_is_not_retryable_by_default() {
        assert!(!XferError::LoginFailed("bad password".into()).is_retryable());
    }

    #[test]
    fn lookup_error_is_retryable() {
        let error = XferError::LookupError {
            host: "example.com".into(),
            detail: "timed out".into(),
        };
        assert!(error.is_retryable());
    }
}
