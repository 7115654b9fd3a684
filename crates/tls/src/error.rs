//! TLS-layer error taxonomy, separate from [`session::XferError`] since a
//! handshake failure is diagnosed before a session identity even exists.

#[derive(Debug, thiserror::Error)]
pub enum TlsError {
    #[error("{host:?} is not a valid TLS server name")]
    InvalidServerName { host: String },
    #[error("TLS handshake failed: {0}")]
    Handshake(#[from] rustls::Error),
    #[error(transparent)]
    Io(#[from] std::io::Error),
}
