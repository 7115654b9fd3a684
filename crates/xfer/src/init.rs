//! One-time process-wide setup: installing rustls's crypto backend before
//! any TLS-wrapped session tries to build a `ClientConfig`.

use std::sync::Once;

static CRYPTO_PROVIDER: Once = Once::new();

/// Installs `ring` as the default rustls `CryptoProvider`. Idempotent and
/// cheap to call more than once; every binary embedding this core should
/// call it before opening the first `ftps`/`https`/`sftp`-over-TLS session.
pub fn install_crypto_provider() {
    CRYPTO_PROVIDER.call_once(|| {
        if rustls::crypto::ring::default_provider().install_default().is_err() {
            tracing::warn!("a rustls CryptoProvider was already installed; keeping it");
        }
    });
}
