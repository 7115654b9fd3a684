//! The lookup key a cache entry is stored and invalidated under.

use session::SiteKey;
use session::OpenMode;
use xfer_path::Path;

/// `(site, path, mode)` — the same triple two sessions would need to agree
/// on before one could answer a question on the other's behalf.
#[derive(Clone, Debug, Eq, PartialEq, Hash)]
pub struct CacheKey {
    pub site: SiteKey,
    pub path: Path,
    pub mode: OpenMode,
}

impl CacheKey {
    #[must_use]
    pub fn new(site: SiteKey, path: Path, mode: OpenMode) -> Self {
        Self { site, path, mode }
    }
}
