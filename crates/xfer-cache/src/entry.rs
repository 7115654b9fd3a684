//! The value side of a cache entry: either a successful response or a
//! latched failure, each carrying the instant after which it is stale.

use std::time::{Duration, Instant};

use xfer_path::FileSet;

/// What was cached for a given `(site, path, mode)` key.
#[derive(Clone, Debug)]
pub enum CacheValue {
    /// A listing or metadata response: the raw wire payload plus, when the
    /// protocol engine parsed it, the structured form.
    Response { data: Vec<u8>, file_set: Option<FileSet> },
    /// A failed lookup, cached so a repeat of the same request within the
    /// TTL doesn't re-hit the wire. `detail` mirrors the error message, not
    /// the error itself, since errors carry a non-`Clone` io source.
    Failed { detail: String },
}

impl CacheValue {
    #[must_use]
    pub fn byte_size(&self) -> usize {
        match self {
            CacheValue::Response { data, .. } => data.len(),
            CacheValue::Failed { detail } => detail.len(),
        }
    }
}

/// A stored value plus its expiry and the recency stamp the LRU evictor
/// compares entries by.
#[derive(Clone, Debug)]
pub struct CacheEntry {
    pub value: CacheValue,
    expires_at: Instant,
    last_used: u64,
}

impl CacheEntry {
    pub(crate) fn new(value: CacheValue, ttl: Duration, now: Instant, tick: u64) -> Self {
        Self { value, expires_at: now + ttl, last_used: tick }
    }

    #[must_use]
    pub fn is_expired(&self, now: Instant) -> bool {
        now >= self.expires_at
    }

    #[must_use]
    pub fn expires_at(&self) -> Instant {
        self.expires_at
    }

    pub(crate) fn touch(&mut self, tick: u64) {
        self.last_used = tick;
    }

    pub(crate) fn last_used(&self) -> u64 {
        self.last_used
    }
}
