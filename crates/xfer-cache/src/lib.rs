//! A bounded, process-global response cache shared by every session: a
//! directory listing or metadata lookup answered once can answer an
//! identical request against the same site without touching the wire
//! again, until something invalidates it or its TTL lapses.
//!
//! `ResponseCache` itself is plain data; `ExpireHelper` is the scheduler
//! task that keeps it from accumulating stale entries between lookups.

mod cache;
mod entry;
mod expire;
mod key;

pub use cache::ResponseCache;
pub use entry::{CacheEntry, CacheValue};
pub use expire::ExpireHelper;
pub use key::CacheKey;
