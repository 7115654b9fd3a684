use std::cell::RefCell;
use std::num::NonZeroU64;
use std::rc::Rc;

use rustc_hash::FxHashMap;

use crate::bucket::TokenBucket;

/// Per-host [`TokenBucket`]s, shared by every session connected to that
/// host so a transfer limit applies across however many parallel
/// connections are open to it. Sessions hold an `Rc` clone rather than
/// going through the registry on every write.
#[derive(Default)]
pub struct HostLimiters {
    buckets: FxHashMap<String, Rc<RefCell<TokenBucket>>>,
    default_limit: Option<NonZeroU64>,
}

impl HostLimiters {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the fallback limit applied to hosts with no specific entry.
    pub fn set_default_limit(&mut self, limit: Option<NonZeroU64>) {
        self.default_limit = limit;
    }

    /// Sets (or clears, if `limit` is `None`) the limit for `host`
    /// specifically, independent of the default.
    pub fn set_host_limit(&mut self, host: &str, limit: Option<NonZeroU64>, burst: Option<NonZeroU64>) {
        match limit {
            Some(limit) => {
                self.buckets
                    .entry(host.to_string())
                    .and_modify(|bucket| bucket.borrow_mut().update(limit, burst))
                    .or_insert_with(|| Rc::new(RefCell::new(TokenBucket::with_burst(limit, burst))));
            }
            None => {
                self.buckets.remove(host);
            }
        }
    }

    /// Returns the bucket for `host`, creating one from the default limit
    /// if none exists yet. Returns `None` if neither a host-specific nor a
    /// default limit is configured — callers should skip throttling.
    pub fn bucket_for(&mut self, host: &str) -> Option<Rc<RefCell<TokenBucket>>> {
        if let Some(bucket) = self.buckets.get(host) {
            return Some(Rc::clone(bucket));
        }
        let limit = self.default_limit?;
        let bucket = Rc::new(RefCell::new(TokenBucket::new(limit)));
        self.buckets.insert(host.to_string(), Rc::clone(&bucket));
        Some(bucket)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn nz(v: u64) -> NonZeroU64 {
        NonZeroU64::new(v).unwrap()
    }

    #[test]
    fn no_default_and_no_host_limit_yields_none() {
        let mut registry = HostLimiters::new();
        assert!(registry.bucket_for("example.com").is_none());
    }

    #[test]
    fn default_limit_applies_to_unconfigured_hosts() {
        let mut registry = HostLimiters::new();
        registry.set_default_limit(Some(nz(1000)));
        let bucket = registry.bucket_for("example.com").unwrap();
        assert_eq!(bucket.borrow().limit_bytes().get(), 1000);
    }

    #[test]
    fn host_specific_limit_overrides_default() {
        let mut registry = HostLimiters::new();
        registry.set_default_limit(Some(nz(1000)));
        registry.set_host_limit("slow.example.com", Some(nz(10)), None);
        let bucket = registry.bucket_for("slow.example.com").unwrap();
        assert_eq!(bucket.borrow().limit_bytes().get(), 10);
    }

    #[test]
    fn repeated_lookups_share_the_same_bucket() {
        let mut registry = HostLimiters::new();
        registry.set_default_limit(Some(nz(1000)));
        let a = registry.bucket_for("example.com").unwrap();
        let b = registry.bucket_for("example.com").unwrap();
        assert!(Rc::ptr_eq(&a, &b));
    }
}
