//! The bounded, LRU-evicted, TTL-expired response cache.

use std::time::{Duration, Instant};

use rustc_hash::FxHashMap;
use session::SiteKey;
use xfer_path::Path;

use crate::entry::{CacheEntry, CacheValue};
use crate::key::CacheKey;

const DEFAULT_TTL: Duration = Duration::from_secs(60);

/// Global, single-threaded response cache keyed on `(site, path, mode)`.
///
/// Eviction is a plain LRU scan rather than an intrusive list: cache sizes
/// are bounded by a byte budget meant to hold a handful of directory
/// listings, not enough entries for a linear scan to matter.
pub struct ResponseCache {
    entries: FxHashMap<CacheKey, CacheEntry>,
    budget_bytes: usize,
    used_bytes: usize,
    ttl: Duration,
    tick: u64,
}

impl ResponseCache {
    #[must_use]
    pub fn new(budget_bytes: usize) -> Self {
        Self {
            entries: FxHashMap::default(),
            budget_bytes,
            used_bytes: 0,
            ttl: DEFAULT_TTL,
            tick: 0,
        }
    }

    pub fn set_ttl(&mut self, ttl: Duration) {
        self.ttl = ttl;
    }

    pub fn set_budget_bytes(&mut self, budget_bytes: usize) {
        self.budget_bytes = budget_bytes;
        self.evict_to_budget();
    }

    /// Looks up `key`, evicting and returning `None` if it is expired.
    /// Bumps the entry's recency on a hit.
    pub fn get(&mut self, key: &CacheKey, now: Instant) -> Option<&CacheValue> {
        if self.entries.get(key).is_some_and(|e| e.is_expired(now)) {
            self.remove_key(key);
            return None;
        }
        self.tick += 1;
        let tick = self.tick;
        let entry = self.entries.get_mut(key)?;
        entry.touch(tick);
        Some(&entry.value)
    }

    pub fn put(&mut self, key: CacheKey, value: CacheValue, now: Instant) {
        let size = value.byte_size();
        self.remove_key(&key);
        self.tick += 1;
        self.entries.insert(key, CacheEntry::new(value, self.ttl, now, self.tick));
        self.used_bytes += size;
        self.evict_to_budget();
    }

    fn remove_key(&mut self, key: &CacheKey) {
        if let Some(entry) = self.entries.remove(key) {
            self.used_bytes = self.used_bytes.saturating_sub(entry.value.byte_size());
        }
    }

    fn evict_to_budget(&mut self) {
        while self.used_bytes > self.budget_bytes {
            let Some(lru_key) = self
                .entries
                .iter()
                .min_by_key(|(_, entry)| entry.last_used())
                .map(|(key, _)| key.clone())
            else {
                break;
            };
            self.remove_key(&lru_key);
        }
    }

    /// Invalidates the entry for `path` itself and the listing entry for
    /// its parent directory, for `site` only.
    pub fn file_changed(&mut self, site: &SiteKey, path: &Path) {
        let dirname = path.dirname();
        let stale: Vec<CacheKey> = self
            .entries
            .keys()
            .filter(|k| &k.site == site && (&k.path == path || k.path == dirname))
            .cloned()
            .collect();
        for key in stale {
            self.remove_key(&key);
        }
    }

    /// Invalidates every entry whose path is `subtree` or nested under it,
    /// for `site` only.
    pub fn tree_changed(&mut self, site: &SiteKey, subtree: &Path) {
        let stale: Vec<CacheKey> = self
            .entries
            .keys()
            .filter(|k| &k.site == site && is_under(&k.path, subtree))
            .cloned()
            .collect();
        for key in stale {
            self.remove_key(&key);
        }
    }

    /// Drops every entry past its TTL; returns the earliest remaining
    /// expiry, if any, for the next wakeup.
    pub fn sweep_expired(&mut self, now: Instant) -> Option<Instant> {
        let stale: Vec<CacheKey> =
            self.entries.iter().filter(|(_, e)| e.is_expired(now)).map(|(k, _)| k.clone()).collect();
        for key in stale {
            self.remove_key(&key);
        }
        self.entries.values().map(CacheEntry::expires_at).min()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    #[must_use]
    pub fn used_bytes(&self) -> usize {
        self.used_bytes
    }
}

/// Whether `path` is `subtree` itself or nested beneath it.
fn is_under(path: &Path, subtree: &Path) -> bool {
    if path.root() != subtree.root() {
        return false;
    }
    path.components().len() >= subtree.components().len()
        && path.components()[..subtree.components().len()] == *subtree.components()
}

#[cfg(test)]
mod tests {
    use super::*;
    use session::OpenMode;
    use xfer_path::Path as XPath;

    fn site(host: &str) -> SiteKey {
        use urlgrammar::Url;
        let url = Url::parse(&format!("ftp://{host}/")).unwrap();
        session::SessionIdentity::from_url(&url).unwrap().site_key()
    }

    fn key(host: &str, path: &str) -> CacheKey {
        CacheKey::new(site(host), XPath::parse(path), OpenMode::List)
    }

    #[test]
    fn put_then_get_round_trips() {
        let mut cache = ResponseCache::new(1 << 20);
        let now = Instant::now();
        cache.put(key("a", "/dir/"), CacheValue::Response { data: vec![1, 2, 3], file_set: None }, now);
        let got = cache.get(&key("a", "/dir/"), now);
        assert!(matches!(got, Some(CacheValue::Response { data, .. }) if data == &[1, 2, 3]));
    }

    #[test]
    fn expired_entry_is_evicted_on_get() {
        let mut cache = ResponseCache::new(1 << 20);
        cache.set_ttl(Duration::from_secs(1));
        let now = Instant::now();
        cache.put(key("a", "/dir/"), CacheValue::Response { data: vec![9], file_set: None }, now);
        let later = now + Duration::from_secs(2);
        assert!(cache.get(&key("a", "/dir/"), later).is_none());
        assert!(cache.is_empty());
    }

    #[test]
    fn over_budget_evicts_least_recently_used() {
        let mut cache = ResponseCache::new(10);
        let now = Instant::now();
        cache.put(key("a", "/x/"), CacheValue::Response { data: vec![0; 6], file_set: None }, now);
        cache.put(key("a", "/y/"), CacheValue::Response { data: vec![0; 6], file_set: None }, now);
        assert_eq!(cache.len(), 1);
        assert!(cache.get(&key("a", "/y/"), now).is_some());
        assert!(cache.get(&key("a", "/x/"), now).is_none());
    }

    #[test]
    fn file_changed_invalidates_file_and_parent_listing() {
        let mut cache = ResponseCache::new(1 << 20);
        let now = Instant::now();
        cache.put(key("a", "/dir/file.txt"), CacheValue::Response { data: vec![1], file_set: None }, now);
        cache.put(key("a", "/dir/"), CacheValue::Response { data: vec![2], file_set: None }, now);
        cache.put(key("a", "/other/"), CacheValue::Response { data: vec![3], file_set: None }, now);
        cache.file_changed(&site("a"), &XPath::parse("/dir/file.txt"));
        assert_eq!(cache.len(), 1);
        assert!(cache.get(&key("a", "/other/"), now).is_some());
    }

    #[test]
    fn tree_changed_invalidates_nested_paths_only_for_matching_site() {
        let mut cache = ResponseCache::new(1 << 20);
        let now = Instant::now();
        cache.put(key("a", "/proj/src/main.rs"), CacheValue::Response { data: vec![1], file_set: None }, now);
        cache.put(key("b", "/proj/src/main.rs"), CacheValue::Response { data: vec![1], file_set: None }, now);
        cache.put(key("a", "/elsewhere/"), CacheValue::Response { data: vec![2], file_set: None }, now);
        cache.tree_changed(&site("a"), &XPath::parse("/proj/"));
        assert_eq!(cache.len(), 2);
        assert!(cache.get(&key("b", "/proj/src/main.rs"), now).is_some());
        assert!(cache.get(&key("a", "/elsewhere/"), now).is_some());
    }

    #[test]
    fn sweep_expired_reports_earliest_remaining_deadline() {
        let mut cache = ResponseCache::new(1 << 20);
        cache.set_ttl(Duration::from_secs(10));
        let now = Instant::now();
        cache.put(key("a", "/x/"), CacheValue::Response { data: vec![1], file_set: None }, now);
        let next = cache.sweep_expired(now);
        assert_eq!(next, Some(now + Duration::from_secs(10)));
    }
}
