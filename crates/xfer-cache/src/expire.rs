//! The scheduler task that sweeps expired entries so a memory-only TTL
//! doesn't need every caller to remember to call [`ResponseCache::sweep_expired`].

use std::cell::RefCell;
use std::rc::Rc;
use std::time::Instant;

use scheduler::{Interest, StepResult, Task};

use crate::cache::ResponseCache;

/// Wakes at the earliest TTL deadline across the whole cache and purges
/// whatever has expired by then. Never reports [`StepResult::WantDie`] —
/// it lives for the process, like the cache it serves.
pub struct ExpireHelper {
    cache: Rc<RefCell<ResponseCache>>,
    next_deadline: Option<Instant>,
}

impl ExpireHelper {
    #[must_use]
    pub fn new(cache: Rc<RefCell<ResponseCache>>) -> Self {
        Self { cache, next_deadline: None }
    }
}

impl Task for ExpireHelper {
    fn step(&mut self) -> StepResult {
        let now = Instant::now();
        let due = match self.next_deadline {
            Some(deadline) => now >= deadline,
            None => true,
        };
        if due {
            self.next_deadline = self.cache.borrow_mut().sweep_expired(now);
        }
        StepResult::Stall
    }

    fn interest(&self) -> Interest {
        match self.next_deadline {
            Some(deadline) => Interest::timeout_at(deadline),
            None => Interest::none(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::entry::CacheValue;
    use crate::key::CacheKey;
    use session::OpenMode;
    use std::time::Duration;
    use urlgrammar::Url;
    use xfer_path::Path;

    fn key() -> CacheKey {
        let url = Url::parse("ftp://host/").unwrap();
        let site = session::SessionIdentity::from_url(&url).unwrap().site_key();
        CacheKey::new(site, Path::parse("/dir/"), OpenMode::List)
    }

    #[test]
    fn sweeps_expired_entry_once_deadline_passes() {
        let cache = Rc::new(RefCell::new(ResponseCache::new(1 << 20)));
        cache.borrow_mut().set_ttl(Duration::from_millis(0));
        cache.borrow_mut().put(key(), CacheValue::Response { data: vec![1], file_set: None }, Instant::now());

        let mut helper = ExpireHelper::new(cache.clone());
        helper.step();
        assert!(cache.borrow().is_empty());
    }

    #[test]
    fn empty_cache_reports_no_deadline() {
        let cache = Rc::new(RefCell::new(ResponseCache::new(1 << 20)));
        let mut helper = ExpireHelper::new(cache);
        helper.step();
        assert_eq!(helper.interest(), Interest::none());
    }
}
