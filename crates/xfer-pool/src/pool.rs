//! The fixed-size idle-session pool and connection takeover.

use std::time::{Duration, Instant};

use session::SiteKey;
use xfer_path::Path;

use crate::slot::PooledSession;

/// A bounded array of idle sessions, reused by identity on open and
/// eligible for cross-job takeover when idle long enough.
pub struct Pool<S> {
    slots: Vec<PooledSession<S>>,
    capacity: usize,
}

impl<S> Pool<S> {
    #[must_use]
    pub fn new(capacity: usize) -> Self {
        Self { slots: Vec::with_capacity(capacity), capacity }
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.slots.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }

    /// Returns a session to the pool. If the pool is full, keeps whichever
    /// of the incoming session and the current weakest slot scores best
    /// and destroys (drops) the other.
    pub fn give_back(&mut self, pooled: PooledSession<S>, now: Instant) {
        if self.slots.len() < self.capacity {
            self.slots.push(pooled);
            return;
        }
        let Some((weakest_idx, _)) =
            self.slots.iter().enumerate().min_by_key(|(_, s)| s.score(now))
        else {
            return;
        };
        if pooled.score(now) > self.slots[weakest_idx].score(now) {
            self.slots[weakest_idx] = pooled;
        }
        // else: `pooled` is dropped here, destroying its session.
    }

    /// Reuse-by-identity: takes the first idle session exactly matching
    /// `site`, regardless of its cwd.
    pub fn take_matching(&mut self, site: &SiteKey) -> Option<PooledSession<S>> {
        let idx = self.slots.iter().position(|s| &s.site == site)?;
        Some(self.slots.swap_remove(idx))
    }

    /// Connection takeover: among sessions owned by a priority strictly
    /// lower than `requesting_priority` and idle at least `priority_diff`,
    /// takes the weakest one (so the best low-priority session survives if
    /// more than one qualifies and taking just one is enough).
    pub fn take_over(
        &mut self,
        requesting_priority: i32,
        priority_diff: Duration,
        now: Instant,
    ) -> Option<PooledSession<S>> {
        let idx = self
            .slots
            .iter()
            .enumerate()
            .filter(|(_, s)| {
                s.owner_priority < requesting_priority
                    && now.saturating_duration_since(s.idle_since) >= priority_diff
            })
            .min_by_key(|(_, s)| s.score(now))
            .map(|(idx, _)| idx)?;
        Some(self.slots.swap_remove(idx))
    }

    /// Scans for an idle session whose cwd is `path` or an ancestor of it,
    /// for the "connection-slot alias" form of reuse (a session already
    /// positioned somewhere under the requested directory).
    pub fn take_under(&mut self, site: &SiteKey, path: &Path) -> Option<PooledSession<S>> {
        let idx = self.slots.iter().position(|s| &s.site == site && is_ancestor(&s.cwd, path))?;
        Some(self.slots.swap_remove(idx))
    }
}

fn is_ancestor(candidate: &Path, path: &Path) -> bool {
    candidate.root() == path.root()
        && candidate.components().len() <= path.components().len()
        && path.components()[..candidate.components().len()] == *candidate.components()
}

#[cfg(test)]
mod tests {
    use super::*;
    use urlgrammar::Url;

    fn site(host: &str) -> SiteKey {
        let url = Url::parse(&format!("ftp://{host}/")).unwrap();
        session::SessionIdentity::from_url(&url).unwrap().site_key()
    }

    fn pooled(host: &str, cwd: &str, priority: i32, idle_since: Instant) -> PooledSession<u32> {
        PooledSession::new(site(host), Path::parse(cwd), 0, priority, idle_since)
    }

    #[test]
    fn give_back_and_take_matching_round_trips() {
        let mut pool: Pool<u32> = Pool::new(4);
        let now = Instant::now();
        pool.give_back(pooled("a", "/home/", 0, now), now);
        let taken = pool.take_matching(&site("a"));
        assert!(taken.is_some());
        assert!(pool.is_empty());
    }

    #[test]
    fn overflow_keeps_session_with_deeper_cwd() {
        let mut pool: Pool<u32> = Pool::new(1);
        let now = Instant::now();
        pool.give_back(pooled("a", "/", 0, now), now);
        pool.give_back(pooled("b", "/deep/nested/dir/", 0, now), now);
        assert_eq!(pool.len(), 1);
        assert!(pool.take_matching(&site("b")).is_some());
    }

    #[test]
    fn overflow_drops_incoming_when_it_scores_worse() {
        let mut pool: Pool<u32> = Pool::new(1);
        let now = Instant::now();
        pool.give_back(pooled("a", "/deep/nested/dir/", 0, now), now);
        pool.give_back(pooled("b", "/", 0, now), now);
        assert!(pool.take_matching(&site("a")).is_some());
    }

    #[test]
    fn take_over_requires_priority_and_idle_threshold() {
        let mut pool: Pool<u32> = Pool::new(4);
        let now = Instant::now();
        pool.give_back(pooled("a", "/", 2, now - Duration::from_secs(30)), now);

        assert!(pool.take_over(5, Duration::from_secs(60), now).is_none(), "not idle long enough yet");
        assert!(pool.take_over(1, Duration::from_secs(10), now).is_none(), "requester priority too low");
        assert!(pool.take_over(5, Duration::from_secs(10), now).is_some());
    }

    #[test]
    fn take_under_matches_ancestor_directory() {
        let mut pool: Pool<u32> = Pool::new(4);
        let now = Instant::now();
        pool.give_back(pooled("a", "/proj/src/", 0, now), now);
        let taken = pool.take_under(&site("a"), &Path::parse("/proj/src/main.rs"));
        assert!(taken.is_some());
    }
}
