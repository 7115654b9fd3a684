//! A single idle session held by the pool, plus the scoring the pool uses
//! to decide which of two idle sessions is worth keeping.

use std::cmp::Reverse;
use std::time::{Duration, Instant};

use session::SiteKey;
use xfer_path::Path;

/// An idle, reusable session sitting in the pool, tagged with enough
/// bookkeeping to score and evict it.
pub struct PooledSession<S> {
    pub site: SiteKey,
    pub cwd: Path,
    pub session: S,
    /// Priority of the job that last owned this session; used to decide
    /// whether another job may take it over.
    pub owner_priority: i32,
    pub idle_since: Instant,
}

impl<S> PooledSession<S> {
    #[must_use]
    pub fn new(site: SiteKey, cwd: Path, session: S, owner_priority: i32, idle_since: Instant) -> Self {
        Self { site, cwd, session, owner_priority, idle_since }
    }

    /// "Best" session: longest valid cwd, then most recently used. Higher
    /// sorts better; `cwd` depth stands in for "valid" since a session that
    /// has actually changed directory somewhere specific is worth more to
    /// keep than one still sitting at its login directory.
    pub(crate) fn score(&self, now: Instant) -> (usize, Reverse<Duration>) {
        let elapsed = now.saturating_duration_since(self.idle_since);
        (self.cwd.components().len(), Reverse(elapsed))
    }
}
