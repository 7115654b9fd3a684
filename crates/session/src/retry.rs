//! Retry bookkeeping carried on [`crate::state::SessionState`].
//!
//! lftp's `NetAccess` tracks two separate counters: one reset on every
//! successful reconnect (`attempt`) and one that survives across
//! reconnects to bound how many times the *same logical operation* may be
//! retried (`persistent`, lftp's `persist_retries`).

/// Exponential backoff schedule: `base * multiplier^attempt`, capped at `max`.
#[derive(Clone, Copy, Debug)]
pub struct BackoffSchedule {
    pub base: std::time::Duration,
    pub multiplier: f64,
    pub max: std::time::Duration,
}

impl BackoffSchedule {
    #[must_use]
    pub fn delay_for(&self, attempt: u32) -> std::time::Duration {
        let scaled = self.base.as_secs_f64() * self.multiplier.powi(attempt as i32);
        std::time::Duration::from_secs_f64(scaled).min(self.max)
    }
}

/// Two retry counters: `attempt` resets whenever a reconnect succeeds;
/// `persistent` never resets and bounds retries of the same job end to end.
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq)]
pub struct RetryBudget {
    pub attempt: u32,
    pub persistent: u32,
}

impl RetryBudget {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record_attempt(&mut self) {
        self.attempt += 1;
        self.persistent += 1;
    }

    /// Called after a reconnect succeeds — only `attempt` resets.
    pub fn record_reconnect_success(&mut self) {
        self.attempt = 0;
    }

    #[must_use]
    pub fn attempt_exhausted(&self, max_retries: u32) -> bool {
        self.attempt >= max_retries
    }

    #[must_use]
    pub fn persistent_exhausted(&self, persist_retries: u32) -> bool {
        persist_retries > 0 && self.persistent >= persist_retries
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[test]
    fn reconnect_success_resets_only_attempt() {
        let mut budget = RetryBudget::new();
        budget.record_attempt();
        budget.record_attempt();
        budget.record_reconnect_success();
        assert_eq!(budget.attempt, 0);
        assert_eq!(budget.persistent, 2);
    }

    #[test]
    fn persistent_survives_reconnects() {
        let mut budget = RetryBudget::new();
        for _ in 0..5 {
            budget.record_attempt();
            budget.record_reconnect_success();
        }
        assert!(budget.persistent_exhausted(5));
        assert!(!budget.attempt_exhausted(5));
    }

    #[test]
    fn zero_persist_retries_means_unbounded() {
        let mut budget = RetryBudget::new();
        budget.record_attempt();
        assert!(!budget.persistent_exhausted(0));
    }

    #[test]
    fn backoff_grows_and_caps() {
        let schedule = BackoffSchedule {
            base: Duration::from_secs(1),
            multiplier: 2.0,
            max: Duration::from_secs(30),
        };
        assert_eq!(schedule.delay_for(0), Duration::from_secs(1));
        assert_eq!(schedule.delay_for(1), Duration::from_secs(2));
        assert_eq!(schedule.delay_for(10), Duration::from_secs(30));
    }
}
