//! The task contract every component that progresses over time implements.

use std::time::{Duration, Instant};

/// The outcome of one call to [`Task::step`].
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum StepResult {
    /// Nothing changed; the task is waiting on I/O, a timer, or a child.
    Stall,
    /// The task made forward progress; the scheduler should give every
    /// other ready task another pass before blocking on poll.
    Moved,
    /// The task is finished and wants to be destroyed.
    WantDie,
}

/// A cooperative signal a parent injects into a child via [`Task::accept_signal`].
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum Signal {
    Term,
    Int,
    Cont,
}

/// What a task is waiting on: an fd's readiness and/or a time deadline.
/// `None` for both means the task has no external wait and will be
/// stepped again on the very next pass.
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq)]
pub struct Interest {
    pub read_fd: Option<i32>,
    pub write_fd: Option<i32>,
    pub deadline: Option<Instant>,
}

impl Interest {
    #[must_use]
    pub fn none() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn readable(fd: i32) -> Self {
        Self {
            read_fd: Some(fd),
            ..Self::default()
        }
    }

    #[must_use]
    pub fn writable(fd: i32) -> Self {
        Self {
            write_fd: Some(fd),
            ..Self::default()
        }
    }

    #[must_use]
    pub fn timeout_at(deadline: Instant) -> Self {
        Self {
            deadline: Some(deadline),
            ..Self::default()
        }
    }

    #[must_use]
    pub fn time_until(&self, now: Instant) -> Option<Duration> {
        self.deadline.map(|d| d.saturating_duration_since(now))
    }
}

/// A unit of work the [`crate::Scheduler`] drives to completion.
///
/// Implementors never block: `step` performs at most one forward
/// transition and reports whether anything changed.
pub trait Task {
    /// Advances the task by at most one transition.
    fn step(&mut self) -> StepResult;

    /// What the task is currently waiting on, consulted only after `step`
    /// returns [`StepResult::Stall`].
    fn interest(&self) -> Interest {
        Interest::none()
    }

    /// Offers a cooperative signal to the task. Returns `true` if the
    /// task consumed it (and should be re-stepped), `false` if the
    /// scheduler should fall back to its default handling (SIGTERM/SIGINT
    /// destroy the task; SIGCONT is a no-op if unconsumed).
    fn accept_signal(&mut self, _signal: Signal) -> bool {
        false
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn interest_none_has_no_deadline() {
        let interest = Interest::none();
        assert_eq!(interest.time_until(Instant::now()), None);
    }

    #[test]
    fn time_until_saturates_at_zero_for_past_deadlines() {
        let past = Instant::now() - Duration::from_secs(10);
        let interest = Interest::timeout_at(past);
        assert_eq!(interest.time_until(Instant::now()), Some(Duration::ZERO));
    }
}
