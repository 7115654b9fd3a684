//! # Overview
//!
//! The scheduler steps every ready task until a full pass reports only
//! [`StepResult::Stall`], then blocks on `poll()` for `min` of the
//! per-task requested timeouts. Tasks are held in a generation-checked
//! arena rather than an intrusive linked list so a stale [`TaskId`] from a
//! destroyed task is detected instead of dereferencing freed memory.

use std::time::{Duration, Instant};

use tracing::trace;

use crate::task::{Interest, Signal, StepResult, Task};

/// A generation-checked handle into the scheduler's task arena.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Hash)]
pub struct TaskId {
    index: usize,
    generation: u32,
}

enum Slot {
    Vacant { generation: u32 },
    Occupied { generation: u32, entry: Entry },
}

struct Entry {
    task: Box<dyn Task>,
    parent: Option<TaskId>,
    children: Vec<TaskId>,
}

/// Cooperative, single-threaded step-loop scheduler.
#[derive(Default)]
pub struct Scheduler {
    slots: Vec<Slot>,
    free: Vec<usize>,
}

impl Scheduler {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers `task`, optionally as a child of `parent`. Destroying
    /// `parent` later destroys this task too.
    pub fn spawn(&mut self, task: Box<dyn Task>, parent: Option<TaskId>) -> TaskId {
        let entry = Entry {
            task,
            parent,
            children: Vec::new(),
        };
        let id = if let Some(index) = self.free.pop() {
            let generation = match &self.slots[index] {
                Slot::Vacant { generation } => *generation,
                Slot::Occupied { .. } => unreachable!("free list points at occupied slot"),
            };
            self.slots[index] = Slot::Occupied { generation, entry };
            TaskId { index, generation }
        } else {
            let index = self.slots.len();
            self.slots.push(Slot::Occupied { generation: 0, entry });
            TaskId { index, generation: 0 }
        };

        if let Some(parent) = parent {
            if let Some(parent_entry) = self.entry_mut(parent) {
                parent_entry.children.push(id);
            }
        }
        id
    }

    fn entry_mut(&mut self, id: TaskId) -> Option<&mut Entry> {
        match self.slots.get_mut(id.index) {
            Some(Slot::Occupied { generation, entry }) if *generation == id.generation => Some(entry),
            _ => None,
        }
    }

    fn entry(&self, id: TaskId) -> Option<&Entry> {
        match self.slots.get(id.index) {
            Some(Slot::Occupied { generation, entry }) if *generation == id.generation => Some(entry),
            _ => None,
        }
    }

    /// Whether `id` still refers to a live task.
    #[must_use]
    pub fn is_alive(&self, id: TaskId) -> bool {
        self.entry(id).is_some()
    }

    /// Destroys `id` and, recursively, every descendant it spawned.
    pub fn destroy(&mut self, id: TaskId) {
        let children = match self.slots.get_mut(id.index) {
            Some(Slot::Occupied { generation, entry }) if *generation == id.generation => {
                std::mem::take(&mut entry.children)
            }
            _ => return,
        };
        for child in children {
            self.destroy(child);
        }
        if let Some(Slot::Occupied { generation, .. }) = self.slots.get(id.index) {
            let generation = *generation;
            self.slots[id.index] = Slot::Vacant {
                generation: generation.wrapping_add(1),
            };
            self.free.push(id.index);
        }
    }

    /// Injects `signal` into `id`. If the task does not consume it via
    /// [`Task::accept_signal`], Term/Int fall back to destroying the task
    /// (and its subtree); Cont is a no-op when unconsumed.
    pub fn kill(&mut self, id: TaskId, signal: Signal) {
        let consumed = self
            .entry_mut(id)
            .map(|entry| entry.task.accept_signal(signal))
            .unwrap_or(false);
        if !consumed && matches!(signal, Signal::Term | Signal::Int) {
            self.destroy(id);
        }
    }

    /// Steps every live task once. Returns `true` if any task reported
    /// [`StepResult::Moved`] (the caller should call again without
    /// blocking); tasks reporting [`StepResult::WantDie`] are destroyed
    /// immediately.
    pub fn run_pass(&mut self) -> bool {
        let mut moved = false;
        let ids: Vec<TaskId> = self
            .slots
            .iter()
            .enumerate()
            .filter_map(|(index, slot)| match slot {
                Slot::Occupied { generation, .. } => Some(TaskId {
                    index,
                    generation: *generation,
                }),
                Slot::Vacant { .. } => None,
            })
            .collect();

        for id in ids {
            let Some(entry) = self.entry_mut(id) else { continue };
            match entry.task.step() {
                StepResult::Moved => {
                    moved = true;
                    trace!(task = id.index, "task moved");
                }
                StepResult::Stall => {}
                StepResult::WantDie => {
                    trace!(task = id.index, "task wants to die");
                    self.destroy(id);
                }
            }
        }
        moved
    }

    /// Runs passes until a full pass reports no progress, then returns the
    /// minimum requested timeout across every remaining live task (`None`
    /// if none have a deadline — the caller should then block on I/O
    /// readiness alone).
    pub fn quiesce(&mut self) -> Option<Duration> {
        while self.run_pass() {}
        let now = Instant::now();
        self.interests().iter().filter_map(|i| i.time_until(now)).min()
    }

    /// The [`Interest`] of every live task, for the caller to build a
    /// poll-set from.
    #[must_use]
    pub fn interests(&self) -> Vec<Interest> {
        self.slots
            .iter()
            .filter_map(|slot| match slot {
                Slot::Occupied { entry, .. } => Some(entry.task.interest()),
                Slot::Vacant { .. } => None,
            })
            .collect()
    }

    /// Number of currently live tasks.
    #[must_use]
    pub fn len(&self) -> usize {
        self.slots
            .iter()
            .filter(|slot| matches!(slot, Slot::Occupied { .. }))
            .count()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct CountingTask {
        remaining: u32,
    }

    impl Task for CountingTask {
        fn step(&mut self) -> StepResult {
            if self.remaining == 0 {
                return StepResult::WantDie;
            }
            self.remaining -= 1;
            StepResult::Moved
        }
    }

    struct StallingTask;

    impl Task for StallingTask {
        fn step(&mut self) -> StepResult {
            StepResult::Stall
        }

        fn interest(&self) -> Interest {
            Interest::timeout_at(Instant::now() + Duration::from_millis(50))
        }
    }

    #[test]
    fn spawn_and_destroy_round_trips_id() {
        let mut scheduler = Scheduler::new();
        let id = scheduler.spawn(Box::new(StallingTask), None);
        assert!(scheduler.is_alive(id));
        scheduler.destroy(id);
        assert!(!scheduler.is_alive(id));
    }

    #[test]
    fn stale_id_after_slot_reuse_is_detected() {
        let mut scheduler = Scheduler::new();
        let first = scheduler.spawn(Box::new(StallingTask), None);
        scheduler.destroy(first);
        let second = scheduler.spawn(Box::new(StallingTask), None);
        assert_eq!(first.index, second.index);
        assert!(!scheduler.is_alive(first));
        assert!(scheduler.is_alive(second));
    }

    #[test]
    fn destroying_parent_destroys_children() {
        let mut scheduler = Scheduler::new();
        let parent = scheduler.spawn(Box::new(StallingTask), None);
        let child = scheduler.spawn(Box::new(StallingTask), Some(parent));
        scheduler.destroy(parent);
        assert!(!scheduler.is_alive(parent));
        assert!(!scheduler.is_alive(child));
    }

    #[test]
    fn run_pass_reports_progress_until_stall() {
        let mut scheduler = Scheduler::new();
        scheduler.spawn(Box::new(CountingTask { remaining: 3 }), None);
        let mut passes = 0;
        while scheduler.run_pass() {
            passes += 1;
            assert!(passes < 100, "runaway loop");
        }
        assert_eq!(passes, 3);
        assert!(scheduler.is_empty());
    }

    #[test]
    fn quiesce_returns_minimum_deadline() {
        let mut scheduler = Scheduler::new();
        scheduler.spawn(Box::new(StallingTask), None);
        let timeout = scheduler.quiesce();
        assert!(timeout.is_some());
        assert!(timeout.unwrap() <= Duration::from_millis(50));
    }

    #[test]
    fn kill_without_acceptor_destroys_task() {
        let mut scheduler = Scheduler::new();
        let id = scheduler.spawn(Box::new(StallingTask), None);
        scheduler.kill(id, Signal::Term);
        assert!(!scheduler.is_alive(id));
    }
}
