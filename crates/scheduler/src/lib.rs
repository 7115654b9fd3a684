//! # Overview
//!
//! A cooperative, single-threaded scheduler: every session, copy job, and
//! background resolver is a [`Task`] that advances by at most one
//! transition per [`Task::step`] call. The [`Scheduler`] repeatedly steps
//! all live tasks until a full pass makes no progress, then the caller
//! blocks on I/O readiness for the minimum of every task's requested
//! timeout.
//!
//! # Design
//!
//! Tasks are owned by a generation-checked arena ([`TaskId`]) rather than
//! an intrusive parent/child pointer graph: destroying a parent recurses
//! over its recorded children instead of walking raw pointers, and a
//! [`TaskId`] captured before a destroy is detected as stale rather than
//! aliasing a reused slot.
//!
//! # Invariants
//!
//! - A [`TaskId`] is valid only for the generation it was issued under;
//!   [`Scheduler::is_alive`] is the authoritative liveness check.
//! - `step` never blocks; waiting is expressed by returning
//!   [`StepResult::Stall`] and describing the wait via [`Task::interest`].
//! - Destroying a task destroys its entire subtree.

mod scheduler;
mod task;

pub use scheduler::{Scheduler, TaskId};
pub use task::{Interest, Signal, StepResult, Task};

#[cfg(unix)]
mod poller;

#[cfg(unix)]
pub use poller::block_until_ready;
