//! # Overview
//!
//! The protocol-agnostic half of a session: identity (for the pool and
//! cache), the error taxonomy every engine reports through, retry
//! bookkeeping, and the uniform operation trait the copy pipeline and
//! external jobs drive. Each protocol engine crate (`proto-ftp`,
//! `proto-sftp`, `proto-fish`, `proto-http`) implements [`api::Session`]
//! over its own wire state machine, parameterizing [`state::SessionState`].
//!
//! # Design
//!
//! All operations are non-blocking and fire-and-forget: a caller issues
//! `open`/`rename`/... and then steps the scheduler, checking
//! [`api::Session::done`] until it stops reporting
//! [`api::Outcome::InProgress`]. This mirrors the cooperative task
//! contract in the `scheduler` crate — a `Session` is typically wrapped by
//! a `scheduler::Task` impl in each protocol engine rather than being one
//! itself, since a session outlives any single operation.

mod api;
mod error;
mod identity;
mod retry;
mod state;

pub use api::{Outcome, ReadOutcome, SeekTarget, Session};
pub use error::XferError;
pub use identity::{SessionIdentity, SiteKey};
pub use retry::{BackoffSchedule, RetryBudget};
pub use state::{ConnectionPhase, OpenMode, SessionState};
