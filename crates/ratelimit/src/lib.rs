//! # Overview
//!
//! A token bucket per remote host, shared across every session connected
//! to it. Unlike a thread-blocking limiter, [`TokenBucket::register`]
//! never sleeps — it returns the instant a caller should wait until, so a
//! cooperative task can fold that into its poll deadline instead of
//! stalling the whole process.
//!
//! # Design
//!
//! [`HostLimiters`] is the per-process registry; it hands out `Rc<RefCell<..>>`
//! handles rather than requiring callers to route every write through a
//! shared lock, since the engine is single-threaded.

mod bucket;
mod registry;

pub use bucket::TokenBucket;
pub use registry::HostLimiters;
