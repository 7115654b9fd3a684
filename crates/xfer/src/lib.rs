//! # Overview
//!
//! `xfer` is the top of the workspace: it wires the session abstraction,
//! the four protocol engines, the connection pool, the response cache, and
//! the copy pipeline behind one dispatch surface so an embedder only needs
//! a URL pair and a [`config::Settings`] table to start a transfer.
//!
//! # Design
//!
//! - [`session::AnySession`] erases which of the four engines a session
//!   actually is, so [`xfer_pool::Pool`] and [`copy_pipeline::CopyPipeline`]
//!   stay generic over one concrete type instead of needing a trait object.
//! - [`dispatch::open_session`] parses a URL, resolves its
//!   [`session::SessionIdentity`], and constructs the matching engine with
//!   its config snapshot.
//! - [`copy::start_copy`] is the one call most embedders need: open both
//!   ends and hand back a pipeline ready to step.
//! - [`context::Context`] bundles the process-wide singletons (cache, pool,
//!   settings, verbosity, scheduler) a long-running embedder threads
//!   through every site it talks to.
//! - [`init::install_crypto_provider`] must run once before the first
//!   `ftps`/`https`/TLS-wrapped `sftp` session is opened.
//!
//! # Errors
//!
//! Every fallible call returns [`session::XferError`]; there is no
//! workspace-wide error type layered on top of it.

pub mod context;
pub mod copy;
pub mod dispatch;
pub mod init;
pub mod session;

pub use context::Context;
pub use copy::{start_copy, AnyCopy};
pub use dispatch::open_session;
pub use init::install_crypto_provider;
pub use session::AnySession;
