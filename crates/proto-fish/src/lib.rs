//! FISH session engine: an interactive `ssh` shell driven by `#VERB`
//! commands and `### NNN` markers, the same framing lftp's own FISH
//! backend speaks.

mod command;
mod engine;
mod expectation;
mod lsinfo;
mod quote;
mod response;
mod subprocess;

pub use engine::FishEngine;
pub use quote::shell_encode;
pub use subprocess::Subprocess;
