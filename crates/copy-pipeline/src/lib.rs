//! The two-peer copy dataflow shared by every transfer direction (upload,
//! download, and FXP-style peer-to-peer), ported from lftp's `FileCopy`.

mod options;
mod pipeline;
mod speedometer;
mod state;

pub use options::{CopyOptions, DEFAULT_MAX_BUF, DEFAULT_SKIP_THRESHOLD};
pub use pipeline::CopyPipeline;
pub use speedometer::Speedometer;
pub use state::CopyState;
