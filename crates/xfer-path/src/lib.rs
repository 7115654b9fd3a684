//! Path model and file-metadata types shared by every session backend and
//! the response cache.

mod fileset;
mod meta;
mod path;

pub use fileset::{FileSet, SortOrder};
pub use meta::{DefinedFlags, FileKind, FileMeta, MtimePrecision};
pub use path::{Path, Root};
