//! The uniform operation surface every protocol engine implements, and the
//! small outcome enum operations report through.

use std::time::SystemTime;

use xfer_path::Path;

use crate::error::XferError;
use crate::state::OpenMode;

/// The result of polling a non-blocking operation to see if it has
/// finished. Every `Session` method is fire-and-forget; the caller steps
/// the scheduler and re-checks [`Session::done`] until it stops returning
/// `InProgress`.
#[derive(Debug)]
pub enum Outcome {
    Ok,
    InProgress,
    Err(XferError),
}

impl Outcome {
    #[must_use]
    pub fn is_in_progress(&self) -> bool {
        matches!(self, Outcome::InProgress)
    }

    #[must_use]
    pub fn is_done(&self) -> bool {
        !self.is_in_progress()
    }
}

/// Either a chunk of bytes, end of file, or "try again once readable".
#[derive(Debug)]
pub enum ReadOutcome {
    Bytes(Vec<u8>),
    Eof,
    Again,
    Err(XferError),
}

/// Where a seek lands: an absolute offset, or the current end of file.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum SeekTarget {
    Offset(u64),
    End,
}

/// The uniform session surface consumed by the copy pipeline and by
/// external jobs. Every protocol engine (FTP, SFTP, FISH, HTTP) implements
/// this trait once for its own state machine.
pub trait Session {
    fn open(&mut self, path: &Path, mode: OpenMode, pos: u64) -> Outcome;
    fn close(&mut self) -> Outcome;

    fn read(&mut self, max: usize) -> ReadOutcome;
    fn write(&mut self, bytes: &[u8]) -> Result<usize, XferError>;

    fn store_status(&self) -> Outcome;
    fn done(&self) -> Outcome;

    fn rename(&mut self, from: &Path, to: &Path) -> Outcome;
    fn mkdir(&mut self, path: &Path, all_parents: bool) -> Outcome;
    fn chdir(&mut self, path: &Path, verify: bool) -> Outcome;
    fn chmod(&mut self, path: &Path, mode: u32) -> Outcome;
    fn remove(&mut self, path: &Path) -> Outcome;
    fn remove_dir(&mut self, path: &Path) -> Outcome;

    fn set_date(&mut self, date: SystemTime);
    fn set_size(&mut self, size: u64);
    fn want_size(&mut self) -> Option<u64>;
    fn want_date(&mut self) -> Option<SystemTime>;

    fn get_cwd(&self) -> &Path;
    fn get_home(&self) -> Option<&Path>;

    fn ascii_transfer(&mut self, enabled: bool);
    fn set_limit(&mut self, end: Option<u64>);
    fn set_priority(&mut self, priority: i32);
    fn is_connected(&self) -> bool;

    /// Seeking on the currently open stream; not part of the minimal
    /// consumer-facing set but required by the copy pipeline's peer
    /// contract when reconciling source and destination offsets.
    fn seek(&mut self, target: SeekTarget) -> Outcome;
    fn can_seek(&self, to: u64) -> bool;
    fn get_seek_pos(&self) -> i64;
    fn get_real_pos(&self) -> i64;
    fn buffered(&self) -> usize;
    fn io_ready(&self) -> bool;
    fn needs_size_date_beforehand(&self) -> bool;
    fn put_eof(&mut self);
    fn error(&self) -> Option<&XferError>;
    fn remove_file(&mut self) -> Outcome;
}
