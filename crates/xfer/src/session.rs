//! [`AnySession`] erases which protocol engine a session actually is, so
//! the pool, the cache, and the copy pipeline can all be generic over one
//! concrete type instead of `Box<dyn Session>` (the engines differ enough
//! in constructor shape that a trait object would still need a matching
//! enum at construction time, so this goes straight to the enum).

use std::time::SystemTime;

use scheduler::{Interest, StepResult, Task};
use session::{Outcome, ReadOutcome, SeekTarget, Session, XferError};
use xfer_path::Path;

use proto_fish::FishEngine;
use proto_ftp::FtpEngine;
use proto_http::HttpEngine;
use proto_sftp::SftpEngine;

/// A session backed by one of the four wire engines this core implements.
pub enum AnySession {
    Ftp(FtpEngine),
    Sftp(SftpEngine),
    Fish(FishEngine),
    Http(HttpEngine),
}

macro_rules! dispatch {
    ($self:ident, $method:ident($($arg:ident),*)) => {
        match $self {
            AnySession::Ftp(e) => e.$method($($arg),*),
            AnySession::Sftp(e) => e.$method($($arg),*),
            AnySession::Fish(e) => e.$method($($arg),*),
            AnySession::Http(e) => e.$method($($arg),*),
        }
    };
}

impl Task for AnySession {
    fn step(&mut self) -> StepResult {
        dispatch!(self, step())
    }

    fn interest(&self) -> Interest {
        dispatch!(self, interest())
    }
}

impl Session for AnySession {
    fn open(&mut self, path: &Path, mode: session::OpenMode, pos: u64) -> Outcome {
        dispatch!(self, open(path, mode, pos))
    }

    fn close(&mut self) -> Outcome {
        dispatch!(self, close())
    }

    fn read(&mut self, max: usize) -> ReadOutcome {
        dispatch!(self, read(max))
    }

    fn write(&mut self, bytes: &[u8]) -> Result<usize, XferError> {
        dispatch!(self, write(bytes))
    }

    fn store_status(&self) -> Outcome {
        dispatch!(self, store_status())
    }

    fn done(&self) -> Outcome {
        dispatch!(self, done())
    }

    fn rename(&mut self, from: &Path, to: &Path) -> Outcome {
        dispatch!(self, rename(from, to))
    }

    fn mkdir(&mut self, path: &Path, all_parents: bool) -> Outcome {
        dispatch!(self, mkdir(path, all_parents))
    }

    fn chdir(&mut self, path: &Path, verify: bool) -> Outcome {
        dispatch!(self, chdir(path, verify))
    }

    fn chmod(&mut self, path: &Path, mode: u32) -> Outcome {
        dispatch!(self, chmod(path, mode))
    }

    fn remove(&mut self, path: &Path) -> Outcome {
        dispatch!(self, remove(path))
    }

    fn remove_dir(&mut self, path: &Path) -> Outcome {
        dispatch!(self, remove_dir(path))
    }

    fn set_date(&mut self, date: SystemTime) {
        dispatch!(self, set_date(date))
    }

    fn set_size(&mut self, size: u64) {
        dispatch!(self, set_size(size))
    }

    fn want_size(&mut self) -> Option<u64> {
        dispatch!(self, want_size())
    }

    fn want_date(&mut self) -> Option<SystemTime> {
        dispatch!(self, want_date())
    }

    fn get_cwd(&self) -> &Path {
        dispatch!(self, get_cwd())
    }

    fn get_home(&self) -> Option<&Path> {
        dispatch!(self, get_home())
    }

    fn ascii_transfer(&mut self, enabled: bool) {
        dispatch!(self, ascii_transfer(enabled))
    }

    fn set_limit(&mut self, end: Option<u64>) {
        dispatch!(self, set_limit(end))
    }

    fn set_priority(&mut self, priority: i32) {
        dispatch!(self, set_priority(priority))
    }

    fn is_connected(&self) -> bool {
        dispatch!(self, is_connected())
    }

    fn seek(&mut self, target: SeekTarget) -> Outcome {
        dispatch!(self, seek(target))
    }

    fn can_seek(&self, to: u64) -> bool {
        dispatch!(self, can_seek(to))
    }

    fn get_seek_pos(&self) -> i64 {
        dispatch!(self, get_seek_pos())
    }

    fn get_real_pos(&self) -> i64 {
        dispatch!(self, get_real_pos())
    }

    fn buffered(&self) -> usize {
        dispatch!(self, buffered())
    }

    fn io_ready(&self) -> bool {
        dispatch!(self, io_ready())
    }

    fn needs_size_date_beforehand(&self) -> bool {
        dispatch!(self, needs_size_date_beforehand())
    }

    fn put_eof(&mut self) {
        dispatch!(self, put_eof())
    }

    fn error(&self) -> Option<&XferError> {
        dispatch!(self, error())
    }

    fn remove_file(&mut self) -> Outcome {
        dispatch!(self, remove_file())
    }
}
