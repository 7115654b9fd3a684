//! The FISH session engine: an interactive `ssh` shell driven by
//! `#VERB`/marker-framed commands, wired together as a
//! [`scheduler::Task`] and exposed through [`session::Session`].

use std::time::SystemTime;

use scheduler::{Interest, StepResult, Task};
use session::{ConnectionPhase, OpenMode, Outcome, ReadOutcome, SeekTarget, Session, SessionIdentity, SessionState, XferError};
use xfer_path::Path;

use crate::command::{self, Command};
use crate::expectation::{ExpectKind, ExpectationQueue};
use crate::lsinfo;
use crate::response::{self, Reply, ReplyAccumulator};
use crate::subprocess::Subprocess;

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
enum Phase {
    Spawning,
    Handshaking,
    Idle,
    Waiting,
    FileRecv,
    FileSend,
}

pub struct FishEngine {
    identity: SessionIdentity,
    state: SessionState<Phase>,
    subprocess: Option<Subprocess>,

    out_buf: Vec<u8>,
    in_buf: Vec<u8>,
    read_chunk: Vec<u8>,
    accumulator: ReplyAccumulator,
    expectations: ExpectationQueue,

    cwd: Path,
    home: Option<Path>,
    pending_path: Option<Path>,
    pending_rename_to: Option<Path>,

    data_ready: Vec<u8>,
    body_done: bool,
    store_remaining: u64,
}

impl FishEngine {
    #[must_use]
    pub fn new(identity: SessionIdentity) -> Self {
        Self {
            identity,
            state: SessionState::new(Phase::Spawning),
            subprocess: None,
            out_buf: Vec::new(),
            in_buf: Vec::new(),
            read_chunk: vec![0u8; 32 * 1024],
            accumulator: ReplyAccumulator::default(),
            expectations: ExpectationQueue::default(),
            cwd: Path::parse("~"),
            home: None,
            pending_path: None,
            pending_rename_to: None,
            data_ready: Vec::new(),
            body_done: false,
            store_remaining: 0,
        }
    }

    fn begin_connect(&mut self) {
        match Subprocess::spawn(&self.identity.host, Some(self.identity.port).filter(|p| *p != 0), self.identity.user.as_deref()) {
            Ok(subprocess) => {
                self.subprocess = Some(subprocess);
                self.state.phase = ConnectionPhase::Connected;
                self.state.machine = Phase::Handshaking;
                let need_pwd = self.home.is_none();
                for cmd in command::greeting(need_pwd) {
                    self.send_command(cmd);
                }
            }
            Err(e) => self.state.set_error(XferError::SeeErrno { context: "spawn ssh".into(), source: e }),
        }
    }

    fn send_command(&mut self, cmd: Command) {
        self.out_buf.extend_from_slice(cmd.text.as_bytes());
        for expect in cmd.expects {
            self.expectations.push(expect);
        }
    }

    fn pump_io(&mut self) -> StepResult {
        let Some(subprocess) = self.subprocess.as_mut() else { return StepResult::Stall };
        let mut moved = false;

        if !self.out_buf.is_empty() {
            match subprocess.transport().write(&self.out_buf) {
                Ok(0) => {}
                Ok(n) => {
                    self.out_buf.drain(..n);
                    moved = true;
                }
                Err(e) if e.kind() == std::io::ErrorKind::WouldBlock => {}
                Err(e) => {
                    self.state.set_error(XferError::SeeErrno { context: "write to ssh stdin".into(), source: e });
                    return StepResult::Moved;
                }
            }
        }

        match subprocess.transport().read(&mut self.read_chunk) {
            Ok(0) => {}
            Ok(n) => {
                self.in_buf.extend_from_slice(&self.read_chunk[..n]);
                moved = true;
            }
            Err(e) if e.kind() == std::io::ErrorKind::WouldBlock => {}
            Err(e) => {
                self.state.set_error(XferError::SeeErrno { context: "read from ssh stdout".into(), source: e });
                return StepResult::Moved;
            }
        }

        if self.process_buffer() {
            moved = true;
        }

        if moved { StepResult::Moved } else { StepResult::Stall }
    }

    /// Drains as much of `in_buf` as can be interpreted right now: marker
    /// lines in line mode, or raw data up to the next marker in
    /// [`Phase::FileRecv`] mode.
    fn process_buffer(&mut self) -> bool {
        let mut moved = false;
        loop {
            if self.state.machine == Phase::FileRecv {
                match response::find_marker(&self.in_buf) {
                    Some(off) => {
                        if off > 0 {
                            self.data_ready.extend_from_slice(&self.in_buf[..off]);
                            self.in_buf.drain(..off);
                        }
                        let Some(nl) = memchr::memchr(b'\n', &self.in_buf) else { break };
                        let line = String::from_utf8_lossy(&self.in_buf[..nl]).trim_end_matches('\r').to_string();
                        self.in_buf.drain(..=nl);
                        moved = true;
                        if let Some(code) = response::parse_marker(&line) {
                            self.handle_reply(Reply { code, message: String::new() });
                        }
                    }
                    None => {
                        let hold = response::partial_marker_suffix_len(&self.in_buf);
                        let take = self.in_buf.len().saturating_sub(hold);
                        if take > 0 {
                            self.data_ready.extend(self.in_buf.drain(..take));
                            moved = true;
                        }
                        break;
                    }
                }
            } else {
                let Some(nl) = memchr::memchr(b'\n', &self.in_buf) else { break };
                let line = String::from_utf8_lossy(&self.in_buf[..nl]).trim_end_matches('\r').to_string();
                self.in_buf.drain(..=nl);
                moved = true;
                if let Some(reply) = self.accumulator.feed_line(&line) {
                    self.handle_reply(reply);
                }
            }
        }
        moved
    }

    fn handle_reply(&mut self, reply: Reply) {
        let Some(kind) = self.expectations.pop() else { return };
        match kind {
            ExpectKind::Greeting | ExpectKind::Version => self.maybe_finish_handshake(),
            ExpectKind::Pwd => {
                let text = reply.message.trim();
                if !text.is_empty() {
                    let path = Path::parse(text);
                    self.home.get_or_insert_with(|| path.clone());
                    self.cwd = path;
                }
                self.maybe_finish_handshake();
            }
            ExpectKind::Cwd => {
                if reply.message.trim().is_empty() {
                    if let Some(path) = self.pending_path.take() {
                        self.cwd = path;
                    }
                    self.state.mode = OpenMode::Closed;
                } else {
                    self.state.set_error(XferError::NoFile { path: self.pending_path.take().map(|p| p.to_string()).unwrap_or_default() });
                }
                self.state.machine = Phase::Idle;
            }
            ExpectKind::Dir | ExpectKind::Quote => {
                self.data_ready.extend_from_slice(reply.message.as_bytes());
                if !reply.message.is_empty() {
                    self.data_ready.push(b'\n');
                }
                self.body_done = true;
                self.state.machine = Phase::Idle;
            }
            ExpectKind::RetrInfo => match lsinfo::parse_size(&reply.message) {
                Some(size) => {
                    self.state.size = Some(size);
                    self.body_done = false;
                    self.data_ready.clear();
                    self.state.machine = Phase::FileRecv;
                }
                None => {
                    self.state.set_error(XferError::NoFile { path: self.pending_path.take().map(|p| p.to_string()).unwrap_or_default() });
                }
            },
            ExpectKind::Retr => {
                self.body_done = true;
                self.state.machine = Phase::Idle;
                self.state.mode = OpenMode::Closed;
            }
            ExpectKind::Info => {}
            ExpectKind::Default => {
                if reply.message.trim().is_empty() {
                    self.state.mode = OpenMode::Closed;
                } else {
                    self.state.set_error(XferError::NoFile { path: self.pending_path.take().map(|p| p.to_string()).unwrap_or_default() });
                }
                self.state.machine = Phase::Idle;
            }
            ExpectKind::StorPreliminary => {
                if reply.message.trim().is_empty() {
                    self.state.machine = Phase::FileSend;
                } else {
                    self.state.set_error(XferError::StoreFailed(reply.message));
                }
            }
            ExpectKind::Stor => {
                if reply.message.trim().is_empty() {
                    self.state.mode = OpenMode::Closed;
                } else {
                    self.state.set_error(XferError::StoreFailed(reply.message));
                }
                self.state.machine = Phase::Idle;
            }
            ExpectKind::Ignore => {}
        }
    }

    fn maybe_finish_handshake(&mut self) {
        if self.expectations.is_empty() && self.state.phase != ConnectionPhase::LoggedIn {
            self.state.phase = ConnectionPhase::LoggedIn;
            self.state.machine = Phase::Idle;
            self.state.retry.record_reconnect_success();
        }
    }

    fn start_open(&mut self, path: &Path, mode: OpenMode, pos: u64) {
        self.state.mode = mode;
        self.state.pos = pos as i64;
        // Neither `retrieve` nor `store` takes a restart offset over FISH;
        // whatever `pos` the caller asked for, the wire transfer always
        // actually starts at byte 0, so that's what the peer will confirm.
        self.state.real_pos = 0;
        self.pending_path = Some(path.clone());

        if !command::is_supported(mode) {
            self.state.set_error(XferError::NotSupp("operation not supported over FISH".into()));
            return;
        }

        match mode {
            OpenMode::Retrieve => self.send_command(command::retrieve(path)),
            OpenMode::Store => match self.state.size {
                Some(size) => {
                    self.store_remaining = size;
                    self.send_command(command::store(path, size));
                }
                None => self.state.set_error(XferError::Fatal("must know file size before upload".into())),
            },
            OpenMode::List => self.send_command(command::list(path, false)),
            OpenMode::LongList => self.send_command(command::list(path, true)),
            OpenMode::ChangeDir => self.send_command(command::chdir(path)),
            OpenMode::MakeDir => self.send_command(command::make_dir(path)),
            OpenMode::RemoveDir => self.send_command(command::remove_dir(path)),
            OpenMode::Remove => self.send_command(command::remove(path)),
            OpenMode::QuoteCmd => self.send_command(command::quote(&path.to_string())),
            OpenMode::ConnectVerify => self.state.mode = OpenMode::Closed,
            OpenMode::MpList => self.state.set_error(XferError::NotSupp("structured listing not supported over FISH".into())),
            OpenMode::Rename | OpenMode::ArrayInfo | OpenMode::ChangeMode | OpenMode::Closed => {}
        }
        if self.state.machine != Phase::FileRecv && self.state.machine != Phase::FileSend {
            self.state.machine = Phase::Waiting;
        }
        self.data_ready.clear();
        self.body_done = false;
    }
}

impl Task for FishEngine {
    fn step(&mut self) -> StepResult {
        if self.state.error.is_some() {
            return StepResult::Stall;
        }
        match self.state.phase {
            ConnectionPhase::Disconnected => {
                self.begin_connect();
                StepResult::Moved
            }
            _ => self.pump_io(),
        }
    }

    fn interest(&self) -> Interest {
        let Some(subprocess) = &self.subprocess else { return Interest::none() };
        Interest {
            read_fd: Some(subprocess.read_fd()),
            write_fd: if self.out_buf.is_empty() { None } else { Some(subprocess.write_fd()) },
            deadline: None,
        }
    }
}

impl Session for FishEngine {
    fn open(&mut self, path: &Path, mode: OpenMode, pos: u64) -> Outcome {
        if self.state.error.is_some() {
            return Outcome::Err(self.state.error.take().unwrap());
        }
        self.start_open(path, mode, pos);
        Outcome::InProgress
    }

    fn close(&mut self) -> Outcome {
        self.state.mode = OpenMode::Closed;
        Outcome::Ok
    }

    fn read(&mut self, max: usize) -> ReadOutcome {
        if !self.data_ready.is_empty() {
            let n = max.min(self.data_ready.len());
            let bytes: Vec<u8> = self.data_ready.drain(..n).collect();
            self.state.pos += bytes.len() as i64;
            self.state.real_pos += bytes.len() as i64;
            return ReadOutcome::Bytes(bytes);
        }
        if self.body_done {
            return ReadOutcome::Eof;
        }
        ReadOutcome::Again
    }

    fn write(&mut self, bytes: &[u8]) -> Result<usize, XferError> {
        if self.state.machine != Phase::FileSend || self.store_remaining == 0 {
            return Ok(0);
        }
        let n = bytes.len().min(self.store_remaining as usize);
        self.out_buf.extend_from_slice(&bytes[..n]);
        self.store_remaining -= n as u64;
        self.state.pos += n as i64;
        self.state.real_pos += n as i64;
        Ok(n)
    }

    fn store_status(&self) -> Outcome {
        self.done()
    }

    fn done(&self) -> Outcome {
        if let Some(error) = &self.state.error {
            return Outcome::Err(XferError::Fatal(error.to_string()));
        }
        match self.state.machine {
            Phase::Idle => Outcome::Ok,
            _ if self.state.mode == OpenMode::Closed => Outcome::Ok,
            _ => Outcome::InProgress,
        }
    }

    fn rename(&mut self, from: &Path, to: &Path) -> Outcome {
        self.pending_path = Some(from.clone());
        self.pending_rename_to = Some(to.clone());
        self.state.mode = OpenMode::Rename;
        self.send_command(command::rename(from, to));
        self.state.machine = Phase::Waiting;
        Outcome::InProgress
    }

    fn mkdir(&mut self, path: &Path, _all_parents: bool) -> Outcome {
        self.open(path, OpenMode::MakeDir, 0)
    }

    fn chdir(&mut self, path: &Path, _verify: bool) -> Outcome {
        self.open(path, OpenMode::ChangeDir, 0)
    }

    fn chmod(&mut self, path: &Path, mode: u32) -> Outcome {
        self.state.mode = OpenMode::ChangeMode;
        self.pending_path = Some(path.clone());
        self.send_command(command::chmod(path, mode));
        self.state.machine = Phase::Waiting;
        Outcome::InProgress
    }

    fn remove(&mut self, path: &Path) -> Outcome {
        self.open(path, OpenMode::Remove, 0)
    }

    fn remove_dir(&mut self, path: &Path) -> Outcome {
        self.open(path, OpenMode::RemoveDir, 0)
    }

    fn set_date(&mut self, date: SystemTime) {
        self.state.date = Some(date);
    }

    fn set_size(&mut self, size: u64) {
        self.state.size = Some(size);
    }

    fn want_size(&mut self) -> Option<u64> {
        self.state.size
    }

    fn want_date(&mut self) -> Option<SystemTime> {
        self.state.date
    }

    fn get_cwd(&self) -> &Path {
        &self.cwd
    }

    fn get_home(&self) -> Option<&Path> {
        self.home.as_ref()
    }

    fn ascii_transfer(&mut self, _enabled: bool) {}

    fn set_limit(&mut self, _end: Option<u64>) {}

    fn set_priority(&mut self, _priority: i32) {}

    fn is_connected(&self) -> bool {
        self.state.phase == ConnectionPhase::LoggedIn
    }

    fn seek(&mut self, target: SeekTarget) -> Outcome {
        match target {
            SeekTarget::Offset(pos) => {
                self.state.pos = pos as i64;
                Outcome::Ok
            }
            SeekTarget::End => Outcome::Ok,
        }
    }

    fn can_seek(&self, _to: u64) -> bool {
        false
    }


    fn get_seek_pos(&self) -> i64 {
        self.state.pos
    }

    fn get_real_pos(&self) -> i64 {
        self.state.real_pos
    }

    fn buffered(&self) -> usize {
        self.out_buf.len()
    }

    fn io_ready(&self) -> bool {
        matches!(self.state.machine, Phase::FileRecv | Phase::FileSend)
    }

    fn needs_size_date_beforehand(&self) -> bool {
        true
    }

    fn put_eof(&mut self) {
        self.store_remaining = 0;
    }

    fn error(&self) -> Option<&XferError> {
        self.state.error.as_ref()
    }

    fn remove_file(&mut self) -> Outcome {
        self.remove(&self.pending_path.clone().unwrap_or_else(|| self.cwd.clone()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use urlgrammar::Proto;

    fn identity() -> SessionIdentity {
        SessionIdentity {
            proto: Proto::Fish,
            host: "fish.example.com".into(),
            port: 22,
            user: Some("anon".into()),
            password: None,
            home: None,
        }
    }

    #[test]
    fn fresh_engine_starts_disconnected() {
        let engine = FishEngine::new(identity());
        assert!(!engine.is_connected());
    }

    #[test]
    fn pwd_reply_sets_home_and_finishes_handshake_when_queue_drains() {
        let mut engine = FishEngine::new(identity());
        engine.expectations.push(ExpectKind::Pwd);
        engine.handle_reply(Reply { code: 200, message: "/home/anon".to_string() });
        assert_eq!(engine.get_home(), Some(&Path::parse("/home/anon")));
        assert!(engine.is_connected());
    }

    #[test]
    fn retr_info_with_unparseable_message_fails_the_open() {
        let mut engine = FishEngine::new(identity());
        engine.state.phase = ConnectionPhase::LoggedIn;
        engine.pending_path = Some(Path::parse("/missing"));
        engine.expectations.push(ExpectKind::RetrInfo);
        engine.handle_reply(Reply { code: 100, message: "ls: /missing: No such file or directory".to_string() });
        assert!(engine.error().is_some());
    }

    #[test]
    fn retr_info_with_size_enters_file_recv_mode() {
        let mut engine = FishEngine::new(identity());
        engine.expectations.push(ExpectKind::RetrInfo);
        engine.handle_reply(Reply {
            code: 100,
            message: "-rw-r--r-- 1 a a 42 Jan  1 00:00 file".to_string(),
        });
        assert_eq!(engine.state.size, Some(42));
        assert_eq!(engine.state.machine, Phase::FileRecv);
    }

    #[test]
    fn store_without_a_known_size_fails_immediately() {
        let mut engine = FishEngine::new(identity());
        engine.open(&Path::parse("/out.bin"), OpenMode::Store, 0);
        assert!(engine.error().is_some());
    }
}
