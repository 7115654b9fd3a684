//! The two-peer copy dataflow: `FileCopy::Do()` ported onto [`scheduler::Task`].

use std::time::{Duration, Instant};

use scheduler::{Interest, StepResult, Task};
use session::{Outcome, ReadOutcome, SeekTarget, Session, XferError};
use xfer_path::Path;

use crate::options::CopyOptions;
use crate::speedometer::Speedometer;
use crate::state::CopyState;

/// Drives `get` (the read side) and `put` (the write side) until both are
/// done, reconciling seek positions, honoring a buffering cap, and feeding
/// two [`Speedometer`]s for display-rate and ETA reporting.
///
/// At most one copy may be in flight per peer; callers are expected to
/// construct a fresh `get`/`put` pair (or take them from the pool) per copy
/// rather than share a busy session across two pipelines.
pub struct CopyPipeline<G, P> {
    get: G,
    put: P,
    get_path: Path,
    put_path: Path,
    cont: bool,
    options: CopyOptions,

    state: CopyState,
    get_opened: bool,
    put_opened: bool,
    put_eof_pos: Option<i64>,
    line_buffer: Vec<u8>,

    bytes_count: u64,
    range_start: u64,
    range_limit: Option<u64>,
    known_size: Option<u64>,

    rate: Speedometer,
    rate_for_eta: Speedometer,
    start_time: Option<Instant>,
    end_time: Option<Instant>,

    error: Option<XferError>,
}

impl<G: Session, P: Session> CopyPipeline<G, P> {
    pub fn new(
        get: G,
        put: P,
        get_path: Path,
        put_path: Path,
        cont: bool,
        options: CopyOptions,
        rate_period: Duration,
        eta_period: Duration,
    ) -> Self {
        Self {
            get,
            put,
            get_path,
            put_path,
            cont,
            options,
            state: CopyState::Initial,
            get_opened: false,
            put_opened: false,
            put_eof_pos: None,
            line_buffer: Vec::new(),
            bytes_count: 0,
            range_start: 0,
            range_limit: None,
            known_size: None,
            rate: Speedometer::new(rate_period),
            rate_for_eta: Speedometer::new(eta_period),
            start_time: None,
            end_time: None,
            error: None,
        }
    }

    /// Restricts the copy to `[start, limit)` of the source; `limit = None`
    /// means "to EOF". Must be called before the first [`Task::step`].
    pub fn set_range(&mut self, start: u64, limit: Option<u64>) {
        self.range_start = start;
        self.range_limit = limit;
    }

    #[must_use]
    pub fn state(&self) -> CopyState {
        self.state
    }

    #[must_use]
    pub fn is_done(&self) -> bool {
        self.state == CopyState::AllDone
    }

    #[must_use]
    pub fn error(&self) -> Option<&XferError> {
        self.error.as_ref()
    }

    #[must_use]
    pub fn bytes_count(&self) -> u64 {
        self.bytes_count
    }

    /// `bytes_done / (size - range_start)`, clipped to `[0, 100]`; `None`
    /// while the source size is still unknown.
    #[must_use]
    pub fn percent_done(&self) -> Option<u8> {
        let size = self.known_size?;
        let total = size.saturating_sub(self.range_start);
        if total == 0 {
            return Some(100);
        }
        let pct = (self.bytes_count * 100 / total).min(100);
        Some(pct as u8)
    }

    #[must_use]
    pub fn rate(&self) -> f64 {
        self.rate.rate()
    }

    #[must_use]
    pub fn eta(&self) -> Option<Duration> {
        let size = self.known_size?;
        let total = size.saturating_sub(self.range_start);
        self.rate_for_eta.eta(total.saturating_sub(self.bytes_count))
    }

    /// Queries `get`'s size, caching it once known so read-only accessors
    /// like [`Self::percent_done`] and [`Self::eta`] don't need `&mut self`.
    fn want_size(&mut self) -> Option<u64> {
        let size = self.get.want_size();
        if size.is_some() {
            self.known_size = size;
        }
        size
    }

    fn fail(&mut self, error: XferError) -> StepResult {
        self.error = Some(error);
        self.end_time = Some(Instant::now());
        StepResult::WantDie
    }

    /// `XferError` carries a raw `std::io::Error` in one variant, so it
    /// can't derive `Clone`; lifting a peer's error onto the copy only
    /// needs its message, not its retry classification (the session that
    /// owns it already decided retrying wasn't possible before latching
    /// it), so it's re-wrapped as `Fatal` here.
    fn reconcile_peer_error(&mut self) -> Option<StepResult> {
        if let Some(error) = self.get.error() {
            let message = error.to_string();
            return Some(self.fail(XferError::Fatal(message)));
        }
        if let Some(error) = self.put.error() {
            let message = error.to_string();
            if !self.options.fail_if_broken {
                // Already acted on this once; don't re-enter every time
                // `step_confirm_wait` re-checks for a fresh peer error.
                if self.state != CopyState::DoCopy {
                    return None;
                }
                self.put_eof_pos = Some(self.put.get_real_pos());
                self.state = CopyState::ConfirmWait;
                return Some(StepResult::Moved);
            }
            return Some(self.fail(XferError::Fatal(message)));
        }
        None
    }

    fn open_get_if_needed(&mut self) {
        if !self.get_opened {
            self.get.open(&self.get_path, session::OpenMode::Retrieve, self.range_start);
            self.get_opened = true;
            self.start_time.get_or_insert_with(Instant::now);
        }
    }

    fn open_put_if_needed(&mut self, pos: u64) {
        if !self.put_opened {
            self.put.open(&self.put_path, session::OpenMode::Store, pos);
            self.put_opened = true;
        }
    }

    fn configure_range_and_enter_copy(&mut self) {
        self.open_put_if_needed(self.range_start);
        self.get.set_limit(self.range_limit);
        self.put.set_limit(self.range_limit);
        self.state = CopyState::DoCopy;
    }

    fn step_initial(&mut self) -> StepResult {
        self.open_get_if_needed();

        let wants_resume = self.cont && self.put.can_seek(self.range_start);
        if self.put.needs_size_date_beforehand() || wants_resume {
            self.want_size();
            self.get.want_date();
            self.state = CopyState::GetInfoWait;
            return StepResult::Moved;
        }

        if wants_resume {
            self.open_put_if_needed(self.range_start);
            if let Outcome::Err(e) = self.put.seek(SeekTarget::End) {
                return self.fail(e);
            }
            self.state = CopyState::PutWait;
        } else {
            self.configure_range_and_enter_copy();
        }
        StepResult::Moved
    }

    fn step_get_info_wait(&mut self) -> StepResult {
        let Some(size) = self.want_size() else {
            return StepResult::Stall;
        };
        let date = self.get.want_date();

        self.open_put_if_needed(self.range_start);
        self.put.set_size(size);
        if let Some(date) = date {
            self.put.set_date(date);
        }

        if self.cont && self.put.can_seek(self.range_start) {
            if let Outcome::Err(e) = self.put.seek(SeekTarget::End) {
                return self.fail(e);
            }
            self.state = CopyState::PutWait;
        } else {
            self.configure_range_and_enter_copy();
        }
        StepResult::Moved
    }

    fn step_put_wait(&mut self) -> StepResult {
        if let Some(result) = self.reconcile_peer_error() {
            return result;
        }
        let put_pos = self.put.get_seek_pos();
        if let Some(size) = self.want_size() {
            if put_pos >= 0 && put_pos as u64 >= size {
                self.state = CopyState::GetDoneWait;
                return StepResult::Moved;
            }
        }
        if !self.put.io_ready() {
            return StepResult::Stall;
        }
        let real_pos = self.put.get_real_pos();
        if real_pos >= 0 {
            if let Outcome::Err(e) = self.get.seek(SeekTarget::Offset(real_pos as u64)) {
                return self.fail(e);
            }
        }
        self.get.set_limit(self.range_limit);
        self.put.set_limit(self.range_limit);
        self.state = CopyState::DoCopy;
        StepResult::Moved
    }

    /// Reconciles `get`'s and `put`'s real positions (accounting for
    /// whatever is still held in the line buffer). Issues a seek on `get`
    /// when one resolves the gap outright; otherwise returns the number of
    /// bytes the next read should discard rather than forward to `put` (0
    /// when the two are already aligned). Returns `Err` if reconciliation
    /// is impossible and `fail_if_cannot_seek` is set.
    fn compute_forward_discard(&mut self) -> Result<u64, XferError> {
        let gp = self.get.get_real_pos() - self.line_buffer.len() as i64;
        let pp = self.put.get_real_pos();
        if gp < 0 || pp < 0 || gp == pp {
            return Ok(0);
        }

        if pp < gp {
            if self.get.can_seek(pp as u64) {
                self.get.seek(SeekTarget::Offset(pp as u64));
            } else if self.options.fail_if_cannot_seek {
                return Err(XferError::Fatal("seek failed: source cannot rewind to destination's position".into()));
            }
            return Ok(0);
        }

        // pp > gp: destination is ahead of the source; either skip forward
        // on the source cheaply by discarding, or seek past the gap.
        if let Some(size) = self.want_size() {
            if pp as u64 >= size {
                return Ok(0); // effectively EOF already; DO_COPY's read will confirm.
            }
        }
        let skip_needed = (pp - gp) as u64;
        if !self.put.can_seek(gp as u64) || skip_needed < self.options.skip_threshold {
            return Ok(skip_needed);
        }
        self.put.seek(SeekTarget::Offset(gp as u64));
        Ok(0)
    }

    fn flush_line_buffer(&mut self) -> Result<(), XferError> {
        if self.line_buffer.is_empty() {
            return Ok(());
        }
        let bytes = std::mem::take(&mut self.line_buffer);
        self.put.write(&bytes)?;
        Ok(())
    }

    fn emit(&mut self, chunk: &[u8]) -> Result<(), XferError> {
        self.bytes_count += chunk.len() as u64;
        self.rate.add(chunk.len() as u64);
        self.rate_for_eta.add(chunk.len() as u64);

        let Some(max_line) = self.options.line_buffered else {
            self.put.write(chunk)?;
            return Ok(());
        };

        self.line_buffer.extend_from_slice(chunk);
        loop {
            let Some(newline_at) = self.line_buffer.iter().position(|b| *b == b'\n') else {
                break;
            };
            let line: Vec<u8> = self.line_buffer.drain(..=newline_at).collect();
            self.put.write(&line)?;
        }
        if self.line_buffer.len() > max_line {
            self.flush_line_buffer()?;
        }
        Ok(())
    }

    fn step_do_copy(&mut self) -> StepResult {
        if let Some(result) = self.reconcile_peer_error() {
            return result;
        }
        let discard = match self.compute_forward_discard() {
            Ok(n) => n,
            Err(e) => return self.fail(e),
        };

        if discard == 0 && self.put.buffered() > self.options.max_buf {
            return StepResult::Stall;
        }

        let read_max = if discard > 0 {
            discard.min(0x1_0000) as usize
        } else {
            (self.options.max_buf - self.put.buffered()).min(0x1_0000).max(1)
        };

        match self.get.read(read_max) {
            ReadOutcome::Bytes(mut chunk) => {
                if discard > 0 {
                    // Consumed to close the forward gap; never forwarded to `put`.
                    return StepResult::Moved;
                }
                if let Some(limit) = self.range_limit {
                    let remaining_in_range = limit.saturating_sub(self.get.get_real_pos().max(0) as u64 - self.range_start);
                    if (chunk.len() as u64) > remaining_in_range {
                        chunk.truncate(remaining_in_range as usize);
                    }
                }
                if let Err(e) = self.emit(&chunk) {
                    return self.fail(e);
                }
                StepResult::Moved
            }
            ReadOutcome::Eof => {
                if let Err(e) = self.flush_line_buffer() {
                    return self.fail(e);
                }
                if let Some(date) = self.get.want_date() {
                    self.put.set_date(date);
                }
                self.put_eof_pos = Some(self.put.get_real_pos());
                self.put.put_eof();
                self.state = CopyState::ConfirmWait;
                StepResult::Moved
            }
            ReadOutcome::Again => StepResult::Stall,
            ReadOutcome::Err(e) => self.fail(e),
        }
    }

    fn step_confirm_wait(&mut self) -> StepResult {
        if let Some(result) = self.reconcile_peer_error() {
            return result;
        }
        match self.put.done() {
            Outcome::Ok => {
                self.state = CopyState::GetDoneWait;
                StepResult::Moved
            }
            Outcome::InProgress => {
                // The destination may have reconnected and rewound; if its
                // real position no longer matches where we left off, go
                // back and keep copying from there.
                if let Some(eof_pos) = self.put_eof_pos {
                    if self.put.get_real_pos() != eof_pos {
                        self.state = CopyState::DoCopy;
                        return StepResult::Moved;
                    }
                }
                StepResult::Stall
            }
            Outcome::Err(e) => self.fail(e),
        }
    }

    fn step_get_done_wait(&mut self) -> StepResult {
        if self.options.remove_source_later {
            self.options.remove_source_later = false;
            if let Outcome::Err(e) = self.get.remove_file() {
                return self.fail(e);
            }
        }
        match self.get.done() {
            Outcome::Ok => {
                self.end_time = Some(Instant::now());
                self.state = CopyState::AllDone;
                StepResult::WantDie
            }
            Outcome::InProgress => StepResult::Stall,
            Outcome::Err(e) => self.fail(e),
        }
    }
}

impl<G: Session + Task, P: Session + Task> Task for CopyPipeline<G, P> {
    fn step(&mut self) -> StepResult {
        if self.error.is_some() {
            return StepResult::WantDie;
        }

        // Each peer owns its own connection-lifecycle state machine (dialing,
        // login, wire I/O); stepping it here is what actually moves bytes
        // between the socket and the buffers the `Session` methods above
        // read and write. `FileCopy::Do()` does the same to its two
        // `FileCopyPeer`s before touching its own state.
        let get_moved = matches!(self.get.step(), StepResult::Moved);
        let put_moved = matches!(self.put.step(), StepResult::Moved);

        let result = match self.state {
            CopyState::Initial => self.step_initial(),
            CopyState::GetInfoWait => self.step_get_info_wait(),
            CopyState::PutWait => self.step_put_wait(),
            CopyState::DoCopy => self.step_do_copy(),
            CopyState::ConfirmWait => self.step_confirm_wait(),
            CopyState::GetDoneWait => self.step_get_done_wait(),
            CopyState::AllDone => StepResult::WantDie,
        };

        if (get_moved || put_moved) && matches!(result, StepResult::Stall) {
            StepResult::Moved
        } else {
            result
        }
    }

    fn interest(&self) -> Interest {
        // `get` is typically waiting to read, `put` to write; merge the two
        // peers' wait conditions into the single fd-pair `Interest` exposes
        // (a peer rarely wants the opposite direction of its usual role).
        let g = self.get.interest();
        let p = self.put.interest();
        Interest {
            read_fd: g.read_fd.or(p.read_fd),
            write_fd: p.write_fd.or(g.write_fd),
            deadline: match (g.deadline, p.deadline) {
                (Some(a), Some(b)) => Some(a.min(b)),
                (a, b) => a.or(b),
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use session::{ConnectionPhase, OpenMode, SessionState};
    use std::time::SystemTime;

    /// A purely in-memory peer standing in for a protocol engine: `source`
    /// is what `read` drains from, `sink` is what `write` appends to.
    struct MemoryPeer {
        state: SessionState<()>,
        source: Vec<u8>,
        sink: Vec<u8>,
        can_seek: bool,
        eof_seen: bool,
        done: bool,
        needs_size_date_beforehand: bool,
    }

    impl MemoryPeer {
        fn source(bytes: &[u8]) -> Self {
            Self {
                state: SessionState::new(()),
                source: bytes.to_vec(),
                sink: Vec::new(),
                can_seek: true,
                eof_seen: false,
                done: false,
                needs_size_date_beforehand: false,
            }
        }

        fn sink() -> Self {
            let mut peer = Self::source(&[]);
            peer.done = true;
            peer
        }
    }

    impl Task for MemoryPeer {
        fn step(&mut self) -> StepResult {
            // Nothing in memory to pump; all state changes happen directly
            // through the `Session` methods the pipeline calls.
            StepResult::Stall
        }
    }

    impl Session for MemoryPeer {
        fn open(&mut self, _path: &Path, mode: OpenMode, pos: u64) -> Outcome {
            self.state.mode = mode;
            self.state.phase = ConnectionPhase::LoggedIn;
            self.state.pos = pos as i64;
            self.state.real_pos = pos as i64;
            if mode == OpenMode::Store {
                self.done = false;
            }
            Outcome::Ok
        }
        fn close(&mut self) -> Outcome {
            Outcome::Ok
        }
        fn read(&mut self, max: usize) -> ReadOutcome {
            let pos = self.state.real_pos.max(0) as usize;
            if pos >= self.source.len() {
                self.eof_seen = true;
                self.done = true;
                return ReadOutcome::Eof;
            }
            let end = (pos + max).min(self.source.len());
            let chunk = self.source[pos..end].to_vec();
            self.state.real_pos = end as i64;
            ReadOutcome::Bytes(chunk)
        }
        fn write(&mut self, bytes: &[u8]) -> Result<usize, XferError> {
            self.sink.extend_from_slice(bytes);
            self.state.real_pos += bytes.len() as i64;
            Ok(bytes.len())
        }
        fn store_status(&self) -> Outcome {
            Outcome::Ok
        }
        fn done(&self) -> Outcome {
            if self.done {
                Outcome::Ok
            } else {
                Outcome::InProgress
            }
        }
        fn rename(&mut self, _from: &Path, _to: &Path) -> Outcome {
            Outcome::Ok
        }
        fn mkdir(&mut self, _path: &Path, _all_parents: bool) -> Outcome {
            Outcome::Ok
        }
        fn chdir(&mut self, _path: &Path, _verify: bool) -> Outcome {
            Outcome::Ok
        }
        fn chmod(&mut self, _path: &Path, _mode: u32) -> Outcome {
            Outcome::Ok
        }
        fn remove(&mut self, _path: &Path) -> Outcome {
            Outcome::Ok
        }
        fn remove_dir(&mut self, _path: &Path) -> Outcome {
            Outcome::Ok
        }
        fn set_date(&mut self, date: SystemTime) {
            self.state.date = Some(date);
        }
        fn set_size(&mut self, size: u64) {
            self.state.size = Some(size);
        }
        fn want_size(&mut self) -> Option<u64> {
            Some(self.state.size.unwrap_or(self.source.len() as u64))
        }
        fn want_date(&mut self) -> Option<SystemTime> {
            self.state.date
        }
        fn get_cwd(&self) -> &Path {
            unimplemented!("not exercised by these tests")
        }
        fn get_home(&self) -> Option<&Path> {
            None
        }
        fn ascii_transfer(&mut self, _enabled: bool) {}
        fn set_limit(&mut self, _end: Option<u64>) {}
        fn set_priority(&mut self, _priority: i32) {}
        fn is_connected(&self) -> bool {
            self.state.phase == ConnectionPhase::LoggedIn
        }
        fn seek(&mut self, target: SeekTarget) -> Outcome {
            match target {
                SeekTarget::Offset(n) => self.state.real_pos = n as i64,
                SeekTarget::End => self.state.real_pos = self.sink.len() as i64,
            }
            Outcome::Ok
        }
        fn can_seek(&self, _to: u64) -> bool {
            self.can_seek
        }
        fn get_seek_pos(&self) -> i64 {
            self.state.real_pos
        }
        fn get_real_pos(&self) -> i64 {
            self.state.real_pos
        }
        fn buffered(&self) -> usize {
            0
        }
        fn io_ready(&self) -> bool {
            true
        }
        fn needs_size_date_beforehand(&self) -> bool {
            self.needs_size_date_beforehand
        }
        fn put_eof(&mut self) {
            self.eof_seen = true;
            self.done = true;
        }
        fn error(&self) -> Option<&XferError> {
            self.state.error.as_ref()
        }
        fn remove_file(&mut self) -> Outcome {
            Outcome::Ok
        }
    }

    fn drive(pipeline: &mut CopyPipeline<MemoryPeer, MemoryPeer>, max_steps: usize) {
        for _ in 0..max_steps {
            if pipeline.is_done() || pipeline.error().is_some() {
                return;
            }
            pipeline.step();
        }
    }

    fn pipeline(get: MemoryPeer, put: MemoryPeer) -> CopyPipeline<MemoryPeer, MemoryPeer> {
        CopyPipeline::new(
            get,
            put,
            Path::parse("/src.bin"),
            Path::parse("/dst.bin"),
            false,
            CopyOptions::new(),
            Duration::from_secs(1),
            Duration::from_secs(1),
        )
    }

    #[test]
    fn a_plain_copy_reaches_all_done_with_every_byte_written() {
        let data = b"the quick brown fox jumps over the lazy dog".to_vec();
        let get = MemoryPeer::source(&data);
        let put = MemoryPeer::sink();
        let mut pipeline = pipeline(get, put);

        drive(&mut pipeline, 200);

        assert!(pipeline.is_done(), "state = {:?}", pipeline.state());
        assert_eq!(pipeline.bytes_count(), data.len() as u64);
        assert_eq!(pipeline.put.sink, data);
    }

    #[test]
    fn an_error_on_get_surfaces_as_the_copy_error() {
        let mut get = MemoryPeer::source(b"abc");
        get.state.error = Some(XferError::Fatal("disk gone".into()));
        let put = MemoryPeer::sink();
        let mut pipeline = pipeline(get, put);

        drive(&mut pipeline, 20);

        assert!(pipeline.error().is_some());
        assert!(!pipeline.is_done());
    }

    #[test]
    fn a_broken_destination_without_fail_if_broken_ends_as_if_eof() {
        let get = MemoryPeer::source(b"abcdef");
        let mut put = MemoryPeer::sink();
        put.state.error = Some(XferError::SeeErrno {
            context: "write".into(),
            source: std::io::Error::from(std::io::ErrorKind::BrokenPipe),
        });
        let options = CopyOptions::new().fail_if_broken(false);
        let mut pipeline = CopyPipeline::new(
            get,
            put,
            Path::parse("/src.bin"),
            Path::parse("/dst.bin"),
            false,
            options,
            Duration::from_secs(1),
            Duration::from_secs(1),
        );

        drive(&mut pipeline, 20);

        assert!(pipeline.error().is_none());
        assert_eq!(pipeline.state(), CopyState::ConfirmWait);
    }

    #[test]
    fn line_buffered_mode_only_emits_complete_lines() {
        let get = MemoryPeer::source(b"one\ntwo\nthree");
        let put = MemoryPeer::sink();
        let options = CopyOptions::new().line_buffered(0x1000);
        let mut pipeline = CopyPipeline::new(
            get,
            put,
            Path::parse("/src.bin"),
            Path::parse("/dst.bin"),
            false,
            options,
            Duration::from_secs(1),
            Duration::from_secs(1),
        );

        drive(&mut pipeline, 200);

        assert!(pipeline.is_done());
        assert_eq!(pipeline.put.sink, b"one\ntwo\nthree");
    }
}
