//! Open-mode enum and the generic session-state record every protocol
//! engine specializes with its own state-machine enum.

use std::time::SystemTime;

use crate::error::XferError;
use crate::retry::RetryBudget;

/// The operation a session is currently open for.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Hash)]
pub enum OpenMode {
    Closed,
    Retrieve,
    Store,
    LongList,
    List,
    MpList,
    ChangeDir,
    MakeDir,
    RemoveDir,
    Remove,
    QuoteCmd,
    Rename,
    ArrayInfo,
    ConnectVerify,
    ChangeMode,
}

impl Default for OpenMode {
    fn default() -> Self {
        OpenMode::Closed
    }
}

/// Connection lifecycle, independent of the protocol-specific wire state
/// machine layered on top (e.g. the FTP engine's `INITIAL..EOF` states).
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum ConnectionPhase {
    Disconnected,
    Resolving,
    Connecting,
    Connected,
    LoggedIn,
}

/// Everything about a session that isn't protocol-specific wire state: the
/// connection phase, stream cursors, known size/date, and the last error.
/// `M` is the protocol engine's own state-machine enum (the FTP engine's
/// control-channel states, SFTP's request map, etc).
#[derive(Clone, Debug)]
pub struct SessionState<M> {
    pub phase: ConnectionPhase,
    pub machine: M,
    pub mode: OpenMode,
    /// Logical stream position the caller has been told about.
    pub pos: i64,
    /// Position acknowledged by the peer; `-1` when unknown.
    pub real_pos: i64,
    pub size: Option<u64>,
    pub date: Option<SystemTime>,
    pub error: Option<XferError>,
    pub retry: RetryBudget,
}

impl<M> SessionState<M> {
    pub fn new(machine: M) -> Self {
        Self {
            phase: ConnectionPhase::Disconnected,
            machine,
            mode: OpenMode::Closed,
            pos: 0,
            real_pos: -1,
            size: None,
            date: None,
            error: None,
            retry: RetryBudget::new(),
        }
    }

    /// A session is reusable iff logged in, with no pending operation and
    /// no latched error.
    #[must_use]
    pub fn is_reusable(&self) -> bool {
        self.phase == ConnectionPhase::LoggedIn && self.mode == OpenMode::Closed && self.error.is_none()
    }

    pub fn set_error(&mut self, error: XferError) {
        self.error = Some(error);
    }

    pub fn clear_error(&mut self) {
        self.error = None;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Clone, Debug, PartialEq)]
    enum DummyMachine {
        Idle,
    }

    #[test]
    fn fresh_state_is_closed_and_disconnected() {
        let state = SessionState::new(DummyMachine::Idle);
        assert_eq!(state.mode, OpenMode::Closed);
        assert_eq!(state.phase, ConnectionPhase::Disconnected);
        assert!(!state.is_reusable());
    }

    #[test]
    fn logged_in_with_no_error_and_closed_mode_is_reusable() {
        let mut state = SessionState::new(DummyMachine::Idle);
        state.phase = ConnectionPhase::LoggedIn;
        assert!(state.is_reusable());
    }

    #[test]
    fn latched_error_makes_session_unreusable() {
        let mut state = SessionState::new(DummyMachine::Idle);
        state.phase = ConnectionPhase::LoggedIn;
        state.set_error(XferError::Fatal("boom".into()));
        assert!(!state.is_reusable());
        state.clear_error();
        assert!(state.is_reusable());
    }
}
