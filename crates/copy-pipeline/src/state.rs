//! The copy's own state machine, layered above whatever connection-lifecycle
//! state each peer's [`session::Session`] impl tracks internally.

/// `FileCopy`'s `state_t`, unchanged in shape: the copy moves forward only,
/// never skipping a step even when a step is a no-op for a given peer pair.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum CopyState {
    /// Nothing has happened yet; decides which branch to take next.
    Initial,
    /// Waiting on `get.want_size()`/`get.want_date()` to resolve before the
    /// destination can be told what it's receiving.
    GetInfoWait,
    /// Waiting for `put` to report where it can actually resume.
    PutWait,
    /// The steady-state read/write loop.
    DoCopy,
    /// `put` has seen EOF; waiting for it to confirm the write landed.
    ConfirmWait,
    /// Waiting for `get` to finish closing (and, if asked, deleting itself).
    GetDoneWait,
    /// Terminal: both peers are done.
    AllDone,
}

impl Default for CopyState {
    fn default() -> Self {
        CopyState::Initial
    }
}
