//! Shared test helpers for the workspace's protocol-engine test suites.
//!
//! Real sockets are slow and flaky in CI, so every engine is exercised
//! against an in-memory duplex pipe plus a [`FakeClock`] instead of the
//! network and `std::time::Instant`. A [`ScriptedServer`] drives canned
//! reply scripts for the line-oriented protocols (FTP control channel, FISH)
//! so state-machine tests read like the conversation they assert on.

use std::collections::VecDeque;
use std::io::{self, Read, Write};
use std::time::Duration;

/// A clock whose `now()` the test advances explicitly, used anywhere the
/// production code measures elapsed time (backoff timers, rate limiters,
/// session timeouts).
#[derive(Debug, Default)]
pub struct FakeClock {
    elapsed: Duration,
}

impl FakeClock {
    /// Creates a clock starting at zero elapsed time.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Advances the clock by `dt`.
    pub fn advance(&mut self, dt: Duration) {
        self.elapsed += dt;
    }

    /// Returns the total elapsed time since construction.
    #[must_use]
    pub fn now(&self) -> Duration {
        self.elapsed
    }
}

/// A bidirectional in-memory byte pipe standing in for a TCP socket.
///
/// `client` and `server` are each other's read/write ends; writing to one
/// side immediately becomes readable from the other, with no blocking —
/// this is enough to drive the non-blocking state machines under test,
/// which treat a short read as "would block" rather than EOF.
pub struct LoopbackPipe {
    inbox: VecDeque<u8>,
    outbox: VecDeque<u8>,
}

/// One endpoint of a [`LoopbackPipe`] pair.
pub struct LoopbackEnd<'a> {
    read_from: &'a mut VecDeque<u8>,
    write_to: &'a mut VecDeque<u8>,
}

impl LoopbackPipe {
    /// Creates a fresh, empty pipe.
    #[must_use]
    pub fn new() -> Self {
        Self {
            inbox: VecDeque::new(),
            outbox: VecDeque::new(),
        }
    }

    /// Returns the (client, server) endpoints. The client reads `outbox`
    /// (written by the server) and writes `inbox` (read by the server).
    pub fn split(&mut self) -> (LoopbackEnd<'_>, LoopbackEnd<'_>) {
        // Safety of the split: each endpoint only ever touches the queue it
        // owns; `inbox`/`outbox` live in `self` so both borrows are disjoint
        // fields, which the borrow checker accepts via two separate `&mut`.
        let inbox: *mut VecDeque<u8> = &mut self.inbox;
        let outbox: *mut VecDeque<u8> = &mut self.outbox;
        // SAFETY: `inbox` and `outbox` are distinct fields of `self`, so the
        // two mutable references below never alias.
        unsafe {
            let client = LoopbackEnd {
                read_from: &mut *outbox,
                write_to: &mut *inbox,
            };
            let server = LoopbackEnd {
                read_from: &mut *inbox,
                write_to: &mut *outbox,
            };
            (client, server)
        }
    }
}

impl Default for LoopbackPipe {
    fn default() -> Self {
        Self::new()
    }
}

impl Read for LoopbackEnd<'_> {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        if self.read_from.is_empty() {
            return Err(io::Error::from(io::ErrorKind::WouldBlock));
        }
        let n = buf.len().min(self.read_from.len());
        for slot in buf.iter_mut().take(n) {
            *slot = self.read_from.pop_front().expect("checked non-empty");
        }
        Ok(n)
    }
}

impl Write for LoopbackEnd<'_> {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.write_to.extend(buf.iter().copied());
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

/// A scripted line-oriented server for FTP/FISH control-channel tests:
/// feeds canned reply lines in order, recording every line the engine
/// under test sent so assertions can check command framing.
#[derive(Default)]
pub struct ScriptedServer {
    replies: VecDeque<String>,
    sent: Vec<String>,
}

impl ScriptedServer {
    /// Creates a server that will reply with `lines`, in order, one per
    /// call to [`Self::next_reply`].
    #[must_use]
    pub fn new(lines: impl IntoIterator<Item = impl Into<String>>) -> Self {
        Self {
            replies: lines.into_iter().map(Into::into).collect(),
            sent: Vec::new(),
        }
    }

    /// Records a command the engine under test sent.
    pub fn record_sent(&mut self, line: impl Into<String>) {
        self.sent.push(line.into());
    }

    /// Pops the next scripted reply, if any remain.
    pub fn next_reply(&mut self) -> Option<String> {
        self.replies.pop_front()
    }

    /// Returns every command recorded via [`Self::record_sent`] so far.
    #[must_use]
    pub fn sent_commands(&self) -> &[String] {
        &self.sent
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn loopback_pipe_roundtrips_bytes() {
        let mut pipe = LoopbackPipe::new();
        let (mut client, mut server) = pipe.split();
        client.write_all(b"USER anonymous\r\n").unwrap();
        let mut buf = [0u8; 32];
        let n = server.read(&mut buf).unwrap();
        assert_eq!(&buf[..n], b"USER anonymous\r\n");
    }

    #[test]
    fn loopback_read_would_block_when_empty() {
        let mut pipe = LoopbackPipe::new();
        let (mut client, _server) = pipe.split();
        let mut buf = [0u8; 8];
        let err = client.read(&mut buf).unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::WouldBlock);
    }

    #[test]
    fn fake_clock_advances() {
        let mut clock = FakeClock::new();
        clock.advance(Duration::from_secs(2));
        clock.advance(Duration::from_millis(500));
        assert_eq!(clock.now(), Duration::from_millis(2500));
    }

    #[test]
    fn scripted_server_yields_lines_in_order() {
        let mut server = ScriptedServer::new(["220 ready", "230 logged in"]);
        assert_eq!(server.next_reply().as_deref(), Some("220 ready"));
        assert_eq!(server.next_reply().as_deref(), Some("230 logged in"));
        assert_eq!(server.next_reply(), None);
    }
}
