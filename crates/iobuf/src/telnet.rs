//! IAC escaping for FTP control connections that tunnel over a telnet-clean
//! byte stream (RFC 2640): every literal `0xFF` is doubled on the wire, and
//! un-doubled on the way back in.

use std::io;

use crate::transport::Transport;

const IAC: u8 = 0xFF;
const WILL: u8 = 251;
const WONT: u8 = 252;
const DO: u8 = 253;
const DONT: u8 = 254;

/// Where a `read` call left off inside an in-progress IAC sequence.
#[derive(Clone, Copy, PartialEq, Eq)]
enum PendingIac {
    /// No IAC sequence in progress.
    None,
    /// Saw `IAC`; the next byte decides whether this is a literal `0xFF`,
    /// a 3-byte WILL/WONT/DO/DONT negotiation, or some other 2-byte command.
    Iac,
    /// Saw `IAC` followed by WILL/WONT/DO/DONT; one option byte remains to
    /// be skipped before data resumes.
    Verb,
}

/// Wraps an inner [`Transport`], escaping outgoing `0xFF` bytes and
/// unescaping incoming ones. State survives partial writes/reads so an
/// `IAC` split across two `read` calls is still unescaped correctly.
pub struct TelnetLayer<T> {
    inner: T,
    pending: PendingIac,
}

impl<T: Transport> TelnetLayer<T> {
    #[must_use]
    pub fn new(inner: T) -> Self {
        Self {
            inner,
            pending: PendingIac::None,
        }
    }

    pub fn into_inner(self) -> T {
        self.inner
    }
}

impl<T: Transport> Transport for TelnetLayer<T> {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        let mut raw = vec![0u8; buf.len()];
        let n = self.inner.read(&mut raw)?;
        let mut out = 0;
        for &byte in &raw[..n] {
            match self.pending {
                PendingIac::Verb => {
                    // Option byte of a WILL/WONT/DO/DONT; never data.
                    self.pending = PendingIac::None;
                }
                PendingIac::Iac => {
                    self.pending = PendingIac::None;
                    if byte == IAC {
                        buf[out] = IAC;
                        out += 1;
                    } else if matches!(byte, WILL | WONT | DO | DONT) {
                        self.pending = PendingIac::Verb;
                    }
                    // Any other 2-byte command is dropped rather than
                    // mis-parsed as data; this control channel never
                    // negotiates.
                }
                PendingIac::None => {
                    if byte == IAC {
                        self.pending = PendingIac::Iac;
                    } else {
                        buf[out] = byte;
                        out += 1;
                    }
                }
            }
        }
        Ok(out)
    }

    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        if !buf.contains(&IAC) {
            return self.inner.write(buf);
        }
        let mut escaped = Vec::with_capacity(buf.len() + 4);
        for &byte in buf {
            escaped.push(byte);
            if byte == IAC {
                escaped.push(IAC);
            }
        }
        let written = self.inner.write(&escaped)?;
        // Report progress in terms of the caller's un-escaped buffer so a
        // short write never leaves us re-escaping an already-sent IAC.
        let mut consumed = 0;
        let mut emitted = 0;
        for &byte in buf {
            let size = if byte == IAC { 2 } else { 1 };
            if emitted + size > written {
                break;
            }
            emitted += size;
            consumed += 1;
        }
        Ok(consumed)
    }

    fn raw_fd(&self) -> Option<i32> {
        self.inner.raw_fd()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::VecDeque;

    struct MemoryTransport {
        inbox: VecDeque<u8>,
        outbox: Vec<u8>,
    }

    impl Transport for MemoryTransport {
        fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
            let mut n = 0;
            while n < buf.len() {
                match self.inbox.pop_front() {
                    Some(b) => {
                        buf[n] = b;
                        n += 1;
                    }
                    None => break,
                }
            }
            Ok(n)
        }

        fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
            self.outbox.extend_from_slice(buf);
            Ok(buf.len())
        }
    }

    #[test]
    fn write_doubles_iac_bytes() {
        let mut layer = TelnetLayer::new(MemoryTransport {
            inbox: VecDeque::new(),
            outbox: Vec::new(),
        });
        let n = layer.write(&[b'A', 0xFF, b'B']).unwrap();
        assert_eq!(n, 3);
        assert_eq!(layer.into_inner().outbox, vec![b'A', 0xFF, 0xFF, b'B']);
    }

    #[test]
    fn read_undoubles_iac_bytes() {
        let mut layer = TelnetLayer::new(MemoryTransport {
            inbox: vec![b'A', 0xFF, 0xFF, b'B'].into(),
            outbox: Vec::new(),
        });
        let mut buf = [0u8; 8];
        let n = layer.read(&mut buf).unwrap();
        assert_eq!(&buf[..n], b"A\xFFB");
    }

    #[test]
    fn read_handles_iac_split_across_calls() {
        let mut layer = TelnetLayer::new(MemoryTransport {
            inbox: vec![b'A', 0xFF].into(),
            outbox: Vec::new(),
        });
        let mut buf = [0u8; 8];
        let n = layer.read(&mut buf).unwrap();
        assert_eq!(&buf[..n], b"A");
        assert!(layer.pending == PendingIac::Iac);

        layer.inner.inbox.push_back(0xFF);
        layer.inner.inbox.push_back(b'B');
        let n = layer.read(&mut buf).unwrap();
        assert_eq!(&buf[..n], b"\xFFB");
    }

    #[test]
    fn read_skips_3byte_will_wont_do_dont_commands() {
        for verb in [WILL, WONT, DO, DONT] {
            let mut layer = TelnetLayer::new(MemoryTransport {
                inbox: vec![b'A', IAC, verb, 0x01, b'B'].into(),
                outbox: Vec::new(),
            });
            let mut buf = [0u8; 8];
            let n = layer.read(&mut buf).unwrap();
            assert_eq!(&buf[..n], b"AB", "verb {verb} leaked its option byte");
        }
    }

    #[test]
    fn read_skips_3byte_command_split_across_calls() {
        let mut layer = TelnetLayer::new(MemoryTransport {
            inbox: vec![b'A', IAC, WILL].into(),
            outbox: Vec::new(),
        });
        let mut buf = [0u8; 8];
        let n = layer.read(&mut buf).unwrap();
        assert_eq!(&buf[..n], b"A");
        assert!(layer.pending == PendingIac::Verb);

        layer.inner.inbox.push_back(0x01);
        layer.inner.inbox.push_back(b'B');
        let n = layer.read(&mut buf).unwrap();
        assert_eq!(&buf[..n], b"B");
    }

    #[test]
    fn round_trip_preserves_arbitrary_bytes() {
        let payload: Vec<u8> = (0u8..=255).collect();
        let mut writer = TelnetLayer::new(MemoryTransport {
            inbox: VecDeque::new(),
            outbox: Vec::new(),
        });
        writer.write(&payload).unwrap();
        let wire = writer.into_inner().outbox;

        let mut reader = TelnetLayer::new(MemoryTransport {
            inbox: wire.into(),
            outbox: Vec::new(),
        });
        let mut decoded = Vec::new();
        let mut buf = [0u8; 64];
        loop {
            let n = reader.read(&mut buf).unwrap();
            if n == 0 {
                break;
            }
            decoded.extend_from_slice(&buf[..n]);
        }
        assert_eq!(decoded, payload);
    }
}
