//! The [`Transport`] trait every layer wraps, plus the raw-fd transport at
//! the bottom of the stack.

use std::io;

/// A non-blocking byte transport. `read`/`write` follow the same contract
/// as [`std::io::Read`]/[`std::io::Write`] except they are expected to
/// return [`io::ErrorKind::WouldBlock`] instead of blocking — the owning
/// task reports this transport's fd as its wait interest and retries once
/// the scheduler observes readiness.
pub trait Transport {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize>;
    fn write(&mut self, buf: &[u8]) -> io::Result<usize>;

    /// The raw fd this transport ultimately reads/writes, if any.
    fn raw_fd(&self) -> Option<i32> {
        None
    }
}

#[cfg(unix)]
pub use unix::FdTransport;

#[cfg(unix)]
mod unix {
    use std::io;
    use std::os::unix::io::RawFd;

    use super::Transport;

    /// A transport over a raw, already-connected, non-blocking file
    /// descriptor (a TCP socket or a pipe to a subprocess).
    pub struct FdTransport {
        fd: RawFd,
    }

    impl FdTransport {
        /// Wraps `fd`. The caller is responsible for having set
        /// `O_NONBLOCK` and for closing it on drop of the owning session.
        #[must_use]
        pub fn new(fd: RawFd) -> Self {
            Self { fd }
        }
    }

    impl Transport for FdTransport {
        fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
            // SAFETY: `buf` is a valid, exclusively-borrowed buffer for the
            // duration of the call.
            let n = unsafe { libc::read(self.fd, buf.as_mut_ptr().cast(), buf.len()) };
            if n < 0 {
                Err(io::Error::last_os_error())
            } else {
                Ok(n as usize)
            }
        }

        fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
            // SAFETY: `buf` is a valid, exclusively-borrowed buffer for the
            // duration of the call.
            let n = unsafe { libc::write(self.fd, buf.as_ptr().cast(), buf.len()) };
            if n < 0 {
                Err(io::Error::last_os_error())
            } else {
                Ok(n as usize)
            }
        }

        fn raw_fd(&self) -> Option<i32> {
            Some(self.fd)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct MemoryTransport {
        inbox: std::collections::VecDeque<u8>,
        outbox: Vec<u8>,
    }

    impl Transport for MemoryTransport {
        fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
            if self.inbox.is_empty() {
                return Err(io::Error::from(io::ErrorKind::WouldBlock));
            }
            let mut n = 0;
            while n < buf.len() {
                match self.inbox.pop_front() {
                    Some(byte) => {
                        buf[n] = byte;
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
    fn memory_transport_round_trips() {
        let mut transport = MemoryTransport {
            inbox: [1, 2, 3].into_iter().collect(),
            outbox: Vec::new(),
        };
        let mut buf = [0u8; 8];
        let n = transport.read(&mut buf).unwrap();
        assert_eq!(&buf[..n], &[1, 2, 3]);
        transport.write(b"ack").unwrap();
        assert_eq!(transport.outbox, b"ack");
    }
}
