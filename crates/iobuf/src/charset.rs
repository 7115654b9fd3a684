//! Charset translation layer (feature `iconv`), stacked independently of
//! [`crate::telnet::TelnetLayer`] — a session may tunnel over telnet,
//! translate charsets, both, or neither.

use std::io;

use encoding_rs::Encoding;

use crate::transport::Transport;

/// Translates outgoing bytes from `local` to `remote` and incoming bytes
/// back from `remote` to `local`. Once constructed the pair of encodings
/// is fixed for the life of the session; lftp's `ftp:charset` is a
/// connect-time setting, never renegotiated mid-transfer.
pub struct CharsetLayer<T> {
    inner: T,
    local: &'static Encoding,
    remote: &'static Encoding,
    read_pending: Vec<u8>,
}

impl<T: Transport> CharsetLayer<T> {
    #[must_use]
    pub fn new(inner: T, local: &'static Encoding, remote: &'static Encoding) -> Self {
        Self {
            inner,
            local,
            remote,
            read_pending: Vec::new(),
        }
    }

    pub fn into_inner(self) -> T {
        self.inner
    }
}

impl<T: Transport> Transport for CharsetLayer<T> {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        if self.read_pending.is_empty() {
            let mut raw = vec![0u8; buf.len().max(4096)];
            let n = self.inner.read(&mut raw)?;
            if n == 0 {
                return Ok(0);
            }
            let (decoded, _, _) = self.remote.decode(&raw[..n]);
            let (reencoded, _, _) = self.local.encode(&decoded);
            self.read_pending = reencoded.into_owned();
        }

        let take = buf.len().min(self.read_pending.len());
        buf[..take].copy_from_slice(&self.read_pending[..take]);
        self.read_pending.drain(..take);
        Ok(take)
    }

    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        let (decoded, _, _) = self.local.decode(buf);
        let (reencoded, _, had_errors) = self.remote.encode(&decoded);
        if had_errors {
            return Err(io::Error::new(
                io::ErrorKind::InvalidData,
                "filename not representable in the remote charset",
            ));
        }
        self.inner.write(&reencoded)?;
        Ok(buf.len())
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
    fn ascii_round_trips_identically_under_utf8() {
        let mut layer = CharsetLayer::new(
            MemoryTransport {
                inbox: VecDeque::new(),
                outbox: Vec::new(),
            },
            encoding_rs::UTF_8,
            encoding_rs::UTF_8,
        );
        layer.write(b"report.txt").unwrap();
        assert_eq!(layer.into_inner().outbox, b"report.txt");
    }

    #[test]
    fn translates_local_utf8_to_remote_latin1_on_write() {
        let mut layer = CharsetLayer::new(
            MemoryTransport {
                inbox: VecDeque::new(),
                outbox: Vec::new(),
            },
            encoding_rs::UTF_8,
            encoding_rs::WINDOWS_1252,
        );
        layer.write("café.txt".as_bytes()).unwrap();
        let wire = layer.into_inner().outbox;
        assert_eq!(wire, b"caf\xe9.txt");
    }
}
