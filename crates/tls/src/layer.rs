//! Wraps any [`Transport`] in a non-blocking TLS record layer.

use std::io::{self, Read, Write};
use std::sync::Arc;

use iobuf::Transport;
use rustls::{ClientConfig, ClientConnection};
use rustls_pki_types::ServerName;

use crate::error::TlsError;

/// Adapts a [`Transport`]'s custom `read`/`write` methods to
/// `std::io::Read`/`Write`, which is what rustls's `read_tls`/`write_tls`
/// want on the wire side.
struct Wire<'a, T>(&'a mut T);

impl<T: Transport> Read for Wire<'_, T> {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        self.0.read(buf)
    }
}

impl<T: Transport> Write for Wire<'_, T> {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.0.write(buf)
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

/// A client-side TLS session layered over an inner non-blocking transport.
/// `want_read`/`want_write` (exposed as [`TlsLayer::wants_read`] /
/// [`TlsLayer::wants_write`]) are what the owning task maps to
/// `POLLIN`/`POLLOUT` while the handshake is in progress.
pub struct TlsLayer<T> {
    inner: T,
    conn: ClientConnection,
}

impl<T: Transport> TlsLayer<T> {
    pub fn connect(inner: T, config: Arc<ClientConfig>, server_name: ServerName<'static>) -> Result<Self, TlsError> {
        let conn = ClientConnection::new(config, server_name)?;
        Ok(Self { inner, conn })
    }

    #[must_use]
    pub fn is_handshaking(&self) -> bool {
        self.conn.is_handshaking()
    }

    #[must_use]
    pub fn wants_read(&self) -> bool {
        self.conn.wants_read()
    }

    #[must_use]
    pub fn wants_write(&self) -> bool {
        self.conn.wants_write()
    }

    /// Unwraps back to the inner transport, for `CCC`-style downgrades of
    /// an FTP control channel back to cleartext after a graceful TLS
    /// shutdown (`conn.send_close_notify()` must be called first).
    pub fn into_inner(self) -> T {
        self.inner
    }

    pub fn send_close_notify(&mut self) {
        self.conn.send_close_notify();
    }

    /// Drains any ciphertext rustls wants to send, and feeds in any
    /// ciphertext ready to read, without blocking.
    fn pump(&mut self) -> io::Result<()> {
        while self.conn.wants_write() {
            let mut wire = Wire(&mut self.inner);
            self.conn.write_tls(&mut wire)?;
        }
        if self.conn.wants_read() {
            let mut wire = Wire(&mut self.inner);
            let n = self.conn.read_tls(&mut wire)?;
            if n == 0 {
                return Err(io::Error::new(io::ErrorKind::UnexpectedEof, "TLS peer closed the connection"));
            }
            self.conn
                .process_new_packets()
                .map_err(|err| io::Error::new(io::ErrorKind::InvalidData, err))?;
        }
        Ok(())
    }
}

impl<T: Transport> Transport for TlsLayer<T> {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        self.pump()?;
        match self.conn.reader().read(buf) {
            Ok(0) if self.conn.wants_read() || self.conn.is_handshaking() => {
                Err(io::Error::from(io::ErrorKind::WouldBlock))
            }
            other => other,
        }
    }

    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        let n = self.conn.writer().write(buf)?;
        self.pump()?;
        Ok(n)
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
            if self.inbox.is_empty() {
                return Err(io::Error::from(io::ErrorKind::WouldBlock));
            }
            let n = buf.len().min(self.inbox.len());
            for slot in buf.iter_mut().take(n) {
                *slot = self.inbox.pop_front().unwrap();
            }
            Ok(n)
        }

        fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
            self.outbox.extend_from_slice(buf);
            Ok(buf.len())
        }
    }

    #[test]
    fn fresh_layer_wants_write_before_reading_anything() {
        let config = crate::config::default_client_config();
        let server_name = crate::config::server_name("example.com").unwrap();
        let transport = MemoryTransport { inbox: VecDeque::new(), outbox: Vec::new() };
        let layer = TlsLayer::connect(transport, config, server_name).unwrap();
        assert!(layer.wants_write());
        assert!(layer.is_handshaking());
    }
}
