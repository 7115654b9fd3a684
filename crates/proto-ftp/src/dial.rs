//! Non-blocking TCP connect for the control (and, for active mode, data)
//! channel. Mirrors the direct-connect address resolution/bind pattern used
//! elsewhere in this workspace, adapted so the connect itself never blocks:
//! the socket is created non-blocking and its readiness is driven by the
//! scheduler rather than by `connect_timeout`.

use std::io;
use std::net::{SocketAddr, TcpStream};

use socket2::{Domain, Protocol, SockAddr, Socket, Type};

use iobuf::Transport;

/// A TCP connect in flight. Poll its raw fd for writability; once writable,
/// call [`Dialer::finish`] to learn whether the connection succeeded.
pub struct Dialer {
    socket: Socket,
    target: SocketAddr,
}

impl Dialer {
    /// Starts a non-blocking connect to `target`, optionally binding to a
    /// local address first (its port is forced to `0`, letting the OS pick
    /// one, same as a plain bind-then-connect).
    pub fn start(target: SocketAddr, bind_address: Option<SocketAddr>) -> io::Result<Self> {
        if let Some(bind) = bind_address {
            if target.is_ipv4() != bind.is_ipv4() {
                return Err(io::Error::new(io::ErrorKind::AddrNotAvailable, "bind address family does not match target"));
            }
        }

        let domain = if target.is_ipv4() { Domain::IPV4 } else { Domain::IPV6 };
        let socket = Socket::new(domain, Type::STREAM, Some(Protocol::TCP))?;
        socket.set_nonblocking(true)?;

        if let Some(mut bind) = bind_address {
            match &mut bind {
                SocketAddr::V4(addr) => addr.set_port(0),
                SocketAddr::V6(addr) => addr.set_port(0),
            }
            socket.bind(&SockAddr::from(bind))?;
        }

        match socket.connect(&SockAddr::from(target)) {
            Ok(()) => {}
            Err(e) if matches!(e.raw_os_error(), Some(libc::EINPROGRESS)) => {}
            Err(e) if e.kind() == io::ErrorKind::WouldBlock => {}
            Err(e) => return Err(e),
        }

        Ok(Dialer { socket, target })
    }

    /// The fd to poll for `POLLOUT`.
    #[must_use]
    pub fn raw_fd(&self) -> std::os::unix::io::RawFd {
        std::os::unix::io::AsRawFd::as_raw_fd(&self.socket)
    }

    /// Call once the fd reports writable. `Ok(Some(stream))` means the
    /// connect succeeded; `Ok(None)` means it's still pending (spurious
    /// wakeup); `Err` is the connect failure (`SO_ERROR`).
    pub fn finish(&self) -> io::Result<Option<TcpStream>> {
        match self.socket.take_error()? {
            Some(e) => Err(e),
            None => match self.socket.peer_addr() {
                Ok(_) => Ok(Some(self.socket.try_clone()?.into())),
                Err(e) if e.kind() == io::ErrorKind::NotConnected => Ok(None),
                Err(e) => Err(e),
            },
        }
    }

    #[must_use]
    pub fn target(&self) -> SocketAddr {
        self.target
    }
}

/// A connected TCP socket adapted to this workspace's [`Transport`] trait,
/// set non-blocking for the scheduler's read/write loop.
pub struct TcpTransport {
    stream: TcpStream,
}

impl TcpTransport {
    pub fn new(stream: TcpStream) -> io::Result<Self> {
        stream.set_nonblocking(true)?;
        Ok(TcpTransport { stream })
    }

    #[must_use]
    pub fn peer_addr(&self) -> io::Result<SocketAddr> {
        self.stream.peer_addr()
    }
}

impl Transport for TcpTransport {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        io::Read::read(&mut self.stream, buf)
    }

    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        io::Write::write(&mut self.stream, buf)
    }

    fn raw_fd(&self) -> Option<i32> {
        Some(std::os::unix::io::AsRawFd::as_raw_fd(&self.stream))
    }
}
