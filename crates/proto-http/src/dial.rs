//! Non-blocking TCP connect, duplicated from `proto-ftp`'s dialer rather
//! than shared: the two engines' connect lifecycles are driven from
//! different state machines and a shared crate would only buy a few dozen
//! lines at the cost of a cross-protocol dependency.

use std::io;
use std::net::{SocketAddr, TcpStream};

use socket2::{Domain, Protocol, SockAddr, Socket, Type};

use iobuf::Transport;

pub struct Dialer {
    socket: Socket,
    target: SocketAddr,
}

impl Dialer {
    pub fn start(target: SocketAddr) -> io::Result<Self> {
        let domain = if target.is_ipv4() { Domain::IPV4 } else { Domain::IPV6 };
        let socket = Socket::new(domain, Type::STREAM, Some(Protocol::TCP))?;
        socket.set_nonblocking(true)?;

        match socket.connect(&SockAddr::from(target)) {
            Ok(()) => {}
            Err(e) if matches!(e.raw_os_error(), Some(libc::EINPROGRESS)) => {}
            Err(e) if e.kind() == io::ErrorKind::WouldBlock => {}
            Err(e) => return Err(e),
        }

        Ok(Dialer { socket, target })
    }

    #[must_use]
    pub fn raw_fd(&self) -> std::os::unix::io::RawFd {
        std::os::unix::io::AsRawFd::as_raw_fd(&self.socket)
    }

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

/// A connected TCP socket adapted to this workspace's [`Transport`] trait.
pub struct TcpTransport {
    stream: TcpStream,
}

impl TcpTransport {
    pub fn new(stream: TcpStream) -> io::Result<Self> {
        stream.set_nonblocking(true)?;
        Ok(TcpTransport { stream })
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
