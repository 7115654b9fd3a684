//! # Overview
//!
//! `getaddrinfo` blocks, so a [`Resolver`] runs it on a background thread
//! and reports completion through a self-pipe: the resolver is itself a
//! [`scheduler::Task`] whose [`scheduler::Interest`] is "readable on this
//! fd", so the cooperative scheduler can wait on it exactly like a socket.
//!
//! # Design
//!
//! Only one lookup is ever in flight per `Resolver`; starting a new host
//! means constructing a new one. Results are filtered by [`AddressFamily`]
//! before being handed back, mirroring `ftp:ipv6` / `net:connection-limit`
//! style address-family preferences used across the protocol engines.

use std::io;
use std::net::{SocketAddr, ToSocketAddrs};
use std::sync::mpsc;
use std::thread;

use scheduler::{Interest, StepResult, Task};
use thiserror::Error;

/// Which address families a lookup should keep.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Default)]
pub enum AddressFamily {
    #[default]
    Any,
    Ipv4Only,
    Ipv6Only,
}

impl AddressFamily {
    fn retain(self, addr: &SocketAddr) -> bool {
        match self {
            AddressFamily::Any => true,
            AddressFamily::Ipv4Only => addr.is_ipv4(),
            AddressFamily::Ipv6Only => addr.is_ipv6(),
        }
    }
}

#[derive(Debug, Error)]
pub enum ResolverError {
    #[error("failed to resolve '{host}': {source}")]
    Lookup { host: String, source: io::Error },
    #[error("'{host}' did not resolve to any address of the requested family")]
    NoAddresses { host: String },
}

fn resolve_blocking(
    host: &str,
    port: u16,
    family: AddressFamily,
) -> Result<Vec<SocketAddr>, ResolverError> {
    let addrs: Vec<SocketAddr> = (host, port)
        .to_socket_addrs()
        .map_err(|source| ResolverError::Lookup {
            host: host.to_string(),
            source,
        })?
        .filter(|addr| family.retain(addr))
        .collect();

    if addrs.is_empty() {
        return Err(ResolverError::NoAddresses {
            host: host.to_string(),
        });
    }
    Ok(addrs)
}

enum State {
    Pending {
        rx: mpsc::Receiver<Result<Vec<SocketAddr>, ResolverError>>,
        #[cfg(unix)]
        pipe: Pipe,
    },
    Done(Option<Result<Vec<SocketAddr>, ResolverError>>),
}

/// A single in-flight (or completed) name lookup, driven as a
/// [`scheduler::Task`].
pub struct Resolver {
    state: State,
}

impl Resolver {
    /// Spawns a background thread to resolve `host:port`, filtered to
    /// `family`.
    #[must_use]
    pub fn spawn(host: impl Into<String>, port: u16, family: AddressFamily) -> Self {
        let host = host.into();
        let (tx, rx) = mpsc::channel();
        #[cfg(unix)]
        let pipe = Pipe::new();
        #[cfg(unix)]
        let write_fd = pipe.write_fd;

        thread::spawn(move || {
            let result = resolve_blocking(&host, port, family);
            let _ = tx.send(result);
            #[cfg(unix)]
            unsafe {
                let byte = 1u8;
                libc::write(write_fd, (&byte as *const u8).cast(), 1);
                libc::close(write_fd);
            }
        });

        Self {
            state: State::Pending {
                rx,
                #[cfg(unix)]
                pipe,
            },
        }
    }

    /// Takes the result out once the lookup has finished; `None` while
    /// still pending.
    pub fn take_result(&mut self) -> Option<Result<Vec<SocketAddr>, ResolverError>> {
        match &mut self.state {
            State::Done(result) => result.take(),
            State::Pending { .. } => None,
        }
    }
}

impl Task for Resolver {
    fn step(&mut self) -> StepResult {
        match &self.state {
            State::Pending { rx, .. } => match rx.try_recv() {
                Ok(result) => {
                    self.state = State::Done(Some(result));
                    StepResult::Moved
                }
                Err(mpsc::TryRecvError::Empty) => StepResult::Stall,
                Err(mpsc::TryRecvError::Disconnected) => {
                    self.state = State::Done(Some(Err(ResolverError::NoAddresses {
                        host: String::new(),
                    })));
                    StepResult::Moved
                }
            },
            State::Done(_) => StepResult::WantDie,
        }
    }

    fn interest(&self) -> Interest {
        match &self.state {
            #[cfg(unix)]
            State::Pending { pipe, .. } => Interest::readable(pipe.read_fd),
            #[cfg(not(unix))]
            State::Pending { .. } => Interest::none(),
            State::Done(_) => Interest::none(),
        }
    }
}

#[cfg(unix)]
struct Pipe {
    read_fd: i32,
    write_fd: i32,
}

#[cfg(unix)]
impl Pipe {
    fn new() -> Self {
        let mut fds = [0; 2];
        // SAFETY: `fds` is a valid 2-element buffer for the duration of the call.
        let rc = unsafe { libc::pipe(fds.as_mut_ptr()) };
        assert_eq!(rc, 0, "failed to create resolver completion pipe");
        Self {
            read_fd: fds[0],
            write_fd: fds[1],
        }
    }
}

#[cfg(unix)]
impl Drop for Pipe {
    fn drop(&mut self) {
        unsafe {
            libc::close(self.read_fd);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::{Duration, Instant};

    #[test]
    fn resolves_localhost_loopback() {
        let mut resolver = Resolver::spawn("localhost", 80, AddressFamily::Any);
        let deadline = Instant::now() + Duration::from_secs(2);
        loop {
            if resolver.step() != StepResult::Stall {
                break;
            }
            assert!(Instant::now() < deadline, "resolver never completed");
            thread::sleep(Duration::from_millis(5));
        }
        let result = resolver.take_result().expect("result should be ready");
        let addrs = result.expect("localhost should resolve");
        assert!(!addrs.is_empty());
    }

    #[test]
    fn ipv4_only_filters_out_ipv6_results() {
        let mut resolver = Resolver::spawn("localhost", 80, AddressFamily::Ipv4Only);
        let deadline = Instant::now() + Duration::from_secs(2);
        loop {
            if resolver.step() != StepResult::Stall {
                break;
            }
            assert!(Instant::now() < deadline, "resolver never completed");
            thread::sleep(Duration::from_millis(5));
        }
        if let Some(Ok(addrs)) = resolver.take_result() {
            assert!(addrs.iter().all(SocketAddr::is_ipv4));
        }
    }
}
