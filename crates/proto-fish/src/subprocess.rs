//! Spawns `ssh [-l user] [-p port] host "echo FISH:;/bin/bash"` and wires
//! its stdin/stdout as a non-blocking transport; the same idiom
//! `proto-sftp` uses for its `ssh -s sftp` subsystem request, just with a
//! different remote command.

use std::io;
use std::process::{Child, Command, Stdio};

use iobuf::{FdTransport, Transport};

/// The remote command run once the shell connects: announce readiness,
/// then exec an interactive bash so every subsequent `#VERB` command can
/// be piped straight to its stdin.
const REMOTE_STUB: &str = "echo FISH:;/bin/bash";

pub struct Subprocess {
    child: Child,
    transport: SubprocessTransport,
}

struct SubprocessTransport {
    stdin_fd: i32,
    stdout_fd: i32,
}

impl Subprocess {
    pub fn spawn(host: &str, port: Option<u16>, user: Option<&str>) -> io::Result<Self> {
        let mut command = Command::new("ssh");
        command.arg("-a").arg("-x");
        if let Some(user) = user {
            command.arg("-l").arg(user);
        }
        if let Some(port) = port {
            command.arg("-p").arg(port.to_string());
        }
        command.arg(host).arg(REMOTE_STUB);
        command.stdin(Stdio::piped()).stdout(Stdio::piped()).stderr(Stdio::inherit());

        let mut child = command.spawn()?;
        let stdin = child.stdin.take().expect("piped stdin");
        let stdout = child.stdout.take().expect("piped stdout");

        let stdin_fd = std::os::unix::io::IntoRawFd::into_raw_fd(stdin);
        let stdout_fd = std::os::unix::io::IntoRawFd::into_raw_fd(stdout);
        set_nonblocking(stdin_fd)?;
        set_nonblocking(stdout_fd)?;

        Ok(Self { child, transport: SubprocessTransport { stdin_fd, stdout_fd } })
    }

    #[must_use]
    pub fn transport(&mut self) -> &mut impl Transport {
        &mut self.transport
    }

    #[must_use]
    pub fn read_fd(&self) -> i32 {
        self.transport.stdout_fd
    }

    #[must_use]
    pub fn write_fd(&self) -> i32 {
        self.transport.stdin_fd
    }

    pub fn has_exited(&mut self) -> bool {
        matches!(self.child.try_wait(), Ok(Some(_)))
    }
}

impl Transport for SubprocessTransport {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        FdTransport::new(self.stdout_fd).read(buf)
    }

    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        FdTransport::new(self.stdin_fd).write(buf)
    }

    fn raw_fd(&self) -> Option<i32> {
        Some(self.stdout_fd)
    }
}

impl Drop for Subprocess {
    fn drop(&mut self) {
        let _ = self.child.kill();
        let _ = self.child.wait();
    }
}

fn set_nonblocking(fd: i32) -> io::Result<()> {
    // SAFETY: `fd` is a valid, open descriptor owned by this process for
    // the duration of the call.
    unsafe {
        let flags = libc::fcntl(fd, libc::F_GETFL);
        if flags < 0 {
            return Err(io::Error::last_os_error());
        }
        if libc::fcntl(fd, libc::F_SETFL, flags | libc::O_NONBLOCK) < 0 {
            return Err(io::Error::last_os_error());
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn remote_stub_announces_before_execing_bash() {
        assert!(REMOTE_STUB.starts_with("echo FISH:;"));
    }
}
