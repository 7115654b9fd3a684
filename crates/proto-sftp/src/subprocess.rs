//! Spawns the `connect-program` (`ssh -a -x host -s sftp` by default) and
//! wires its stdin/stdout as a non-blocking transport, the same raw-fd
//! idiom the rest of this workspace uses for sockets.

use std::io;
use std::process::{Child, Command, Stdio};

use iobuf::{FdTransport, Transport};

/// The ssh (or other connect-program) argv used when nothing else is
/// configured. `-a` disables agent forwarding, `-x` disables X11
/// forwarding; neither is wanted for a plain file-transfer subprocess.
pub fn default_connect_program() -> Vec<String> {
    vec!["ssh".to_string(), "-a".to_string(), "-x".to_string()]
}

/// A spawned connect-program, plus its stdin/stdout adapted to
/// [`Transport`]. Dropping this kills the child (best-effort; no
/// `kill_on_drop` equivalent in `std`, so `Drop` sends the signal itself).
pub struct Subprocess {
    child: Child,
    transport: SubprocessTransport,
}

struct SubprocessTransport {
    stdin_fd: i32,
    stdout_fd: i32,
}

impl Subprocess {
    /// Spawns `program[0] program[1..] host -s sftp` (the `-s sftp`
    /// subsystem request is appended unconditionally; `program` is the
    /// user's `connect-program` override or [`default_connect_program`]).
    pub fn spawn(program: &[String], host: &str, port: Option<u16>, user: Option<&str>) -> io::Result<Self> {
        let Some((argv0, rest)) = program.split_first() else {
            return Err(io::Error::new(io::ErrorKind::InvalidInput, "empty connect-program"));
        };
        let mut command = Command::new(argv0);
        command.args(rest);
        if let Some(port) = port {
            command.arg("-p").arg(port.to_string());
        }
        if let Some(user) = user {
            command.arg("-l").arg(user);
        }
        command.arg(host).arg("-s").arg("sftp");
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

    /// Whether the child has exited, reaping it without blocking if so.
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
    fn default_program_disables_agent_and_x11_forwarding() {
        let argv = default_connect_program();
        assert_eq!(argv, vec!["ssh", "-a", "-x"]);
    }
}
