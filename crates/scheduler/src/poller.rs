//! `poll(2)`-based readiness wait for the fd [`Interest`]s tasks report.

use std::os::unix::io::RawFd;
use std::time::Duration;

use crate::task::Interest;

/// Which fds (by position in the `interests` slice) became ready, plus
/// whether the wait returned because the timeout elapsed.
#[derive(Debug, Default)]
pub struct Readiness {
    pub readable: Vec<usize>,
    pub writable: Vec<usize>,
    pub timed_out: bool,
}

/// Blocks for up to `timeout` (forever if `None`) until one of the fds in
/// `interests` becomes ready. Tasks with no fd interest are skipped; a
/// fully empty interest set degenerates to a plain sleep.
pub fn block_until_ready(interests: &[Interest], timeout: Option<Duration>) -> Readiness {
    let mut fds: Vec<libc::pollfd> = Vec::new();
    let mut slots: Vec<usize> = Vec::new();

    for (index, interest) in interests.iter().enumerate() {
        let mut events = 0;
        let fd = match (interest.read_fd, interest.write_fd) {
            (Some(fd), _) => {
                events |= libc::POLLIN;
                Some(fd)
            }
            (None, Some(fd)) => {
                events |= libc::POLLOUT;
                Some(fd)
            }
            (None, None) => None,
        };
        if interest.read_fd.is_some() && interest.write_fd.is_some() {
            events |= libc::POLLOUT;
        }
        if let Some(fd) = fd {
            fds.push(libc::pollfd {
                fd: fd as RawFd,
                events,
                revents: 0,
            });
            slots.push(index);
        }
    }

    if fds.is_empty() {
        if let Some(timeout) = timeout {
            std::thread::sleep(timeout);
        }
        return Readiness {
            timed_out: true,
            ..Readiness::default()
        };
    }

    let timeout_ms = match timeout {
        Some(d) => i32::try_from(d.as_millis()).unwrap_or(i32::MAX),
        None => -1,
    };

    // SAFETY: `fds` is a valid, exclusively-owned buffer of `pollfd` for
    // the duration of the call, sized exactly by `fds.len()`.
    let ready = unsafe { libc::poll(fds.as_mut_ptr(), fds.len() as libc::nfds_t, timeout_ms) };

    let mut result = Readiness::default();
    if ready <= 0 {
        result.timed_out = true;
        return result;
    }

    for (fd, &slot) in fds.iter().zip(slots.iter()) {
        if fd.revents & (libc::POLLIN | libc::POLLHUP | libc::POLLERR) != 0 {
            result.readable.push(slot);
        }
        if fd.revents & libc::POLLOUT != 0 {
            result.writable.push(slot);
        }
    }
    result
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_interests_times_out_without_blocking_long() {
        let readiness = block_until_ready(&[], Some(Duration::from_millis(1)));
        assert!(readiness.timed_out);
        assert!(readiness.readable.is_empty());
    }

    #[test]
    fn pipe_becomes_readable_after_write() {
        let mut fds = [0; 2];
        let rc = unsafe { libc::pipe(fds.as_mut_ptr()) };
        assert_eq!(rc, 0);
        let (read_fd, write_fd) = (fds[0], fds[1]);

        let interest = Interest::readable(read_fd);
        let before = block_until_ready(&[interest], Some(Duration::from_millis(10)));
        assert!(before.readable.is_empty());

        unsafe {
            libc::write(write_fd, b"x".as_ptr().cast(), 1);
        }
        let after = block_until_ready(&[interest], Some(Duration::from_millis(50)));
        assert_eq!(after.readable, vec![0]);

        unsafe {
            libc::close(read_fd);
            libc::close(write_fd);
        }
    }
}
