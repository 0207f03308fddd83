//! `poll(2)`-based readiness for the sync reader.

use std::io;
use std::time::Duration;

use crate::token::SocketHandle;

/// Handles reported ready by one readiness call.
pub(crate) struct ReadySet {
    /// Handles with bytes (or end-of-stream) to read.
    pub(crate) readable: Vec<SocketHandle>,
    /// Handles in a hard error state.
    pub(crate) errored: Vec<SocketHandle>,
}

impl ReadySet {
    pub(crate) fn is_empty(&self) -> bool {
        self.readable.is_empty() && self.errored.is_empty()
    }
}

/// Wait up to `timeout` for readiness on any of `handles`.
///
/// Hang-ups count as readable so end-of-stream is observed through
/// the normal read dispatch; invalid descriptors land in the error
/// set. A negative return from the syscall (including `EINTR`) is
/// surfaced as an error for the caller to record and retry.
pub(crate) fn await_readiness(
    handles: &[SocketHandle],
    timeout: Duration,
) -> io::Result<ReadySet> {
    let mut fds: Vec<libc::pollfd> = handles
        .iter()
        .map(|&fd| libc::pollfd {
            fd,
            events: libc::POLLIN,
            revents: 0,
        })
        .collect();

    let rc = unsafe {
        libc::poll(
            fds.as_mut_ptr(),
            fds.len() as libc::nfds_t,
            timeout.as_millis() as libc::c_int,
        )
    };
    if rc < 0 {
        return Err(io::Error::last_os_error());
    }

    let mut ready = ReadySet {
        readable: Vec::new(),
        errored: Vec::new(),
    };
    if rc == 0 {
        return Ok(ready);
    }
    for pfd in &fds {
        if pfd.revents & (libc::POLLERR | libc::POLLNVAL) != 0 {
            ready.errored.push(pfd.fd);
        } else if pfd.revents & (libc::POLLIN | libc::POLLHUP) != 0 {
            ready.readable.push(pfd.fd);
        }
    }
    Ok(ready)
}
