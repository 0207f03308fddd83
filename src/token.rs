//! Socket token: a value handle over one OS socket.

use std::io;
use std::net::{Shutdown, TcpStream};
use std::sync::Arc;

#[cfg(unix)]
use std::os::fd::AsRawFd;
#[cfg(windows)]
use std::os::windows::io::AsRawSocket;

/// Raw OS socket handle, used as the lookup key by the poll reader.
#[cfg(unix)]
pub type SocketHandle = std::os::fd::RawFd;
/// Raw OS socket handle, used as the lookup key by the poll reader.
#[cfg(windows)]
pub type SocketHandle = std::os::windows::io::RawSocket;

/// Bytes buffered at the OS for a stream, ready to read.
#[cfg(unix)]
pub(crate) fn available_bytes(stream: &TcpStream) -> io::Result<usize> {
    let mut bytes: libc::c_int = 0;
    let rc = unsafe { libc::ioctl(stream.as_raw_fd(), libc::FIONREAD, &mut bytes) };
    if rc < 0 {
        Err(io::Error::last_os_error())
    } else {
        Ok(bytes as usize)
    }
}

/// A clonable value handle wrapping one OS socket.
///
/// Tokens share ownership of the underlying stream; the socket is
/// closed when the last clone is dropped. The manager keys its socket
/// lookup by [`SocketToken::handle`].
#[derive(Clone)]
pub struct SocketToken {
    stream: Arc<TcpStream>,
    handle: SocketHandle,
}

impl SocketToken {
    /// Wrap a connected stream in a token.
    pub fn new(stream: TcpStream) -> Self {
        #[cfg(unix)]
        let handle = stream.as_raw_fd();
        #[cfg(windows)]
        let handle = stream.as_raw_socket();
        Self {
            stream: Arc::new(stream),
            handle,
        }
    }

    /// Get the raw OS handle.
    pub fn handle(&self) -> SocketHandle {
        self.handle
    }

    /// Number of bytes buffered at the OS, ready to read.
    #[cfg(unix)]
    pub fn available(&self) -> io::Result<usize> {
        available_bytes(&self.stream)
    }

    /// Number of bytes buffered at the OS, ready to read.
    #[cfg(not(unix))]
    pub fn available(&self) -> io::Result<usize> {
        Err(io::Error::new(
            io::ErrorKind::Unsupported,
            "available-bytes query not supported on this platform",
        ))
    }

    /// True iff bytes are buffered at the OS.
    pub fn is_data_available(&self) -> bool {
        self.available().map(|n| n > 0).unwrap_or(false)
    }

    /// Probe whether the socket is still usable.
    ///
    /// Uses a non-consuming peek: pending data or a would-block
    /// condition means alive; end-of-stream or a hard error means the
    /// socket has been shut down on one side or the other.
    #[cfg(unix)]
    pub fn is_connected(&self) -> bool {
        let mut probe = 0u8;
        let rc = unsafe {
            libc::recv(
                self.handle,
                std::ptr::addr_of_mut!(probe).cast::<libc::c_void>(),
                1,
                libc::MSG_PEEK | libc::MSG_DONTWAIT,
            )
        };
        if rc > 0 {
            return true;
        }
        if rc == 0 {
            return false;
        }
        matches!(
            io::Error::last_os_error().kind(),
            io::ErrorKind::WouldBlock | io::ErrorKind::Interrupted
        )
    }

    /// Probe whether the socket is still usable.
    #[cfg(not(unix))]
    pub fn is_connected(&self) -> bool {
        self.stream.peer_addr().is_ok()
    }

    /// Duplicate the underlying stream (shares the OS socket).
    pub fn duplicate_stream(&self) -> io::Result<TcpStream> {
        self.stream.try_clone()
    }

    /// Shut the socket down in both directions.
    ///
    /// Safe to call more than once; errors from an already-shut
    /// socket are swallowed.
    pub fn shutdown(&self) {
        let _ = self.stream.shutdown(Shutdown::Both);
    }
}

impl std::fmt::Debug for SocketToken {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SocketToken")
            .field("handle", &self.handle)
            .finish()
    }
}
