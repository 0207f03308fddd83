//! Error types for socket manager operations.

use std::io;
use thiserror::Error;

/// Errors that can occur while managing sockets.
#[derive(Error, Debug)]
pub enum SockmuxError {
    /// I/O error during network operations.
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    /// Hostname resolution produced no usable address.
    #[error("No usable IPv4/IPv6 address for host: {host}")]
    Resolve { host: String },

    /// The socket manager has been disposed.
    #[error("Socket manager disposed")]
    Disposed,

    /// The bridge declined the connection in its `connected` callback.
    #[error("Connection rejected by bridge")]
    Rejected,

    /// No tokio runtime was available to drive async reads.
    #[cfg(feature = "tokio")]
    #[error("No tokio runtime available for async reads")]
    NoRuntime,
}

/// Result type alias for socket manager operations.
pub type Result<T> = std::result::Result<T, SockmuxError>;

impl SockmuxError {
    /// Create a new resolution error.
    pub fn resolve(host: impl Into<String>) -> Self {
        Self::Resolve { host: host.into() }
    }

    /// Check if this error was caused by manager disposal.
    pub fn is_disposed(&self) -> bool {
        matches!(self, Self::Disposed)
    }

    /// Check if this error is recoverable (transient).
    ///
    /// Interrupted and would-block conditions can be retried on the
    /// same socket; everything else means the socket is gone.
    pub fn is_recoverable(&self) -> bool {
        matches!(
            self,
            Self::Io(e) if e.kind() == io::ErrorKind::WouldBlock
                || e.kind() == io::ErrorKind::TimedOut
                || e.kind() == io::ErrorKind::Interrupted
        )
    }
}
