//! Observable poll-reader state for diagnostics.

use std::sync::atomic::{AtomicU8, Ordering};

/// The poll reader's current phase.
///
/// Purely diagnostic: an operator or a test can read it without
/// taking any lock to see where the reader is stuck.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum ManagerState {
    /// No reader thread is running.
    Inactive = 0,
    /// Reader thread is starting up.
    Preparing,
    /// Checking whether the pacemaker interval has elapsed.
    CheckForHeartbeat,
    /// Invoking per-bridge heartbeat callbacks.
    ExecuteHeartbeat,
    /// Partitioning the lookup into active and dead sockets.
    LocateActiveSockets,
    /// Waiting on an empty lookup.
    NoSocketsPause,
    /// Blocked in the readiness call.
    ExecuteSelect,
    /// Readiness reported nothing; probing for data and staleness.
    CheckForStaleConnections,
    /// Dispatching read callbacks.
    ProcessRead,
    /// Dispatching error callbacks.
    ProcessError,
    /// The last readiness call failed; retrying.
    Faulted,
}

impl ManagerState {
    fn from_u8(value: u8) -> Self {
        match value {
            0 => ManagerState::Inactive,
            1 => ManagerState::Preparing,
            2 => ManagerState::CheckForHeartbeat,
            3 => ManagerState::ExecuteHeartbeat,
            4 => ManagerState::LocateActiveSockets,
            5 => ManagerState::NoSocketsPause,
            6 => ManagerState::ExecuteSelect,
            7 => ManagerState::CheckForStaleConnections,
            8 => ManagerState::ProcessRead,
            9 => ManagerState::ProcessError,
            _ => ManagerState::Faulted,
        }
    }
}

/// Lock-free cell holding a [`ManagerState`].
#[derive(Debug)]
pub(crate) struct AtomicManagerState(AtomicU8);

impl AtomicManagerState {
    pub(crate) fn new() -> Self {
        Self(AtomicU8::new(ManagerState::Inactive as u8))
    }

    pub(crate) fn get(&self) -> ManagerState {
        ManagerState::from_u8(self.0.load(Ordering::Relaxed))
    }

    pub(crate) fn set(&self, state: ManagerState) {
        self.0.store(state as u8, Ordering::Relaxed);
    }
}
