//! Bridge contract: the surface the manager drives on each logical
//! connection.
//!
//! A *bridge* is one long-lived logical server connection. It owns a
//! TCP stream handed over at connect time, an outbound queue of
//! pending command batches, and the framing for whatever protocol
//! rides on top. The manager never looks inside any of that; it only
//! schedules the bridge through the callbacks below.

use std::net::TcpStream;
use std::sync::atomic::AtomicI32;
use std::time::Duration;

use crate::error::Result;

/// Outcome of a single [`SocketBridge::write_queue`] drain attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WriteResult {
    /// Bytes were written; more remain or the budget ran out.
    MoreWork,
    /// Something was written and the queue is now empty, but removal
    /// from the scheduler has not been confirmed yet.
    QueueEmptyAfterWrite,
    /// There was nothing to write on entry.
    NothingToDo,
    /// Another thread holds the bridge's write mutex; skip.
    CompetingWriter,
    /// The bridge is not connected; the scheduler must forget it.
    NoConnection,
}

/// Callbacks and write contract for one logical connection.
///
/// The write side follows a confirm-remove handshake: when a drain
/// reports [`WriteResult::NothingToDo`], the scheduler calls
/// [`SocketBridge::confirm_remove_from_write_queue`]. The bridge
/// returns `true` (and clears its own `queued` flag) only if no work
/// arrived since the drain observed emptiness; `false` tells the
/// scheduler to re-enqueue, which closes the race between a writer
/// leaving the queue and a producer enqueueing concurrently.
pub trait SocketBridge: Send + Sync {
    /// Called once after the TCP connect completes.
    ///
    /// The bridge receives its own handle to the socket (the stream
    /// shares the OS socket with the manager's token). Returning
    /// `Ok(false)` or an error abandons the connection.
    fn connected(&self, stream: TcpStream) -> Result<bool>;

    /// Called when readiness reports inbound bytes.
    ///
    /// The bridge must read greedily while
    /// [`SocketBridge::is_data_available`] holds, so one readiness
    /// event drains everything buffered at the OS.
    fn read(&self) -> Result<()>;

    /// Called in the async regime instead of installing the socket
    /// into the poll lookup; the bridge arranges its own read chain.
    ///
    /// Heartbeats are also the bridge's responsibility in that
    /// regime; the manager runs no pacemaker there.
    fn start_reading(&self) -> Result<()> {
        Ok(())
    }

    /// Called on a socket-level error, or on disposal mid-connect.
    fn error(&self);

    /// Called by the poll reader at the pacemaker interval while the
    /// connection is live.
    fn on_heartbeat(&self) -> Result<()> {
        Ok(())
    }

    /// Called when a readiness cycle reports no activity and no data;
    /// the bridge may declare the connection stale and tear it down.
    fn check_for_stale_connection(&self) -> Result<()> {
        Ok(())
    }

    /// True iff bytes are buffered at the OS or framing layer.
    fn is_data_available(&self) -> bool;

    /// Drain the outbound queue, writing for at most `budget`.
    ///
    /// `None` means unbounded (used by one-shot helper threads); the
    /// dedicated writer always passes a short budget so no bridge can
    /// monopolize it.
    fn write_queue(&self, budget: Option<Duration>) -> WriteResult;

    /// Commit to leaving the write queue.
    ///
    /// Returns `true` iff the bridge is definitively idle; the bridge
    /// clears its `queued` flag (release ordering) before returning
    /// `true`. A `false` return means work snuck in and the scheduler
    /// must re-enqueue.
    fn confirm_remove_from_write_queue(&self) -> bool;

    /// The 0/1 scheduler presence flag.
    ///
    /// The scheduler sets it with a 0→1 compare-and-swap (acquire) on
    /// enqueue, so work queued before the CAS is visible to whichever
    /// thread drains the bridge, and clears it with a release store
    /// when a drain ends in [`WriteResult::NoConnection`].
    fn queued(&self) -> &AtomicI32;
}
