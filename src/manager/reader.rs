//! Sync-regime poll reader.
//!
//! One thread per manager walks a readiness loop over every socket in
//! the lookup: pace heartbeats, cull dead sockets, block in `poll`,
//! dispatch read and error callbacks. The thread exits when the
//! lookup stays empty past the idle timeout and is restarted by the
//! next [`SocketManager::add_read`], with a compare-and-swap on
//! `reader_count` guaranteeing at most one reader per manager.

use std::sync::atomic::Ordering;
use std::sync::{Arc, MutexGuard};
use std::time::{Duration, Instant};

use tracing::{debug, trace, warn};

use super::{readiness, spawn_worker, Lookup, LookupEntry, ManagerState, Shared, SocketManager};
use crate::bridge::SocketBridge;
use crate::error::{Result, SockmuxError};
use crate::token::{SocketHandle, SocketToken};

/// Timeout for each readiness call.
const SELECT_TIMEOUT: Duration = Duration::from_secs(1);

impl SocketManager {
    /// Register a connected socket with the poll reader.
    ///
    /// Starts a reader thread when the lookup transitions from empty
    /// to non-empty and no reader is running.
    pub(crate) fn add_read(
        &self,
        token: SocketToken,
        bridge: Arc<dyn SocketBridge>,
    ) -> Result<()> {
        let shared = &self.shared;
        let start_reader = {
            let mut lookup = shared.lookup.lock().unwrap();
            if lookup.disposed {
                return Err(SockmuxError::Disposed);
            }
            let was_empty = lookup.sockets.is_empty();
            lookup
                .sockets
                .insert(token.handle(), LookupEntry { token, bridge });
            shared.lookup_signal.notify_all();
            // The exiting reader clears reader_count while still
            // holding this lock, so the CAS below cannot race it into
            // a stranded socket.
            was_empty
                && shared
                    .reader_count
                    .compare_exchange(0, 1, Ordering::Acquire, Ordering::Relaxed)
                    .is_ok()
        };

        if start_reader {
            if let Err(error) = spawn_worker(shared, "Read", run) {
                shared.reader_count.store(0, Ordering::Release);
                warn!(%error, "could not spawn poll reader");
                return Err(error.into());
            }
            debug!(name = %shared.config.name, "poll reader started");
        }
        Ok(())
    }
}

/// The reader loop.
pub(crate) fn run(shared: Arc<Shared>) {
    shared.state.set(ManagerState::Preparing);
    let mut last_heartbeat = Instant::now();

    loop {
        shared.state.set(ManagerState::CheckForHeartbeat);
        if last_heartbeat.elapsed() >= shared.config.heartbeat_interval {
            shared.state.set(ManagerState::ExecuteHeartbeat);
            run_heartbeats(&shared);
            last_heartbeat = Instant::now();
        }

        shared.state.set(ManagerState::LocateActiveSockets);
        let mut active: Vec<(SocketHandle, Arc<dyn SocketBridge>)> = Vec::new();
        {
            let mut lookup = shared.lookup.lock().unwrap();
            if lookup.disposed {
                return exit(&shared, lookup);
            }
            if lookup.sockets.is_empty() {
                shared.state.set(ManagerState::NoSocketsPause);
                let (guard, _result) = shared
                    .lookup_signal
                    .wait_timeout_while(lookup, shared.config.idle_reader_timeout, |l| {
                        l.sockets.is_empty() && !l.disposed
                    })
                    .unwrap();
                lookup = guard;
                if lookup.disposed || lookup.sockets.is_empty() {
                    return exit(&shared, lookup);
                }
                shared.state.set(ManagerState::LocateActiveSockets);
            }
            lookup.sockets.retain(|handle, entry| {
                if entry.token.is_connected() {
                    active.push((*handle, Arc::clone(&entry.bridge)));
                    true
                } else {
                    debug!(handle = *handle as i64, "culling dead socket");
                    false
                }
            });
        }
        if active.is_empty() {
            continue;
        }

        shared.state.set(ManagerState::ExecuteSelect);
        let handles: Vec<SocketHandle> = active.iter().map(|(handle, _)| *handle).collect();
        let ready = match readiness::await_readiness(&handles, SELECT_TIMEOUT) {
            Ok(ready) => ready,
            Err(error) => {
                shared.record_error();
                shared.state.set(ManagerState::Faulted);
                trace!(%error, "readiness call failed; retrying");
                continue;
            }
        };

        if ready.is_empty() {
            // Nothing reported ready: probe each bridge for buffered
            // data the platform missed, otherwise let it judge
            // staleness.
            shared.state.set(ManagerState::CheckForStaleConnections);
            for (_, bridge) in &active {
                let outcome = if bridge.is_data_available() {
                    bridge.read()
                } else {
                    bridge.check_for_stale_connection()
                };
                if let Err(error) = outcome {
                    warn!(%error, "idle-probe callback failed");
                }
            }
            continue;
        }

        shared.state.set(ManagerState::ProcessRead);
        let mut dispatched = 0usize;
        for handle in &ready.readable {
            if let Some(bridge) = bridge_for(&shared, *handle) {
                dispatched += 1;
                if let Err(error) = bridge.read() {
                    warn!(handle = *handle as i64, %error, "read callback failed");
                }
            }
        }

        shared.state.set(ManagerState::ProcessError);
        for handle in &ready.errored {
            if let Some(bridge) = bridge_for(&shared, *handle) {
                dispatched += 1;
                bridge.error();
            }
        }

        if dispatched == 0 {
            // Readiness fired but every reported handle had already
            // left the lookup; fall back to the data-available probe.
            for (_, bridge) in &active {
                if bridge.is_data_available() {
                    if let Err(error) = bridge.read() {
                        warn!(%error, "fallback read callback failed");
                    }
                }
            }
        }
    }
}

fn run_heartbeats(shared: &Shared) {
    let bridges: Vec<Arc<dyn SocketBridge>> = {
        let lookup = shared.lookup.lock().unwrap();
        lookup
            .sockets
            .values()
            .map(|entry| Arc::clone(&entry.bridge))
            .collect()
    };
    for bridge in bridges {
        if let Err(error) = bridge.on_heartbeat() {
            warn!(%error, "heartbeat callback failed");
        }
    }
}

/// Look up the callback for a ready handle; never holds the lock
/// across the callback itself.
fn bridge_for(shared: &Shared, handle: SocketHandle) -> Option<Arc<dyn SocketBridge>> {
    let lookup = shared.lookup.lock().unwrap();
    lookup
        .sockets
        .get(&handle)
        .map(|entry| Arc::clone(&entry.bridge))
}

/// Leave the reader loop, releasing the reader slot while the lookup
/// lock is still held.
///
/// The state goes to `Inactive` before the slot is released: no
/// successor reader can start (and set its own state) until the store
/// below, so the phases stay coherent across a restart.
fn exit(shared: &Shared, lookup: MutexGuard<'_, Lookup>) {
    shared.state.set(ManagerState::Inactive);
    shared.reader_count.store(0, Ordering::Release);
    drop(lookup);
    debug!(name = %shared.config.name, "poll reader exiting");
}
