//! Write scheduler: dedicated writer, helper threads, queue discipline.
//!
//! Three properties hold here: each bridge occupies at most one FIFO
//! slot unless a caller forces a second (single-slot fairness); the
//! dedicated writer drains each bridge under a short budget so no
//! backlog starves the rest (bounded drain); and when the FIFO depth
//! reaches two, a one-shot helper thread absorbs the burst (elastic
//! parallelism).

use std::sync::atomic::Ordering;
use std::sync::Arc;
use std::time::Duration;

use tracing::{trace, warn};

use super::{spawn_worker, Shared, SocketManager};
use crate::bridge::{SocketBridge, WriteResult};
use crate::error::{Result, SockmuxError};

/// Budget handed to each dedicated-writer drain.
pub(crate) const WRITE_BUDGET: Duration = Duration::from_millis(200);

impl SocketManager {
    /// Ask the scheduler to service a bridge's outbound queue.
    ///
    /// The bridge's `queued` flag is claimed with a 0→1 CAS, so a
    /// bridge already enqueued (or being drained) is not enqueued
    /// again unless `forced` is set. Returns
    /// [`SockmuxError::Disposed`] once the manager is disposed.
    pub fn request_write(&self, bridge: Arc<dyn SocketBridge>, forced: bool) -> Result<()> {
        let shared = &self.shared;
        let claimed = bridge
            .queued()
            .compare_exchange(0, 1, Ordering::Acquire, Ordering::Relaxed)
            .is_ok();
        if !claimed && !forced {
            return Ok(());
        }

        let depth = {
            let mut write = shared.write.lock().unwrap();
            if write.disposed {
                if claimed {
                    bridge.queued().store(0, Ordering::Release);
                }
                return Err(SockmuxError::Disposed);
            }
            write.queue.push_back(bridge);
            write.queue.len()
        };

        if depth == 1 {
            shared.write_signal.notify_one();
        } else {
            spawn_helper(shared);
        }
        Ok(())
    }
}

/// Dedicated writer loop; runs for the manager's entire lifetime.
pub(crate) fn write_all_queues(shared: Arc<Shared>) {
    loop {
        let bridge = {
            let mut write = shared.write.lock().unwrap();
            loop {
                if let Some(bridge) = write.queue.pop_front() {
                    break bridge;
                }
                if write.disposed {
                    trace!("dedicated writer exiting");
                    return;
                }
                write = shared.write_signal.wait(write).unwrap();
            }
        };

        let result = bridge.write_queue(Some(WRITE_BUDGET));
        trace!(?result, "dedicated writer drained a bridge");
        match result {
            // Back-of-line: more work, or an empty queue whose removal
            // has not been confirmed yet, goes to the tail.
            WriteResult::MoreWork | WriteResult::QueueEmptyAfterWrite => {
                requeue(&shared, bridge);
            }
            WriteResult::NothingToDo => {
                if !bridge.confirm_remove_from_write_queue() {
                    requeue(&shared, bridge);
                }
            }
            WriteResult::CompetingWriter => {}
            WriteResult::NoConnection => {
                bridge.queued().store(0, Ordering::Release);
            }
        }
    }
}

/// One-shot helper: drain a single bridge with no budget, then exit.
pub(crate) fn write_one_queue(shared: &Shared) {
    let bridge = {
        let mut write = shared.write.lock().unwrap();
        write.queue.pop_front()
    };
    let Some(bridge) = bridge else {
        return;
    };

    loop {
        let result = bridge.write_queue(None);
        trace!(?result, "helper drained a bridge");
        match result {
            WriteResult::MoreWork | WriteResult::QueueEmptyAfterWrite => continue,
            WriteResult::NothingToDo => {
                if bridge.confirm_remove_from_write_queue() {
                    return;
                }
            }
            WriteResult::CompetingWriter => return,
            WriteResult::NoConnection => {
                bridge.queued().store(0, Ordering::Release);
                return;
            }
        }
    }
}

/// Put a bridge back at the tail of the FIFO.
///
/// Disposal is terminal: once the manager is disposed the bridge is
/// released instead, so the writer's exit is never postponed by a
/// saturated queue.
fn requeue(shared: &Arc<Shared>, bridge: Arc<dyn SocketBridge>) {
    let mut write = shared.write.lock().unwrap();
    if write.disposed {
        bridge.queued().store(0, Ordering::Release);
        return;
    }
    write.queue.push_back(bridge);
}

/// Spawn a one-shot helper thread, bounded by the configured cap.
fn spawn_helper(shared: &Arc<Shared>) {
    let cap = shared.config.max_write_helpers;
    let claimed = shared
        .helper_count
        .fetch_update(Ordering::AcqRel, Ordering::Acquire, |n| {
            (n < cap).then_some(n + 1)
        })
        .is_ok();
    if !claimed {
        // At the cap the dedicated writer alone absorbs the backlog.
        return;
    }

    shared.helpers_spawned.fetch_add(1, Ordering::Relaxed);
    let spawned = spawn_worker(shared, "WriteHelper", |shared| {
        write_one_queue(&shared);
        shared.helper_count.fetch_sub(1, Ordering::AcqRel);
    });
    if let Err(error) = spawned {
        shared.helper_count.fetch_sub(1, Ordering::AcqRel);
        warn!(%error, "could not spawn write helper");
    }
}
