//! Socket manager: regime selection, thread lifecycle, shared queues.
//!
//! The manager multiplexes many logical connections (bridges) over OS
//! sockets. It owns exactly one dedicated writer thread for its whole
//! lifetime, spawns short-lived helper threads under write bursts,
//! and (in the sync regime) runs a single poll-reader thread that
//! fans out read/error/heartbeat callbacks across every registered
//! socket.
//!
//! # Example
//!
//! ```no_run
//! use sockmux::{SocketManager, ManagerConfig};
//!
//! let manager = SocketManager::new(ManagerConfig::default().with_name("cache"));
//! // bridges are connected via manager.begin_connect(...) and serviced
//! // via manager.request_write(...)
//! assert_eq!(manager.name(), "cache");
//! manager.dispose();
//! ```

use std::collections::{HashMap, VecDeque};
use std::io;
use std::sync::atomic::{AtomicI32, AtomicU64, AtomicU8, AtomicUsize, Ordering};
use std::sync::{Arc, Condvar, Mutex};
use std::thread::JoinHandle;
use std::time::{Duration, Instant};

use tracing::debug;

use crate::bridge::SocketBridge;
use crate::token::{SocketHandle, SocketToken};

mod config;
mod connect;
#[cfg(unix)]
mod reader;
#[cfg(unix)]
mod readiness;
mod state;
mod writer;

pub use config::ManagerConfig;
pub use state::ManagerState;
use state::AtomicManagerState;

/// How the manager reads replies.
///
/// Async socket completions on Windows are delivered by dedicated I/O
/// threads; on Unix-likes they share the general worker pool, which
/// couples reply latency to unrelated workload. The sync regime
/// interposes a dedicated reader thread to break that coupling.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum Regime {
    /// Bridges arrange their own async read chains.
    Async = 0,
    /// A manager-owned poll reader drives all reads.
    Sync = 1,
    /// The manager has been disposed.
    Abort = 2,
}

impl Regime {
    /// Regime for the host platform.
    pub fn platform_default() -> Self {
        if cfg!(windows) {
            Regime::Async
        } else {
            Regime::Sync
        }
    }

    fn from_u8(value: u8) -> Self {
        match value {
            0 => Regime::Async,
            1 => Regime::Sync,
            _ => Regime::Abort,
        }
    }
}

/// Bridges awaiting write service, FIFO.
pub(crate) struct WriteQueue {
    pub(crate) queue: VecDeque<Arc<dyn SocketBridge>>,
    pub(crate) disposed: bool,
}

/// One registered socket in the sync-regime lookup.
pub(crate) struct LookupEntry {
    pub(crate) token: SocketToken,
    pub(crate) bridge: Arc<dyn SocketBridge>,
}

/// Socket lookup used by the poll reader.
pub(crate) struct Lookup {
    pub(crate) sockets: HashMap<SocketHandle, LookupEntry>,
    pub(crate) disposed: bool,
}

/// State shared between the manager handle and its worker threads.
pub(crate) struct Shared {
    pub(crate) config: ManagerConfig,
    pub(crate) regime: AtomicU8,
    pub(crate) write: Mutex<WriteQueue>,
    pub(crate) write_signal: Condvar,
    pub(crate) lookup: Mutex<Lookup>,
    pub(crate) lookup_signal: Condvar,
    pub(crate) reader_count: AtomicI32,
    pub(crate) helper_count: AtomicUsize,
    pub(crate) helpers_spawned: AtomicUsize,
    pub(crate) state: AtomicManagerState,
    pub(crate) started: Instant,
    pub(crate) last_error_ms: AtomicU64,
}

impl Shared {
    pub(crate) fn is_disposed(&self) -> bool {
        Regime::from_u8(self.regime.load(Ordering::Acquire)) == Regime::Abort
    }

    /// Record the time of a transient readiness fault.
    pub(crate) fn record_error(&self) {
        let ms = self.started.elapsed().as_millis() as u64;
        self.last_error_ms.store(ms.max(1), Ordering::Relaxed);
    }
}

/// I/O thread stacks stay small; these loops never recurse.
const WORKER_STACK_BYTES: usize = 128 * 1024;

/// Spawn a manager-owned worker thread named `"{name}:{suffix}"`.
pub(crate) fn spawn_worker<F>(
    shared: &Arc<Shared>,
    suffix: &str,
    body: F,
) -> io::Result<JoinHandle<()>>
where
    F: FnOnce(Arc<Shared>) + Send + 'static,
{
    let name = format!("{}:{}", shared.config.name, suffix);
    let high_priority = shared.config.high_priority_threads;
    let shared = Arc::clone(shared);
    std::thread::Builder::new()
        .name(name)
        .stack_size(WORKER_STACK_BYTES)
        .spawn(move || {
            if high_priority {
                raise_thread_priority();
            }
            body(shared);
        })
}

/// Raise the calling thread above normal priority.
///
/// Fails without privileges on most hosts; the loops are correct at
/// normal priority, so failures are only traced.
#[cfg(target_os = "linux")]
fn raise_thread_priority() {
    use tracing::trace;

    let tid = unsafe { libc::syscall(libc::SYS_gettid) };
    let rc = unsafe { libc::setpriority(libc::PRIO_PROCESS as _, tid as _, -1) };
    if rc != 0 {
        trace!(
            error = %io::Error::last_os_error(),
            "could not raise thread priority"
        );
    }
}

#[cfg(not(target_os = "linux"))]
fn raise_thread_priority() {}

/// Process-scoped owner of socket I/O threads and shared queues.
///
/// Created explicitly, disposed explicitly (or on drop). All owned
/// threads are background workers: they observe the disposal flag and
/// exit at their next checkpoint, and never keep the process alive.
pub struct SocketManager {
    shared: Arc<Shared>,
    writer: Mutex<Option<JoinHandle<()>>>,
}

impl SocketManager {
    /// Create a manager and start its dedicated writer thread.
    pub fn new(config: ManagerConfig) -> Self {
        let shared = Arc::new(Shared {
            config,
            regime: AtomicU8::new(Regime::platform_default() as u8),
            write: Mutex::new(WriteQueue {
                queue: VecDeque::new(),
                disposed: false,
            }),
            write_signal: Condvar::new(),
            lookup: Mutex::new(Lookup {
                sockets: HashMap::new(),
                disposed: false,
            }),
            lookup_signal: Condvar::new(),
            reader_count: AtomicI32::new(0),
            helper_count: AtomicUsize::new(0),
            helpers_spawned: AtomicUsize::new(0),
            state: AtomicManagerState::new(),
            started: Instant::now(),
            last_error_ms: AtomicU64::new(0),
        });

        let writer = spawn_worker(&shared, "Write", writer::write_all_queues)
            .expect("failed to spawn dedicated writer thread");
        debug!(
            name = %shared.config.name,
            regime = ?Regime::from_u8(shared.regime.load(Ordering::Relaxed)),
            "socket manager started"
        );

        Self {
            shared,
            writer: Mutex::new(Some(writer)),
        }
    }

    /// Create a manager with the given name and default configuration.
    pub fn with_name(name: impl Into<String>) -> Self {
        Self::new(ManagerConfig::default().with_name(name))
    }

    /// The manager's name (thread and diagnostics prefix).
    pub fn name(&self) -> &str {
        &self.shared.config.name
    }

    /// The current read regime; [`Regime::Abort`] after disposal.
    pub fn regime(&self) -> Regime {
        Regime::from_u8(self.shared.regime.load(Ordering::Acquire))
    }

    /// The poll reader's current phase.
    pub fn state(&self) -> ManagerState {
        self.shared.state.get()
    }

    /// Time since the last transient readiness fault, if any.
    pub fn last_error_age(&self) -> Option<Duration> {
        let ms = self.shared.last_error_ms.load(Ordering::Relaxed);
        if ms == 0 {
            None
        } else {
            Some(
                self.shared
                    .started
                    .elapsed()
                    .saturating_sub(Duration::from_millis(ms)),
            )
        }
    }

    /// Dispose the manager. Idempotent.
    ///
    /// Sets the disposal flag under the write-queue lock and wakes
    /// every waiting worker; threads exit at their next checkpoint
    /// rather than being interrupted mid-I/O.
    pub fn dispose(&self) {
        {
            let mut write = self.shared.write.lock().unwrap();
            if write.disposed {
                return;
            }
            write.disposed = true;
            self.shared.write_signal.notify_all();
        }
        self.shared.regime.store(Regime::Abort as u8, Ordering::Release);
        {
            let mut lookup = self.shared.lookup.lock().unwrap();
            lookup.disposed = true;
            self.shared.lookup_signal.notify_all();
        }
        debug!(name = %self.shared.config.name, "socket manager disposed");
    }

    /// Shut one socket down and forget it.
    ///
    /// Removes the handle from the poll lookup (so the reader never
    /// dispatches to a closed descriptor), then shuts the socket down
    /// in both directions. A no-op on an already-shut socket.
    pub fn shutdown(&self, token: &SocketToken) {
        let removed = {
            let mut lookup = self.shared.lookup.lock().unwrap();
            lookup.sockets.remove(&token.handle()).is_some()
        };
        if removed {
            debug!(handle = token.handle() as i64, "socket removed from lookup");
        }
        token.shutdown();
    }

    #[cfg(test)]
    pub(crate) fn write_queue_depth(&self) -> usize {
        self.shared.write.lock().unwrap().queue.len()
    }

    #[cfg(test)]
    pub(crate) fn helpers_spawned(&self) -> usize {
        self.shared.helpers_spawned.load(Ordering::Relaxed)
    }

    #[cfg(all(test, unix))]
    pub(crate) fn reader_count(&self) -> i32 {
        self.shared.reader_count.load(Ordering::Acquire)
    }

    #[cfg(all(test, unix))]
    pub(crate) fn lookup_len(&self) -> usize {
        self.shared.lookup.lock().unwrap().sockets.len()
    }

    #[cfg(test)]
    pub(crate) fn take_writer_handle(&self) -> Option<JoinHandle<()>> {
        self.writer.lock().unwrap().take()
    }
}

impl Default for SocketManager {
    fn default() -> Self {
        Self::new(ManagerConfig::default())
    }
}

impl Drop for SocketManager {
    fn drop(&mut self) {
        self.dispose();
    }
}

impl std::fmt::Debug for SocketManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SocketManager")
            .field("name", &self.shared.config.name)
            .field("regime", &self.regime())
            .field("state", &self.state())
            .finish()
    }
}
