//! Socket manager configuration.

use std::time::Duration;

/// Configuration for a [`SocketManager`](super::SocketManager).
///
/// The read regime is always auto-selected from the host OS and is
/// deliberately not configurable here.
#[derive(Debug, Clone)]
pub struct ManagerConfig {
    /// Prefix for thread names and diagnostics.
    pub name: String,
    /// Run manager-owned threads above normal priority.
    ///
    /// Best-effort; hosts that refuse the priority change keep normal
    /// priority and the manager proceeds.
    pub high_priority_threads: bool,
    /// TCP connect timeout.
    pub connect_timeout: Duration,
    /// Pacemaker interval for per-bridge heartbeats (sync regime).
    pub heartbeat_interval: Duration,
    /// How long the poll reader waits on an empty socket lookup
    /// before exiting (sync regime).
    pub idle_reader_timeout: Duration,
    /// Cap on concurrently running one-shot write helper threads.
    pub max_write_helpers: usize,
}

impl Default for ManagerConfig {
    fn default() -> Self {
        Self {
            name: "sockmux".to_string(),
            high_priority_threads: true,
            connect_timeout: Duration::from_secs(5),
            heartbeat_interval: Duration::from_secs(15),
            idle_reader_timeout: Duration::from_secs(20),
            max_write_helpers: std::thread::available_parallelism()
                .map(|n| n.get())
                .unwrap_or(1),
        }
    }
}

impl ManagerConfig {
    /// Set the name prefix for threads and diagnostics.
    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    /// Enable or disable above-normal thread priority.
    pub fn with_high_priority_threads(mut self, enabled: bool) -> Self {
        self.high_priority_threads = enabled;
        self
    }

    /// Set the TCP connect timeout.
    pub fn with_connect_timeout(mut self, timeout: Duration) -> Self {
        self.connect_timeout = timeout;
        self
    }

    /// Set the heartbeat pacemaker interval.
    pub fn with_heartbeat_interval(mut self, interval: Duration) -> Self {
        self.heartbeat_interval = interval;
        self
    }

    /// Set the empty-lookup wait before the poll reader exits.
    pub fn with_idle_reader_timeout(mut self, timeout: Duration) -> Self {
        self.idle_reader_timeout = timeout;
        self
    }

    /// Set the cap on concurrent write helper threads.
    ///
    /// Zero disables helpers entirely; the dedicated writer then
    /// drains every queue alone.
    pub fn with_max_write_helpers(mut self, max: usize) -> Self {
        self.max_write_helpers = max;
        self
    }
}
