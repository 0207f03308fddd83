//! Async-regime read driver.
//!
//! In the async regime the manager owns no polling thread: each
//! bridge arranges its own read chain when the manager calls
//! `start_reading`. This driver is one such chain, built on tokio
//! readiness. Heartbeats are likewise the bridge's own concern in
//! this regime.

use std::net::TcpStream;
use std::sync::Arc;

use tokio::task::JoinHandle;
use tracing::{debug, warn};

use crate::bridge::SocketBridge;
use crate::error::{Result, SockmuxError};

/// Drives a bridge's `read` callback from tokio readiness events.
///
/// The driver peeks (never consumes) to learn about inbound bytes and
/// dispatches `read` so the bridge drains its own stream, exactly as
/// it would under the sync poll reader. The task ends, after an
/// `error()` notification, when the peer closes or the socket faults;
/// dropping the driver aborts it.
pub struct AsyncReadDriver {
    task: JoinHandle<()>,
}

impl AsyncReadDriver {
    /// Spawn the read chain on the current tokio runtime.
    pub fn spawn(stream: TcpStream, bridge: Arc<dyn SocketBridge>) -> Result<Self> {
        let handle =
            tokio::runtime::Handle::try_current().map_err(|_| SockmuxError::NoRuntime)?;
        Self::spawn_on(&handle, stream, bridge)
    }

    /// Spawn the read chain on a specific tokio runtime.
    pub fn spawn_on(
        handle: &tokio::runtime::Handle,
        stream: TcpStream,
        bridge: Arc<dyn SocketBridge>,
    ) -> Result<Self> {
        stream.set_nonblocking(true)?;
        let stream = {
            let _guard = handle.enter();
            tokio::net::TcpStream::from_std(stream)?
        };

        let task = handle.spawn(async move {
            let mut probe = [0u8; 1];
            loop {
                match stream.peek(&mut probe).await {
                    Ok(0) => {
                        debug!("peer closed; async read chain ending");
                        bridge.error();
                        return;
                    }
                    Ok(_) => {
                        if let Err(error) = bridge.read() {
                            warn!(%error, "read callback failed");
                            bridge.error();
                            return;
                        }
                    }
                    Err(error) => {
                        warn!(%error, "async readiness failed");
                        bridge.error();
                        return;
                    }
                }
            }
        });
        Ok(Self { task })
    }

    /// Whether the read chain has ended.
    pub fn is_finished(&self) -> bool {
        self.task.is_finished()
    }
}

impl Drop for AsyncReadDriver {
    fn drop(&mut self) {
        self.task.abort();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_util::StreamBridge;
    use std::io::Write;
    use std::net::TcpListener;
    use std::sync::atomic::Ordering;
    use std::time::Duration;

    fn loopback_pair() -> (TcpStream, TcpStream) {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let addr = listener.local_addr().unwrap();
        let client = TcpStream::connect(addr).unwrap();
        let (server, _) = listener.accept().unwrap();
        (client, server)
    }

    async fn wait_until(deadline: Duration, mut cond: impl FnMut() -> bool) -> bool {
        let start = std::time::Instant::now();
        while start.elapsed() < deadline {
            if cond() {
                return true;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        cond()
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_driver_dispatches_reads() {
        let (client, mut server) = loopback_pair();
        let bridge = StreamBridge::new();
        assert!(bridge.connected(client.try_clone().unwrap()).unwrap());

        let driver = AsyncReadDriver::spawn(client, bridge.clone()).unwrap();

        server.write_all(b"+PONG\r\n").unwrap();
        assert!(wait_until(Duration::from_secs(3), || bridge.received() == b"+PONG\r\n").await);
        assert!(!driver.is_finished());
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_driver_reports_closed_peer() {
        let (client, server) = loopback_pair();
        let bridge = StreamBridge::new();
        assert!(bridge.connected(client.try_clone().unwrap()).unwrap());

        let driver = AsyncReadDriver::spawn(client, bridge.clone()).unwrap();
        drop(server);

        assert!(
            wait_until(Duration::from_secs(3), || {
                bridge.error_calls.load(Ordering::Relaxed) == 1
            })
            .await
        );
        assert!(wait_until(Duration::from_secs(3), || driver.is_finished()).await);
    }

    #[test]
    fn test_spawn_outside_runtime_errors() {
        let (client, _server) = loopback_pair();
        let bridge = StreamBridge::new();
        let err = AsyncReadDriver::spawn(client, bridge).unwrap_err();
        assert!(matches!(err, SockmuxError::NoRuntime));
    }
}
