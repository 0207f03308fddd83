//! Connect path: resolve, tune, connect, hand off to the read regime.

use std::net::TcpStream;
use std::sync::Arc;
use std::time::Duration;

use socket2::{SockRef, TcpKeepalive};
use tracing::{debug, trace, warn};

use super::{Regime, SocketManager};
use crate::bridge::SocketBridge;
use crate::endpoint::Endpoint;
use crate::error::{Result, SockmuxError};
use crate::token::SocketToken;

/// Keepalive idle time before the first probe.
const KEEPALIVE_TIME: Duration = Duration::from_secs(30);
/// Interval between keepalive probes.
const KEEPALIVE_INTERVAL: Duration = Duration::from_secs(1);

impl SocketManager {
    /// Connect a bridge to an endpoint and install it into the read
    /// regime.
    ///
    /// Resolves the endpoint, tunes the socket (nodelay, keepalive),
    /// connects, invokes the bridge's `connected` callback, and hands
    /// the socket to the poll reader (sync regime) or asks the bridge
    /// to start its own read chain (async regime). Connect-level
    /// failures are converted into a single `error()` notification;
    /// a bridge declining its own connection is not an error
    /// notification, the socket is simply shut down and abandoned.
    pub fn begin_connect(
        &self,
        endpoint: &Endpoint,
        bridge: Arc<dyn SocketBridge>,
    ) -> Result<SocketToken> {
        if self.shared.is_disposed() {
            bridge.error();
            return Err(SockmuxError::Disposed);
        }

        let addr = match endpoint.resolve() {
            Ok(addr) => addr,
            Err(error) => {
                warn!(endpoint = %endpoint.display(), %error, "endpoint resolution failed");
                bridge.error();
                return Err(error);
            }
        };

        let stream = match TcpStream::connect_timeout(&addr, self.shared.config.connect_timeout) {
            Ok(stream) => stream,
            Err(error) => {
                warn!(%addr, %error, "connect failed");
                bridge.error();
                return Err(error.into());
            }
        };
        tune_stream(&stream);
        let token = SocketToken::new(stream);
        debug!(%addr, handle = token.handle() as i64, "connected");

        let handed = match token.duplicate_stream() {
            Ok(stream) => stream,
            Err(error) => {
                token.shutdown();
                bridge.error();
                return Err(error.into());
            }
        };
        match bridge.connected(handed) {
            Ok(true) => {}
            Ok(false) => {
                debug!(%addr, "bridge declined the connection");
                token.shutdown();
                return Err(SockmuxError::Rejected);
            }
            Err(error) => {
                warn!(%addr, %error, "connected callback failed");
                token.shutdown();
                return Err(error);
            }
        }

        match self.regime() {
            Regime::Async => {
                if let Err(error) = bridge.start_reading() {
                    warn!(%addr, %error, "start_reading failed");
                    token.shutdown();
                    return Err(error);
                }
            }
            Regime::Sync => {
                #[cfg(unix)]
                if let Err(error) = self.add_read(token.clone(), Arc::clone(&bridge)) {
                    token.shutdown();
                    if error.is_disposed() {
                        bridge.error();
                    }
                    return Err(error);
                }
                #[cfg(not(unix))]
                {
                    // The sync regime is only ever selected on Unix
                    // hosts.
                    token.shutdown();
                    return Err(std::io::Error::from(std::io::ErrorKind::Unsupported).into());
                }
            }
            Regime::Abort => {
                // Disposal raced the connect.
                token.shutdown();
                bridge.error();
                return Err(SockmuxError::Disposed);
            }
        }

        Ok(token)
    }
}

/// Apply socket options to a freshly connected stream.
///
/// Keepalive probes every second after 30 seconds idle, and Nagle off.
/// Options the platform refuses are skipped; they are optimizations,
/// not requirements. The Windows fast-loopback ioctl would slot in
/// here; hosts without it skip it silently.
fn tune_stream(stream: &TcpStream) {
    let sock = SockRef::from(stream);
    if let Err(error) = sock.set_nodelay(true) {
        trace!(%error, "nodelay not applied");
    }
    let keepalive = TcpKeepalive::new()
        .with_time(KEEPALIVE_TIME)
        .with_interval(KEEPALIVE_INTERVAL);
    if let Err(error) = sock.set_tcp_keepalive(&keepalive) {
        trace!(%error, "keepalive not applied");
    }
}
