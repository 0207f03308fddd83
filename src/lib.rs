//! Connection I/O core for single-server, command/reply TCP clients.
//!
//! This crate multiplexes many logical connections over OS sockets:
//! it pumps outbound command batches from per-connection queues onto
//! the wire and drains inbound replies without starving any
//! connection under load. It does not parse protocol bytes and does
//! not decide retry semantics; framing and command pipelines live in
//! the *bridge* implementations layered on top.
//!
//! # Architecture
//!
//! - [`SocketManager`] owns the threads: one dedicated writer for its
//!   whole lifetime, short-lived write helpers under burst load, and
//!   (sync regime) a single poll reader fanning out read, error, and
//!   heartbeat callbacks.
//! - [`SocketBridge`] is the contract a logical connection implements:
//!   lifecycle callbacks consumed by the manager, plus the write-queue
//!   drain/confirm-remove handshake driven by the scheduler.
//! - [`SocketToken`] is the value handle for one OS socket, keyed into
//!   the sync-regime lookup by its raw handle.
//! - The read [`Regime`] is auto-selected from the host OS: platforms
//!   whose async completions run on dedicated I/O threads use the
//!   async regime; elsewhere dedicated reader threads keep reply
//!   latency decoupled from the process's worker pool.
//!
//! # Example
//!
//! ```no_run
//! use sockmux::{Endpoint, ManagerConfig, SocketManager};
//! use std::sync::Arc;
//!
//! # fn bridge() -> Arc<dyn sockmux::SocketBridge> { unimplemented!() }
//! let manager = SocketManager::new(
//!     ManagerConfig::default().with_name("cache"),
//! );
//!
//! // A bridge implements sockmux::SocketBridge over one connection.
//! let bridge = bridge();
//! let endpoint: Endpoint = "localhost:6379".parse().unwrap();
//! let token = manager.begin_connect(&endpoint, bridge.clone()).unwrap();
//!
//! // Whenever the bridge queues outbound work, ask for service:
//! manager.request_write(bridge, false).unwrap();
//!
//! manager.shutdown(&token);
//! manager.dispose();
//! ```

pub mod bridge;
pub mod endpoint;
pub mod error;
pub mod manager;
pub mod token;

// Async-regime support (requires the tokio feature)
#[cfg(feature = "tokio")]
pub mod reader_async;

#[cfg(test)]
pub(crate) mod test_util;

// Re-export commonly used types at the crate root
pub use bridge::{SocketBridge, WriteResult};
pub use endpoint::Endpoint;
pub use error::{Result, SockmuxError};
pub use manager::{ManagerConfig, ManagerState, Regime, SocketManager};
pub use token::{SocketHandle, SocketToken};

#[cfg(feature = "tokio")]
pub use reader_async::AsyncReadDriver;
