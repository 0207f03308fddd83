//! Endpoint addressing for the connect path.

use std::net::{SocketAddr, ToSocketAddrs};
use std::str::FromStr;

use crate::error::{Result, SockmuxError};

/// Target endpoint for a connection.
///
/// Hostnames are resolved eagerly at connect time and the first
/// address is used to build a plain IP endpoint. Connecting through a
/// multi-address resolver iterator has historically misbehaved on
/// Unix-likes once keepalive is applied, so the connect path never
/// sees an unresolved name.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Endpoint {
    /// An already-resolved socket address.
    Addr(SocketAddr),
    /// A hostname and port, resolved at connect time.
    Host(String, u16),
}

impl Endpoint {
    /// Resolve to a concrete socket address.
    ///
    /// Failure to resolve a hostname is fatal for the connect attempt.
    pub fn resolve(&self) -> Result<SocketAddr> {
        match self {
            Endpoint::Addr(addr) => Ok(*addr),
            Endpoint::Host(host, port) => (host.as_str(), *port)
                .to_socket_addrs()
                .map_err(SockmuxError::Io)?
                .next()
                .ok_or_else(|| SockmuxError::resolve(host.clone())),
        }
    }

    /// Human-readable form for diagnostics.
    pub fn display(&self) -> String {
        match self {
            Endpoint::Addr(addr) => addr.to_string(),
            Endpoint::Host(host, port) => format!("{host}:{port}"),
        }
    }
}

impl From<SocketAddr> for Endpoint {
    fn from(addr: SocketAddr) -> Self {
        Endpoint::Addr(addr)
    }
}

impl FromStr for Endpoint {
    type Err = SockmuxError;

    /// Parse `"host:port"` or `"ip:port"`.
    fn from_str(s: &str) -> Result<Self> {
        if let Ok(addr) = s.parse::<SocketAddr>() {
            return Ok(Endpoint::Addr(addr));
        }
        let (host, port) = s.rsplit_once(':').ok_or_else(|| SockmuxError::resolve(s))?;
        let port = port.parse::<u16>().map_err(|_| SockmuxError::resolve(s))?;
        if host.is_empty() {
            return Err(SockmuxError::resolve(s));
        }
        Ok(Endpoint::Host(host.to_string(), port))
    }
}
