//! Typed network endpoint.
//!
//! An [`Endpoint`] identifies one meta or replica server by IPv4 address and
//! port. The all-zero value is the invalid sentinel: it never compares equal
//! to a real endpoint and is what an unassigned primary looks like in a
//! partition configuration.

use crate::core::error::{ClientError, ClientResult};
use serde::{Deserialize, Serialize};
use std::net::{Ipv4Addr, SocketAddr, SocketAddrV4, ToSocketAddrs};

/// A resolved IPv4 endpoint.
///
/// The address is stored numerically in host byte order; comparisons and
/// hashing operate on the `(ip, port)` pair.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize, Deserialize,
)]
pub struct Endpoint {
    /// IPv4 address in host byte order. Zero means invalid.
    pub ip: u32,
    /// TCP port. Zero means invalid.
    pub port: u16,
}

impl Endpoint {
    /// Create an endpoint from a host-order IPv4 address and port.
    pub const fn new(ip: u32, port: u16) -> Self {
        Self { ip, port }
    }

    /// The invalid sentinel endpoint.
    pub const fn invalid() -> Self {
        Self { ip: 0, port: 0 }
    }

    /// Check whether this endpoint is the invalid sentinel.
    pub const fn is_invalid(&self) -> bool {
        self.ip == 0 && self.port == 0
    }

    /// Resolve `host` synchronously and build an endpoint from the first
    /// IPv4 address it yields.
    ///
    /// Resolution happens once, here; the endpoint stores only the numeric
    /// address afterwards.
    pub fn parse(host: &str, port: u16) -> ClientResult<Self> {
        let addrs = (host, port).to_socket_addrs().map_err(|e| {
            ClientError::InvalidArgument(format!("cannot resolve {host}:{port}: {e}"))
        })?;
        for addr in addrs {
            if let SocketAddr::V4(v4) = addr {
                return Ok(Self::from(v4));
            }
        }
        Err(ClientError::InvalidArgument(format!(
            "no IPv4 address for {host}:{port}"
        )))
    }

    /// Parse a `host:port` string, resolving the host synchronously once.
    pub fn parse_host_port(s: &str) -> ClientResult<Self> {
        let (host, port) = s
            .rsplit_once(':')
            .ok_or_else(|| ClientError::InvalidArgument(format!("missing port in {s:?}")))?;
        let port: u16 = port
            .parse()
            .map_err(|_| ClientError::InvalidArgument(format!("bad port in {s:?}")))?;
        Self::parse(host, port)
    }

    /// Convert to a `SocketAddr` for connecting.
    pub fn socket_addr(&self) -> SocketAddr {
        SocketAddr::V4(SocketAddrV4::new(Ipv4Addr::from(self.ip), self.port))
    }

    /// Pack into a single u64 for atomic storage.
    pub const fn pack(&self) -> u64 {
        ((self.ip as u64) << 16) | self.port as u64
    }

    /// Inverse of [`Endpoint::pack`].
    pub const fn unpack(v: u64) -> Self {
        Self {
            ip: (v >> 16) as u32,
            port: (v & 0xffff) as u16,
        }
    }
}

impl From<SocketAddrV4> for Endpoint {
    fn from(addr: SocketAddrV4) -> Self {
        Self {
            ip: u32::from(*addr.ip()),
            port: addr.port(),
        }
    }
}

impl TryFrom<SocketAddr> for Endpoint {
    type Error = ClientError;

    fn try_from(addr: SocketAddr) -> Result<Self, Self::Error> {
        match addr {
            SocketAddr::V4(v4) => Ok(Self::from(v4)),
            SocketAddr::V6(_) => Err(ClientError::InvalidArgument(format!(
                "IPv6 address not supported: {addr}"
            ))),
        }
    }
}

impl From<Endpoint> for SocketAddr {
    fn from(ep: Endpoint) -> Self {
        ep.socket_addr()
    }
}

impl std::fmt::Display for Endpoint {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{}.{}.{}.{}:{}",
            (self.ip >> 24) & 0xff,
            (self.ip >> 16) & 0xff,
            (self.ip >> 8) & 0xff,
            self.ip & 0xff,
            self.port
        )
    }
}
