//! Node addresses

use serde::{Deserialize, Serialize};
use std::fmt;
use std::net::SocketAddr;
use std::str::FromStr;
use thiserror::Error;

/// Address parsing errors
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum AddressError {
    #[error("Invalid address format '{0}', expected host:port")]
    MissingPort(String),

    #[error("Invalid port '{port}' in address '{address}'")]
    InvalidPort { address: String, port: String },

    #[error("Empty host in address '{0}'")]
    EmptyHost(String),
}

/// Coordinates of a node, either a real remote node or a local tunnel endpoint.
///
/// Two addresses are equal when host and port are equal; no name resolution
/// is involved, so `localhost:6379` and `127.0.0.1:6379` are distinct.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct NodeAddress {
    pub host: String,
    pub port: u16,
}

impl NodeAddress {
    pub fn new(host: impl Into<String>, port: u16) -> Self {
        Self {
            host: host.into(),
            port,
        }
    }

    /// Key used by the NAT map (`host:port`, IPv6 hosts unbracketed)
    pub fn key(&self) -> String {
        self.to_string()
    }

    /// Address suitable for `TcpStream::connect`, bracketing IPv6 literals
    pub fn dial_target(&self) -> String {
        if self.host.contains(':') && !self.host.starts_with('[') {
            format!("[{}]:{}", self.host, self.port)
        } else {
            format!("{}:{}", self.host, self.port)
        }
    }
}

impl From<SocketAddr> for NodeAddress {
    fn from(addr: SocketAddr) -> Self {
        Self::new(addr.ip().to_string(), addr.port())
    }
}

impl fmt::Display for NodeAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.host, self.port)
    }
}

impl FromStr for NodeAddress {
    type Err = AddressError;

    /// Parses `host:port`, splitting on the last colon so bare IPv6 hosts
    /// (as printed by `CLUSTER NODES`) keep their inner colons.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (host, port) = s
            .rsplit_once(':')
            .ok_or_else(|| AddressError::MissingPort(s.to_string()))?;

        let port = port.parse::<u16>().map_err(|_| AddressError::InvalidPort {
            address: s.to_string(),
            port: port.to_string(),
        })?;

        let host = host.trim_start_matches('[').trim_end_matches(']');
        if host.is_empty() {
            return Err(AddressError::EmptyHost(s.to_string()));
        }

        Ok(Self::new(host, port))
    }
}
