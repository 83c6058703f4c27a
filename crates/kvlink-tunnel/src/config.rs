//! Transport configuration

use crate::handle::TunnelKind;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::Duration;
use thiserror::Error;

/// Transport configuration errors, detected before any socket is opened
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TransportConfigError {
    #[error("{transport} host is required")]
    MissingHost { transport: TunnelKind },

    #[error("{transport} port must be non-zero")]
    InvalidPort { transport: TunnelKind },

    #[error("SSH username is required")]
    MissingUsername,

    #[error("{transport} timeout must be non-zero")]
    ZeroTimeout { transport: TunnelKind },

    #[error("Unsupported SOCKS version {0}, expected 4 or 5")]
    UnsupportedSocksVersion(u8),

    #[error("SSH transport requested but no SSH forwarder is installed")]
    NoSshForwarder,
}

/// How a destination is reached
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum TransportConfig {
    /// Plain TCP, no tunnel
    #[default]
    Direct,
    /// Local port forward through an SSH server
    SshTunnel(SshTunnelConfig),
    /// Local listener spliced through a SOCKS proxy
    SocksTunnel(SocksTunnelConfig),
}

impl TransportConfig {
    pub fn kind(&self) -> TunnelKind {
        match self {
            TransportConfig::Direct => TunnelKind::Direct,
            TransportConfig::SshTunnel(_) => TunnelKind::Ssh,
            TransportConfig::SocksTunnel(_) => TunnelKind::Socks,
        }
    }

    pub fn is_direct(&self) -> bool {
        matches!(self, TransportConfig::Direct)
    }

    pub fn validate(&self) -> Result<(), TransportConfigError> {
        match self {
            TransportConfig::Direct => Ok(()),
            TransportConfig::SshTunnel(ssh) => ssh.validate(),
            TransportConfig::SocksTunnel(socks) => socks.validate(),
        }
    }
}

/// SSH login material, already loaded by the caller
#[derive(Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SshCredentials {
    pub username: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub password: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub private_key: Option<Vec<u8>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub passphrase: Option<String>,
}

impl SshCredentials {
    pub fn with_password(username: impl Into<String>, password: impl Into<String>) -> Self {
        Self {
            username: username.into(),
            password: Some(password.into()),
            ..Default::default()
        }
    }

    pub fn with_private_key(
        username: impl Into<String>,
        private_key: Vec<u8>,
        passphrase: Option<String>,
    ) -> Self {
        Self {
            username: username.into(),
            private_key: Some(private_key),
            passphrase,
            ..Default::default()
        }
    }
}

impl fmt::Debug for SshCredentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SshCredentials")
            .field("username", &self.username)
            .field("password", &self.password.as_ref().map(|_| "<redacted>"))
            .field(
                "private_key",
                &self.private_key.as_ref().map(|_| "<redacted>"),
            )
            .field("passphrase", &self.passphrase.as_ref().map(|_| "<redacted>"))
            .finish()
    }
}

fn default_ssh_port() -> u16 {
    22
}

fn default_ready_timeout() -> Duration {
    Duration::from_secs(30)
}

fn default_keepalive_interval() -> Duration {
    Duration::from_secs(10)
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SshTunnelConfig {
    pub host: String,
    #[serde(default = "default_ssh_port")]
    pub port: u16,
    pub credentials: SshCredentials,
    /// Upper bound on the SSH handshake, including authentication
    #[serde(
        rename = "ready_timeout_ms",
        with = "kvlink_proto::duration_ms",
        default = "default_ready_timeout"
    )]
    pub ready_timeout: Duration,
    #[serde(
        rename = "keepalive_interval_ms",
        with = "kvlink_proto::duration_ms",
        default = "default_keepalive_interval"
    )]
    pub keepalive_interval: Duration,
}

impl SshTunnelConfig {
    pub fn new(host: impl Into<String>, port: u16, credentials: SshCredentials) -> Self {
        Self {
            host: host.into(),
            port,
            credentials,
            ready_timeout: default_ready_timeout(),
            keepalive_interval: default_keepalive_interval(),
        }
    }

    pub fn with_ready_timeout(mut self, timeout: Duration) -> Self {
        self.ready_timeout = timeout;
        self
    }

    fn validate(&self) -> Result<(), TransportConfigError> {
        if self.host.trim().is_empty() {
            return Err(TransportConfigError::MissingHost {
                transport: TunnelKind::Ssh,
            });
        }
        if self.port == 0 {
            return Err(TransportConfigError::InvalidPort {
                transport: TunnelKind::Ssh,
            });
        }
        if self.credentials.username.trim().is_empty() {
            return Err(TransportConfigError::MissingUsername);
        }
        if self.ready_timeout.is_zero() {
            return Err(TransportConfigError::ZeroTimeout {
                transport: TunnelKind::Ssh,
            });
        }
        Ok(())
    }
}

/// SOCKS protocol version spoken to the proxy
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "u8", into = "u8")]
pub enum SocksVersion {
    /// SOCKS4, with the 4a extension for hostname destinations
    V4,
    V5,
}

impl TryFrom<u8> for SocksVersion {
    type Error = TransportConfigError;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        match value {
            4 => Ok(SocksVersion::V4),
            5 => Ok(SocksVersion::V5),
            other => Err(TransportConfigError::UnsupportedSocksVersion(other)),
        }
    }
}

impl From<SocksVersion> for u8 {
    fn from(version: SocksVersion) -> Self {
        match version {
            SocksVersion::V4 => 4,
            SocksVersion::V5 => 5,
        }
    }
}

/// When a SOCKS tunnel's local listener shuts itself down
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IdlePolicy {
    /// Listener lives until its handle is closed, so the client can reconnect
    #[default]
    Session,
    /// Listener closes once its last spliced connection closes
    CloseWhenDrained,
}

fn default_socks_port() -> u16 {
    1080
}

fn default_socks_version() -> SocksVersion {
    SocksVersion::V5
}

fn default_socks_timeout() -> Duration {
    Duration::from_secs(60)
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SocksTunnelConfig {
    pub host: String,
    #[serde(default = "default_socks_port")]
    pub port: u16,
    #[serde(default = "default_socks_version")]
    pub version: SocksVersion,
    /// Upper bound on connecting to the proxy and completing CONNECT
    #[serde(
        rename = "connect_timeout_ms",
        with = "kvlink_proto::duration_ms",
        default = "default_socks_timeout"
    )]
    pub connect_timeout: Duration,
    #[serde(default)]
    pub idle_policy: IdlePolicy,
}

impl SocksTunnelConfig {
    pub fn new(host: impl Into<String>, port: u16, version: SocksVersion) -> Self {
        Self {
            host: host.into(),
            port,
            version,
            connect_timeout: default_socks_timeout(),
            idle_policy: IdlePolicy::default(),
        }
    }

    pub fn with_connect_timeout(mut self, timeout: Duration) -> Self {
        self.connect_timeout = timeout;
        self
    }

    pub fn with_idle_policy(mut self, policy: IdlePolicy) -> Self {
        self.idle_policy = policy;
        self
    }

    fn validate(&self) -> Result<(), TransportConfigError> {
        if self.host.trim().is_empty() {
            return Err(TransportConfigError::MissingHost {
                transport: TunnelKind::Socks,
            });
        }
        if self.port == 0 {
            return Err(TransportConfigError::InvalidPort {
                transport: TunnelKind::Socks,
            });
        }
        if self.connect_timeout.is_zero() {
            return Err(TransportConfigError::ZeroTimeout {
                transport: TunnelKind::Socks,
            });
        }
        Ok(())
    }
}
