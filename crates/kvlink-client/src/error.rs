//! Error taxonomy for connection establishment

use kvlink_discovery::DiscoveryError;
use kvlink_proto::{ClientError, NodeAddress};
use kvlink_tunnel::{TransportConfigError, TunnelError, TunnelFailure};
use serde::Serialize;
use std::fmt;
use thiserror::Error;

/// Profile problems detected before any I/O
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to parse profile: {0}")]
    Parse(#[from] serde_yaml::Error),

    #[error("Target host is empty")]
    EmptyTargetHost,

    #[error("Target port must be non-zero")]
    InvalidTargetPort,

    #[error("Sentinel topology requires a master name")]
    MissingMasterName,

    #[error("{0} must be greater than zero")]
    ZeroTimeout(&'static str),

    #[error(transparent)]
    Transport(#[from] TransportConfigError),
}

/// Whether retrying the same profile could succeed
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureClass {
    /// Bad credentials, unknown master, malformed profile. Will not self-correct.
    Configuration,
    /// Timeouts and unreachable networks
    Transient,
}

impl fmt::Display for FailureClass {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FailureClass::Configuration => write!(f, "configuration"),
            FailureClass::Transient => write!(f, "transient"),
        }
    }
}

#[derive(Debug, Error)]
pub enum ConnectError {
    #[error(transparent)]
    Configuration(#[from] ConfigError),

    #[error(transparent)]
    Tunnel(#[from] TunnelError),

    #[error(transparent)]
    Discovery(#[from] DiscoveryError),

    #[error(transparent)]
    Client(#[from] ClientError),

    #[error("exceeded maximum reconnection attempts ({attempts}) for {endpoint}")]
    RetryExhausted { endpoint: NodeAddress, attempts: u32 },
}

impl ConnectError {
    pub fn failure_class(&self) -> FailureClass {
        match self {
            ConnectError::Configuration(_) => FailureClass::Configuration,
            ConnectError::Tunnel(e) => match e.reason() {
                TunnelFailure::AuthFailure | TunnelFailure::Misconfigured => {
                    FailureClass::Configuration
                }
                TunnelFailure::Timeout | TunnelFailure::NetworkUnreachable => {
                    FailureClass::Transient
                }
            },
            ConnectError::Discovery(e) => match e {
                DiscoveryError::MasterNotFound { .. } | DiscoveryError::NoMastersFound => {
                    FailureClass::Configuration
                }
                DiscoveryError::Client(c) => client_class(c),
                DiscoveryError::Protocol(_) => FailureClass::Transient,
            },
            ConnectError::Client(c) => client_class(c),
            ConnectError::RetryExhausted { .. } => FailureClass::Transient,
        }
    }
}

fn client_class(e: &ClientError) -> FailureClass {
    if e.is_auth_failure() {
        FailureClass::Configuration
    } else {
        FailureClass::Transient
    }
}
