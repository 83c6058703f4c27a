//! Tunnel errors

use crate::config::TransportConfigError;
use crate::handle::TunnelKind;
use kvlink_proto::NodeAddress;
use std::time::Duration;
use thiserror::Error;

/// Why a tunnel could not be opened
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TunnelFailure {
    /// Credentials rejected; retrying will not help
    AuthFailure,
    Timeout,
    NetworkUnreachable,
    /// Transport configuration the provisioner cannot serve
    Misconfigured,
}

#[derive(Debug, Error)]
pub enum TunnelError {
    #[error("Authentication failed for {transport} tunnel to {target}: {message}")]
    AuthFailure {
        transport: TunnelKind,
        target: NodeAddress,
        message: String,
    },

    #[error("Timed out after {after:?} opening {transport} tunnel to {target}")]
    Timeout {
        transport: TunnelKind,
        target: NodeAddress,
        after: Duration,
    },

    #[error("{transport} tunnel to {target} is unreachable: {message}")]
    NetworkUnreachable {
        transport: TunnelKind,
        target: NodeAddress,
        message: String,
    },

    #[error("Failed to bind local tunnel endpoint: {0}")]
    Bind(#[source] std::io::Error),

    #[error("Invalid transport configuration: {0}")]
    Misconfigured(#[from] TransportConfigError),

    #[error("Failed to close {transport} tunnel {local}: {message}")]
    Close {
        transport: TunnelKind,
        local: NodeAddress,
        message: String,
    },
}

impl TunnelError {
    pub fn reason(&self) -> TunnelFailure {
        match self {
            TunnelError::AuthFailure { .. } => TunnelFailure::AuthFailure,
            TunnelError::Timeout { .. } => TunnelFailure::Timeout,
            TunnelError::NetworkUnreachable { .. }
            | TunnelError::Bind(_)
            | TunnelError::Close { .. } => TunnelFailure::NetworkUnreachable,
            TunnelError::Misconfigured(_) => TunnelFailure::Misconfigured,
        }
    }

    /// Whether a caller may reasonably try the same tunnel again
    pub fn is_retryable(&self) -> bool {
        matches!(
            self.reason(),
            TunnelFailure::Timeout | TunnelFailure::NetworkUnreachable
        )
    }
}
