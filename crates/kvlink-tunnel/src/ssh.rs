//! SSH port forwarding
//!
//! The SSH session itself is provided by an external primitive implementing
//! [`SshForwarder`]. This module builds one owned request per tunnel, bounds
//! the handshake by the configured ready timeout and classifies failures.

use crate::config::{SshCredentials, SshTunnelConfig};
use crate::error::TunnelError;
use crate::handle::{CloseTunnel, TunnelHandle, TunnelKind};
use async_trait::async_trait;
use kvlink_proto::NodeAddress;
use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::time::Duration;
use thiserror::Error;
use tracing::{info, warn};

#[derive(Debug, Error)]
pub enum SshError {
    #[error("Authentication failed: {0}")]
    Authentication(String),

    #[error("Handshake timed out")]
    Timeout,

    #[error("Network error: {0}")]
    Network(#[from] std::io::Error),

    #[error("{0}")]
    Other(String),
}

/// Everything the primitive needs to open one forward.
///
/// Built fresh for every tunnel from a clone of the transport config, so a
/// primitive that mutates its input cannot affect sibling tunnels.
#[derive(Debug, Clone)]
pub struct SshForwardRequest {
    pub server: NodeAddress,
    pub credentials: SshCredentials,
    /// Local address to listen on; port 0 requests an ephemeral port
    pub bind: SocketAddr,
    pub destination: NodeAddress,
    pub keepalive_interval: Duration,
    pub ready_timeout: Duration,
}

impl SshForwardRequest {
    pub fn new(config: &SshTunnelConfig, destination: &NodeAddress) -> Self {
        Self {
            server: NodeAddress::new(config.host.clone(), config.port),
            credentials: config.credentials.clone(),
            bind: SocketAddr::new(IpAddr::V4(Ipv4Addr::LOCALHOST), 0),
            destination: destination.clone(),
            keepalive_interval: config.keepalive_interval,
            ready_timeout: config.ready_timeout,
        }
    }
}

/// A forward opened by the primitive, bound and accepting connections
pub struct ForwardedTunnel {
    pub local_addr: SocketAddr,
    pub closer: Box<dyn CloseTunnel>,
}

/// External SSH tunnel primitive
#[async_trait]
pub trait SshForwarder: Send + Sync {
    /// Establish the SSH session and start forwarding `request.bind` to
    /// `request.destination`. Must not resolve before the local address is
    /// accepting connections.
    async fn forward(&self, request: SshForwardRequest) -> Result<ForwardedTunnel, SshError>;
}

struct ForwardCloser(Box<dyn CloseTunnel>);

impl CloseTunnel for ForwardCloser {
    fn close(&self) -> Result<(), TunnelError> {
        self.0.close()
    }
}

pub(crate) async fn open_ssh_tunnel(
    forwarder: &dyn SshForwarder,
    config: &SshTunnelConfig,
    destination: &NodeAddress,
) -> Result<TunnelHandle, TunnelError> {
    let request = SshForwardRequest::new(config, destination);
    let server = request.server.clone();

    let forwarded = match tokio::time::timeout(config.ready_timeout, forwarder.forward(request)).await
    {
        Ok(Ok(forwarded)) => forwarded,
        Ok(Err(e)) => return Err(map_ssh_error(e, destination, config.ready_timeout)),
        Err(_) => {
            warn!(
                "SSH session to {} not ready after {:?}",
                server, config.ready_timeout
            );
            return Err(TunnelError::Timeout {
                transport: TunnelKind::Ssh,
                target: destination.clone(),
                after: config.ready_timeout,
            });
        }
    };

    let local = NodeAddress::from(forwarded.local_addr);
    if !forwarded.local_addr.ip().is_loopback() {
        warn!("SSH forward for {} bound to non-loopback {}", destination, local);
    }

    info!(
        "SSH tunnel listening on {} -> {} via {}",
        local, destination, server
    );

    Ok(TunnelHandle::new(
        TunnelKind::Ssh,
        local,
        destination.clone(),
        ForwardCloser(forwarded.closer),
    ))
}

fn map_ssh_error(e: SshError, destination: &NodeAddress, ready_timeout: Duration) -> TunnelError {
    match e {
        SshError::Authentication(message) => TunnelError::AuthFailure {
            transport: TunnelKind::Ssh,
            target: destination.clone(),
            message,
        },
        SshError::Timeout => TunnelError::Timeout {
            transport: TunnelKind::Ssh,
            target: destination.clone(),
            after: ready_timeout,
        },
        SshError::Network(io) => TunnelError::NetworkUnreachable {
            transport: TunnelKind::Ssh,
            target: destination.clone(),
            message: io.to_string(),
        },
        SshError::Other(message) => TunnelError::NetworkUnreachable {
            transport: TunnelKind::Ssh,
            target: destination.clone(),
            message,
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config() -> SshTunnelConfig {
        SshTunnelConfig::new(
            "bastion.example.com",
            2222,
            SshCredentials::with_password("deploy", "secret"),
        )
    }

    #[test]
    fn test_forward_request_is_owned_copy() {
        let config = config();
        let destination = NodeAddress::new("10.0.0.1", 6379);

        let mut request = SshForwardRequest::new(&config, &destination);
        request.credentials.password = None;

        assert_eq!(request.server, NodeAddress::new("bastion.example.com", 2222));
        assert_eq!(request.bind.port(), 0);
        assert!(request.bind.ip().is_loopback());
        assert_eq!(config.credentials.password.as_deref(), Some("secret"));
    }

    #[test]
    fn test_error_mapping() {
        let destination = NodeAddress::new("10.0.0.1", 6379);
        let timeout = Duration::from_secs(30);

        let auth = map_ssh_error(
            SshError::Authentication("publickey".to_string()),
            &destination,
            timeout,
        );
        assert!(matches!(auth, TunnelError::AuthFailure { .. }));

        let network = map_ssh_error(
            SshError::Network(std::io::Error::from(std::io::ErrorKind::ConnectionRefused)),
            &destination,
            timeout,
        );
        assert!(network.is_retryable());

        let timed_out = map_ssh_error(SshError::Timeout, &destination, timeout);
        assert!(matches!(timed_out, TunnelError::Timeout { after, .. } if after == timeout));
    }
}
