//! Tunnel provisioner: one tunnel per (transport, destination)

use crate::config::{TransportConfig, TransportConfigError};
use crate::error::TunnelError;
use crate::handle::TunnelHandle;
use crate::server::SocksTunnelServer;
use crate::ssh::{self, SshForwarder};
use async_trait::async_trait;
use kvlink_proto::NodeAddress;
use std::sync::Arc;
use tracing::debug;

#[async_trait]
pub trait TunnelProvisioner: Send + Sync {
    /// Reject transports this provisioner cannot serve, without any I/O
    fn check(&self, transport: &TransportConfig) -> Result<(), TransportConfigError> {
        transport.validate()
    }

    /// Open a tunnel to `destination`. For direct transport this returns a
    /// pass-through handle whose local address is the destination itself.
    async fn open(
        &self,
        transport: &TransportConfig,
        destination: &NodeAddress,
    ) -> Result<TunnelHandle, TunnelError>;
}

/// Provisioner backed by the built-in SOCKS tunnel server and an optional
/// external SSH forwarder
#[derive(Clone, Default)]
pub struct TransportProvisioner {
    ssh: Option<Arc<dyn SshForwarder>>,
}

impl TransportProvisioner {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_ssh_forwarder(mut self, forwarder: Arc<dyn SshForwarder>) -> Self {
        self.ssh = Some(forwarder);
        self
    }
}

#[async_trait]
impl TunnelProvisioner for TransportProvisioner {
    fn check(&self, transport: &TransportConfig) -> Result<(), TransportConfigError> {
        transport.validate()?;
        if matches!(transport, TransportConfig::SshTunnel(_)) && self.ssh.is_none() {
            return Err(TransportConfigError::NoSshForwarder);
        }
        Ok(())
    }

    async fn open(
        &self,
        transport: &TransportConfig,
        destination: &NodeAddress,
    ) -> Result<TunnelHandle, TunnelError> {
        debug!("Opening {} tunnel to {}", transport.kind(), destination);

        match transport {
            TransportConfig::Direct => Ok(TunnelHandle::passthrough(destination.clone())),
            TransportConfig::SshTunnel(config) => {
                let forwarder = self
                    .ssh
                    .as_deref()
                    .ok_or(TransportConfigError::NoSshForwarder)?;
                ssh::open_ssh_tunnel(forwarder, config, destination).await
            }
            TransportConfig::SocksTunnel(config) => {
                SocksTunnelServer::open(config.clone(), destination.clone()).await
            }
        }
    }
}
