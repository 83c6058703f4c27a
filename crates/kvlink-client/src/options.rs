//! Options handed to the protocol client

use crate::config::{ConnectionProfile, TlsMaterial, TopologyConfig};
use crate::reconnect::ReconnectSupervisor;
use async_trait::async_trait;
use kvlink_proto::{ClientError, KvClient, NatMap, NodeAddress, UnmappedNode};
use std::fmt;
use std::sync::Arc;
use std::time::Duration;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ClientMode {
    Standalone,
    /// Topology-aware client that follows redirects and refreshes its slot map
    Cluster { slots_refresh_timeout: Duration },
}

/// One client connection request.
///
/// `endpoint` is always dialable as-is: a local tunnel address, or the real
/// address when the transport is direct.
#[derive(Clone)]
pub struct ClientOptions {
    pub endpoint: NodeAddress,
    pub username: Option<String>,
    pub password: Option<String>,
    /// Database index selected after connecting
    pub db: Option<u32>,
    pub connection_name: String,
    pub read_only: bool,
    pub tls: Option<TlsMaterial>,
    pub connect_timeout: Duration,
    pub mode: ClientMode,
    /// Translation for node addresses the server reports later
    pub nat_map: Option<Arc<NatMap>>,
    pub reconnect: Option<ReconnectSupervisor>,
}

impl ClientOptions {
    /// Options for the discovery probe: standalone mode, no database
    /// selection unless the probe is the final standalone client, and the
    /// sentinel's own password for a sentinel topology. A sentinel without
    /// its own password is authenticated with the profile password.
    pub(crate) fn probe(profile: &ConnectionProfile, endpoint: NodeAddress) -> Self {
        let password = match &profile.topology {
            TopologyConfig::Sentinel {
                sentinel_password, ..
            } => sentinel_password
                .clone()
                .or_else(|| profile.auth.password.clone()),
            _ => profile.auth.password.clone(),
        };

        Self {
            endpoint,
            username: profile.auth.username.clone(),
            password,
            db: None,
            connection_name: profile.name.clone(),
            read_only: profile.read_only,
            tls: profile.tls.clone(),
            connect_timeout: profile.connect_timeout,
            mode: ClientMode::Standalone,
            nat_map: None,
            reconnect: None,
        }
    }

    /// Options for the client returned to the caller
    pub(crate) fn for_final(
        profile: &ConnectionProfile,
        endpoint: NodeAddress,
        nat_map: Option<Arc<NatMap>>,
        reconnect: ReconnectSupervisor,
    ) -> Self {
        let (password, db, mode) = match &profile.topology {
            TopologyConfig::Standalone => (
                profile.auth.password.clone(),
                profile.db,
                ClientMode::Standalone,
            ),
            // Sentinel-managed masters never select a database
            TopologyConfig::Sentinel { node_password, .. } => {
                (node_password.clone(), None, ClientMode::Standalone)
            }
            TopologyConfig::Cluster => (
                profile.auth.password.clone(),
                profile.db,
                ClientMode::Cluster {
                    slots_refresh_timeout: profile.slots_refresh_timeout,
                },
            ),
        };

        Self {
            endpoint,
            username: profile.auth.username.clone(),
            password,
            db,
            connection_name: profile.name.clone(),
            read_only: profile.read_only,
            tls: profile.tls.clone(),
            connect_timeout: profile.connect_timeout,
            mode,
            nat_map,
            reconnect: Some(reconnect),
        }
    }

    /// Address to dial for a node the server reported.
    ///
    /// With a NAT map, an unmapped node is an error: the client must
    /// rediscover rather than dial the real address around the tunnel.
    pub fn route(&self, real: &NodeAddress) -> Result<NodeAddress, UnmappedNode> {
        match &self.nat_map {
            Some(map) => map.resolve(real).cloned(),
            None => Ok(real.clone()),
        }
    }

    pub fn is_cluster(&self) -> bool {
        matches!(self.mode, ClientMode::Cluster { .. })
    }
}

impl fmt::Debug for ClientOptions {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ClientOptions")
            .field("endpoint", &self.endpoint)
            .field("username", &self.username)
            .field("password", &self.password.as_ref().map(|_| "<redacted>"))
            .field("db", &self.db)
            .field("connection_name", &self.connection_name)
            .field("read_only", &self.read_only)
            .field("tls", &self.tls)
            .field("connect_timeout", &self.connect_timeout)
            .field("mode", &self.mode)
            .field("nat_map", &self.nat_map.as_ref().map(|m| m.len()))
            .finish()
    }
}

/// Protocol client factory
#[async_trait]
pub trait ClientConnector: Send + Sync {
    /// Connect and resolve once the client reports ready, or fail on its
    /// error signal
    async fn connect(&self, options: ClientOptions) -> Result<Arc<dyn KvClient>, ClientError>;
}
