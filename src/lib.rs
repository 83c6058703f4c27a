//! kvlink - tunnelled connection establishment for key-value store clients
//!
//! Reach standalone, sentinel-managed or clustered servers over direct TCP,
//! SSH port forwards or SOCKS proxies. Topology and transport are chosen
//! independently in a [`ConnectionProfile`].
//!
//! # Example
//!
//! ```no_run
//! use kvlink::{ConnectionOrchestrator, ConnectionProfile, TransportProvisioner};
//! # use kvlink::ClientConnector;
//! # use std::sync::Arc;
//! # async fn run(connector: Arc<dyn ClientConnector>) -> Result<(), Box<dyn std::error::Error>> {
//! let profile = ConnectionProfile::from_yaml_str(
//!     r#"
//! name: sessions
//! target: { host: 10.0.0.1, port: 6379 }
//! transport: { type: socks_tunnel, host: proxy.internal, port: 1080 }
//! topology: { type: cluster }
//! "#,
//! )?;
//!
//! let provisioner = Arc::new(TransportProvisioner::new());
//! let orchestrator = ConnectionOrchestrator::new(provisioner, connector);
//! let connection = orchestrator.establish(&profile).await?;
//! connection.client().call("PING", &[]).await?;
//! connection.close().await;
//! # Ok(())
//! # }
//! ```

pub use kvlink_client::{
    AttemptState, AuthConfig, ChannelEventSink, ClientConnector, ClientMode, ClientOptions,
    ConfigError, ConnectError, ConnectionEvent, ConnectionOrchestrator, ConnectionProfile,
    ConnectionResult, EventSink, FailureClass, NullEventSink, ReconnectPolicy,
    ReconnectSupervisor, ReconnectTracker, RetryDecision, TlsMaterial, TopologyConfig,
    TracingEventSink,
};
pub use kvlink_discovery::{
    discover_cluster_nodes, discover_sentinel_master, parse_cluster_nodes, DiscoveryError,
};
pub use kvlink_proto::{
    build_nat_map, AddressError, ClientError, DiscoveredNode, KvClient, NatMap, NodeAddress,
    NodeRole, Reply, TunnelRoute, UnmappedNode,
};
pub use kvlink_tunnel::{
    IdlePolicy, SocksTunnelConfig, SocksVersion, SshCredentials, SshError, SshForwardRequest,
    SshForwarder, SshTunnelConfig, TransportConfig, TransportConfigError, TransportProvisioner,
    TunnelError, TunnelFailure, TunnelHandle, TunnelKind, TunnelProvisioner,
};

// Re-export for convenience
pub use kvlink_client as client;
pub use kvlink_discovery as discovery;
pub use kvlink_proto as proto;
pub use kvlink_tunnel as tunnel;
