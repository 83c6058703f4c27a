//! Connection orchestrator
//!
//! Drives one establish attempt through
//! `Idle -> TunnelingPrimary -> DiscoveringTopology -> TunnelingFanout ->
//! Finalizing -> Ready`, or `Aborting -> Failed` on the first error.
//!
//! Every tunnel opened during an attempt is pushed into a [`TunnelSet`]
//! owned by the attempt. On success the set is handed to the
//! [`ConnectionResult`]; on failure, or if the establish future is dropped,
//! the set closes everything it holds.

use crate::config::{ConnectionProfile, TopologyConfig};
use crate::error::{ConfigError, ConnectError};
use crate::events::{ConnectionEvent, EventSink, TracingEventSink};
use crate::options::{ClientConnector, ClientOptions};
use crate::reconnect::{ReconnectPolicy, ReconnectSupervisor};
use crate::result::ConnectionResult;
use futures::future::join_all;
use kvlink_discovery::{discover_cluster_nodes, discover_sentinel_master, DiscoveryError};
use kvlink_proto::{
    build_nat_map, DiscoveredNode, KvClient, NatMap, NodeAddress, NodeRole, TunnelRoute,
};
use kvlink_tunnel::{TunnelHandle, TunnelProvisioner};
use std::collections::HashSet;
use std::fmt;
use std::sync::Arc;
use tracing::{debug, info, warn};
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum AttemptState {
    Idle,
    TunnelingPrimary,
    DiscoveringTopology,
    TunnelingFanout,
    Finalizing,
    Ready,
    Aborting,
    Failed,
}

impl AttemptState {
    pub fn is_terminal(&self) -> bool {
        matches!(self, AttemptState::Ready | AttemptState::Failed)
    }

    pub fn can_transition_to(&self, next: AttemptState) -> bool {
        use AttemptState::*;

        match (*self, next) {
            (Idle, TunnelingPrimary)
            // Direct transport has no primary tunnel
            | (Idle, DiscoveringTopology)
            | (TunnelingPrimary, DiscoveringTopology)
            | (DiscoveringTopology, TunnelingFanout)
            // Standalone reuses the probe as the final client
            | (DiscoveringTopology, Finalizing)
            | (TunnelingFanout, Finalizing)
            | (Finalizing, Ready)
            | (Aborting, Failed) => true,
            (from, Aborting) => !from.is_terminal() && from != Aborting,
            _ => false,
        }
    }
}

impl fmt::Display for AttemptState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            AttemptState::Idle => "idle",
            AttemptState::TunnelingPrimary => "tunneling_primary",
            AttemptState::DiscoveringTopology => "discovering_topology",
            AttemptState::TunnelingFanout => "tunneling_fanout",
            AttemptState::Finalizing => "finalizing",
            AttemptState::Ready => "ready",
            AttemptState::Aborting => "aborting",
            AttemptState::Failed => "failed",
        };
        write!(f, "{}", name)
    }
}

/// Tunnels opened by one attempt and not yet handed off
#[derive(Debug, Default)]
pub(crate) struct TunnelSet {
    handles: Vec<TunnelHandle>,
}

impl TunnelSet {
    pub(crate) fn push(&mut self, handle: TunnelHandle) {
        self.handles.push(handle);
    }

    pub(crate) fn len(&self) -> usize {
        self.handles.len()
    }

    /// Close every held handle. Close errors are logged; they never change
    /// the outcome of the attempt.
    pub(crate) fn close_all(&mut self) {
        for handle in self.handles.drain(..) {
            if let Err(e) = handle.close() {
                warn!("Failed to close tunnel {}: {}", handle.local_address(), e);
            }
        }
    }

    /// Transfer ownership of every handle to the caller
    pub(crate) fn hand_off(&mut self) -> Vec<TunnelHandle> {
        std::mem::take(&mut self.handles)
    }
}

impl Drop for TunnelSet {
    fn drop(&mut self) {
        if !self.handles.is_empty() {
            debug!("Closing {} tunnel(s) left by an unfinished attempt", self.handles.len());
            self.close_all();
        }
    }
}

/// Bookkeeping for one establish call
struct Attempt {
    id: Uuid,
    state: AttemptState,
    history: Vec<AttemptState>,
    tunnels: TunnelSet,
    /// Discovery client still connected, disconnected on success or abort
    probe: Option<Arc<dyn KvClient>>,
}

impl Attempt {
    fn new() -> Self {
        Self {
            id: Uuid::new_v4(),
            state: AttemptState::Idle,
            history: vec![AttemptState::Idle],
            tunnels: TunnelSet::default(),
            probe: None,
        }
    }

    fn advance(&mut self, next: AttemptState) {
        if !self.state.can_transition_to(next) {
            warn!(
                attempt_id = %self.id,
                "Unexpected attempt transition {} -> {}",
                self.state,
                next
            );
        }
        debug!(attempt_id = %self.id, from = %self.state, to = %next, "Attempt state change");
        self.state = next;
        self.history.push(next);
    }

    async fn release_probe(&mut self) {
        if let Some(probe) = self.probe.take() {
            probe.disconnect().await;
        }
    }
}

/// Final client and its routing, produced by a successful drive
struct Established {
    client: Arc<dyn KvClient>,
    nat_map: Option<Arc<NatMap>>,
}

pub struct ConnectionOrchestrator {
    provisioner: Arc<dyn TunnelProvisioner>,
    connector: Arc<dyn ClientConnector>,
    events: Arc<dyn EventSink>,
    reconnect: ReconnectPolicy,
}

impl ConnectionOrchestrator {
    pub fn new(
        provisioner: Arc<dyn TunnelProvisioner>,
        connector: Arc<dyn ClientConnector>,
    ) -> Self {
        Self {
            provisioner,
            connector,
            events: Arc::new(TracingEventSink),
            reconnect: ReconnectPolicy::default(),
        }
    }

    pub fn with_event_sink(mut self, events: Arc<dyn EventSink>) -> Self {
        self.events = events;
        self
    }

    pub fn with_reconnect_policy(mut self, policy: ReconnectPolicy) -> Self {
        self.reconnect = policy;
        self
    }

    /// Establish a ready connection for `profile`.
    ///
    /// Fails fast: nothing here is retried. On error every tunnel opened by
    /// this call is closed before returning.
    pub async fn establish(
        &self,
        profile: &ConnectionProfile,
    ) -> Result<ConnectionResult, ConnectError> {
        let profile = profile.clone();
        let mut attempt = Attempt::new();

        info!(
            attempt_id = %attempt.id,
            profile = %profile.name,
            topology = profile.topology.kind(),
            transport = %profile.transport.kind(),
            "Establishing connection to {}",
            profile.target
        );

        match self.drive(&profile, &mut attempt).await {
            Ok(established) => {
                attempt.advance(AttemptState::Ready);
                let tunnels = attempt.tunnels.hand_off();

                info!(
                    attempt_id = %attempt.id,
                    tunnels = tunnels.len(),
                    "Connection {} ready",
                    profile.name
                );
                self.events.emit(ConnectionEvent::Ready {
                    profile: profile.name.clone(),
                    tunnels: tunnels.len(),
                });

                Ok(ConnectionResult::new(
                    attempt.id,
                    established.client,
                    tunnels,
                    established.nat_map,
                    attempt.history,
                ))
            }
            Err(err) => {
                self.abort(&profile, &mut attempt, &err).await;
                Err(err)
            }
        }
    }

    async fn drive(
        &self,
        profile: &ConnectionProfile,
        attempt: &mut Attempt,
    ) -> Result<Established, ConnectError> {
        profile.validate()?;
        self.provisioner
            .check(&profile.transport)
            .map_err(ConfigError::from)?;

        let direct = profile.transport.is_direct();

        // Primary tunnel
        let probe_endpoint = if direct {
            attempt.advance(AttemptState::DiscoveringTopology);
            profile.target.clone()
        } else {
            attempt.advance(AttemptState::TunnelingPrimary);
            let handle = self
                .provisioner
                .open(&profile.transport, &profile.target)
                .await?;
            let local = handle.local_address().clone();
            attempt.tunnels.push(handle);
            attempt.advance(AttemptState::DiscoveringTopology);
            local
        };

        // Discovery
        let nodes = match &profile.topology {
            TopologyConfig::Standalone => {
                let options = ClientOptions::for_final(
                    profile,
                    probe_endpoint.clone(),
                    None,
                    self.supervisor(profile, &probe_endpoint),
                );
                let client = self.connector.connect(options).await?;
                attempt.advance(AttemptState::Finalizing);
                return Ok(Established {
                    client,
                    nat_map: None,
                });
            }
            TopologyConfig::Sentinel { master_name, .. } => {
                let probe = self.connect_probe(profile, probe_endpoint, attempt).await?;
                let master = discover_sentinel_master(probe.as_ref(), master_name).await?;
                vec![DiscoveredNode::master(master)]
            }
            TopologyConfig::Cluster => {
                let probe = self.connect_probe(profile, probe_endpoint, attempt).await?;
                dedup_nodes(discover_cluster_nodes(probe.as_ref(), NodeRole::Master).await?)
            }
        };
        attempt.release_probe().await;

        debug!(
            attempt_id = %attempt.id,
            "Discovered {} node(s): {}",
            nodes.len(),
            nodes
                .iter()
                .map(|n| n.address.to_string())
                .collect::<Vec<_>>()
                .join(", ")
        );

        // Fan-out
        attempt.advance(AttemptState::TunnelingFanout);
        let routes = if direct {
            nodes
                .iter()
                .map(|node| TunnelRoute::identity(node.address.clone()))
                .collect()
        } else {
            self.fan_out(profile, &nodes, attempt).await?
        };

        // Finalize against the first node in discovery order
        attempt.advance(AttemptState::Finalizing);
        let nat_map = Arc::new(build_nat_map(&routes));
        let endpoint = match routes.first() {
            Some(route) => route.local.clone(),
            None => return Err(DiscoveryError::NoMastersFound.into()),
        };

        let options = ClientOptions::for_final(
            profile,
            endpoint.clone(),
            Some(nat_map.clone()),
            self.supervisor(profile, &endpoint),
        );
        let client = self.connector.connect(options).await?;

        Ok(Established {
            client,
            nat_map: Some(nat_map),
        })
    }

    async fn connect_probe(
        &self,
        profile: &ConnectionProfile,
        endpoint: NodeAddress,
        attempt: &mut Attempt,
    ) -> Result<Arc<dyn KvClient>, ConnectError> {
        debug!(attempt_id = %attempt.id, "Connecting discovery probe to {}", endpoint);
        let client = self
            .connector
            .connect(ClientOptions::probe(profile, endpoint))
            .await?;
        attempt.probe = Some(client.clone());
        Ok(client)
    }

    /// Open one tunnel per node concurrently on this task.
    ///
    /// Waits for every open to settle so each successful handle lands in the
    /// attempt's tunnel set, then reports the first failure in discovery
    /// order.
    async fn fan_out(
        &self,
        profile: &ConnectionProfile,
        nodes: &[DiscoveredNode],
        attempt: &mut Attempt,
    ) -> Result<Vec<TunnelRoute>, ConnectError> {
        let opens = nodes
            .iter()
            .map(|node| self.provisioner.open(&profile.transport, &node.address));
        let results = join_all(opens).await;

        let mut routes = Vec::with_capacity(nodes.len());
        let mut first_error = None;

        for (node, result) in nodes.iter().zip(results) {
            match result {
                Ok(handle) => {
                    routes.push(handle.route());
                    attempt.tunnels.push(handle);
                }
                Err(e) => {
                    warn!(
                        attempt_id = %attempt.id,
                        "Tunnel to {} failed during fan-out: {}",
                        node.address,
                        e
                    );
                    if first_error.is_none() {
                        first_error = Some(e);
                    }
                }
            }
        }

        match first_error {
            Some(e) => Err(e.into()),
            None => {
                debug!(
                    attempt_id = %attempt.id,
                    "Fan-out opened {} tunnel(s), {} held by attempt",
                    routes.len(),
                    attempt.tunnels.len()
                );
                Ok(routes)
            }
        }
    }

    async fn abort(&self, profile: &ConnectionProfile, attempt: &mut Attempt, err: &ConnectError) {
        attempt.advance(AttemptState::Aborting);
        attempt.release_probe().await;

        let opened = attempt.tunnels.len();
        attempt.tunnels.close_all();
        attempt.advance(AttemptState::Failed);

        let class = err.failure_class();
        warn!(
            attempt_id = %attempt.id,
            closed_tunnels = opened,
            class = %class,
            "Connection {} failed: {}",
            profile.name,
            err
        );
        self.events.emit(ConnectionEvent::AttemptFailed {
            profile: profile.name.clone(),
            class,
            message: err.to_string(),
        });
    }

    fn supervisor(&self, profile: &ConnectionProfile, endpoint: &NodeAddress) -> ReconnectSupervisor {
        ReconnectSupervisor::new(
            self.reconnect,
            self.events.clone(),
            profile.name.clone(),
            endpoint.clone(),
        )
    }
}

/// Drop repeated addresses, keeping the first occurrence
fn dedup_nodes(nodes: Vec<DiscoveredNode>) -> Vec<DiscoveredNode> {
    let mut seen = HashSet::new();
    nodes
        .into_iter()
        .filter(|node| seen.insert(node.address.clone()))
        .collect()
}
