//! Ready connection returned by the orchestrator

use crate::orchestrator::AttemptState;
use kvlink_proto::{KvClient, NatMap};
use kvlink_tunnel::TunnelHandle;
use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tracing::{info, warn};
use uuid::Uuid;

/// A ready client together with the tunnels it dials through.
///
/// Owns its tunnels: [`close`](Self::close) disconnects the client and
/// closes every tunnel; dropping the result closes the tunnels too.
pub struct ConnectionResult {
    attempt_id: Uuid,
    client: Arc<dyn KvClient>,
    tunnels: Vec<TunnelHandle>,
    nat_map: Option<Arc<NatMap>>,
    history: Vec<AttemptState>,
    closed: AtomicBool,
}

impl ConnectionResult {
    pub(crate) fn new(
        attempt_id: Uuid,
        client: Arc<dyn KvClient>,
        tunnels: Vec<TunnelHandle>,
        nat_map: Option<Arc<NatMap>>,
        history: Vec<AttemptState>,
    ) -> Self {
        Self {
            attempt_id,
            client,
            tunnels,
            nat_map,
            history,
            closed: AtomicBool::new(false),
        }
    }

    pub fn attempt_id(&self) -> Uuid {
        self.attempt_id
    }

    pub fn client(&self) -> &Arc<dyn KvClient> {
        &self.client
    }

    pub fn tunnels(&self) -> &[TunnelHandle] {
        &self.tunnels
    }

    /// Present for sentinel and cluster topologies
    pub fn nat_map(&self) -> Option<&Arc<NatMap>> {
        self.nat_map.as_ref()
    }

    /// States the attempt went through, starting at `Idle`
    pub fn history(&self) -> &[AttemptState] {
        &self.history
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }

    /// Disconnect the client and close every tunnel. Calling it again is a
    /// no-op.
    pub async fn close(&self) {
        if self.closed.swap(true, Ordering::SeqCst) {
            return;
        }

        self.client.disconnect().await;
        for tunnel in &self.tunnels {
            if let Err(e) = tunnel.close() {
                warn!("Failed to close tunnel {}: {}", tunnel.local_address(), e);
            }
        }

        info!(
            attempt_id = %self.attempt_id,
            "Connection closed, released {} tunnel(s)",
            self.tunnels.len()
        );
    }
}

impl fmt::Debug for ConnectionResult {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ConnectionResult")
            .field("attempt_id", &self.attempt_id)
            .field("tunnels", &self.tunnels)
            .field("nat_map", &self.nat_map)
            .field("history", &self.history)
            .field("closed", &self.is_closed())
            .finish()
    }
}
