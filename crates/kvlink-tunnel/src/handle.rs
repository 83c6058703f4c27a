//! Tunnel handles

use crate::error::TunnelError;
use kvlink_proto::{NodeAddress, TunnelRoute};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use tracing::{debug, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TunnelKind {
    Direct,
    Ssh,
    Socks,
}

impl fmt::Display for TunnelKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TunnelKind::Direct => write!(f, "direct"),
            TunnelKind::Ssh => write!(f, "SSH"),
            TunnelKind::Socks => write!(f, "SOCKS"),
        }
    }
}

/// Releases whatever keeps a tunnel's local endpoint alive
///
/// Called at most once per handle.
pub trait CloseTunnel: Send + Sync {
    fn close(&self) -> Result<(), TunnelError>;
}

/// An open tunnel, exclusively owned by whoever opened it.
///
/// Closing is idempotent: the first `close()` releases the local endpoint,
/// later calls return `Ok(())` without touching it again. A handle dropped
/// without being closed is closed on drop.
pub struct TunnelHandle {
    kind: TunnelKind,
    local: NodeAddress,
    remote: NodeAddress,
    closer: Option<Box<dyn CloseTunnel>>,
    closed: AtomicBool,
}

impl TunnelHandle {
    pub fn new(
        kind: TunnelKind,
        local: NodeAddress,
        remote: NodeAddress,
        closer: impl CloseTunnel + 'static,
    ) -> Self {
        Self {
            kind,
            local,
            remote,
            closer: Some(Box::new(closer)),
            closed: AtomicBool::new(false),
        }
    }

    /// Handle for direct transport: the local address is the destination
    pub fn passthrough(destination: NodeAddress) -> Self {
        Self {
            kind: TunnelKind::Direct,
            local: destination.clone(),
            remote: destination,
            closer: None,
            closed: AtomicBool::new(false),
        }
    }

    pub fn kind(&self) -> TunnelKind {
        self.kind
    }

    pub fn local_address(&self) -> &NodeAddress {
        &self.local
    }

    pub fn remote_target(&self) -> &NodeAddress {
        &self.remote
    }

    pub fn route(&self) -> TunnelRoute {
        TunnelRoute::new(self.remote.clone(), self.local.clone())
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }

    pub fn close(&self) -> Result<(), TunnelError> {
        if self.closed.swap(true, Ordering::SeqCst) {
            return Ok(());
        }

        debug!(
            "Closing {} tunnel {} -> {}",
            self.kind, self.local, self.remote
        );

        match &self.closer {
            Some(closer) => closer.close(),
            None => Ok(()),
        }
    }
}

impl Drop for TunnelHandle {
    fn drop(&mut self) {
        if let Err(e) = self.close() {
            warn!("Failed to close tunnel {} on drop: {}", self.local, e);
        }
    }
}

impl fmt::Debug for TunnelHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TunnelHandle")
            .field("kind", &self.kind)
            .field("local", &self.local)
            .field("remote", &self.remote)
            .field("closed", &self.is_closed())
            .finish()
    }
}
