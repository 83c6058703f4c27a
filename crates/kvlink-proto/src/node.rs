//! Discovered topology nodes

use crate::address::NodeAddress;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Role of a node as reported by topology discovery
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum NodeRole {
    Master,
    Replica,
}

impl NodeRole {
    /// Token searched for in the `CLUSTER NODES` flags field
    pub fn flag_token(&self) -> &'static str {
        match self {
            NodeRole::Master => "master",
            NodeRole::Replica => "slave",
        }
    }
}

impl fmt::Display for NodeRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            NodeRole::Master => write!(f, "master"),
            NodeRole::Replica => write!(f, "replica"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DiscoveredNode {
    pub address: NodeAddress,
    pub role: NodeRole,
}

impl DiscoveredNode {
    pub fn new(address: NodeAddress, role: NodeRole) -> Self {
        Self { address, role }
    }

    pub fn master(address: NodeAddress) -> Self {
        Self::new(address, NodeRole::Master)
    }

    pub fn is_master(&self) -> bool {
        self.role == NodeRole::Master
    }
}
