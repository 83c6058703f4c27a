//! Topology discovery over a live protocol client
//!
//! Sentinel deployments are asked for the elected master of a named group;
//! clusters are asked for their node list, which is filtered by role.

pub mod cluster;
pub mod error;
pub mod sentinel;

pub use cluster::{discover_cluster_nodes, parse_cluster_nodes};
pub use error::DiscoveryError;
pub use sentinel::discover_sentinel_master;
