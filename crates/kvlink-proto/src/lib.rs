//! KvLink shared types
//!
//! This crate defines the value types passed between the tunnel, discovery and
//! client crates: node addresses, the NAT map that rewrites real node addresses
//! to local tunnel endpoints, discovered cluster nodes, and the protocol client
//! collaborator trait.

pub mod address;
pub mod client;
pub mod duration_ms;
pub mod nat;
pub mod node;

pub use address::{AddressError, NodeAddress};
pub use client::{ClientError, KvClient, Reply};
pub use nat::{build_nat_map, NatMap, TunnelRoute, UnmappedNode};
pub use node::{DiscoveredNode, NodeRole};

/// Loopback host every local tunnel endpoint binds to
pub const LOOPBACK_HOST: &str = "127.0.0.1";
