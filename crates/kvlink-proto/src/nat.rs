//! NAT map: real node address -> local tunnel endpoint
//!
//! The map is built once per discovery round and shared read-only with the
//! final client, whose topology-aware routing translates every node address
//! the server reports (`MOVED` redirects, slot refreshes) through it.

use crate::address::NodeAddress;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use thiserror::Error;

/// One completed tunnel: where it really goes and where it listens locally
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TunnelRoute {
    pub real: NodeAddress,
    pub local: NodeAddress,
}

impl TunnelRoute {
    pub fn new(real: NodeAddress, local: NodeAddress) -> Self {
        Self { real, local }
    }

    /// Route for direct transport, where the node is dialled as-is
    pub fn identity(address: NodeAddress) -> Self {
        Self {
            local: address.clone(),
            real: address,
        }
    }
}

/// A node address the final client tried to dial with no tunnel behind it
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("No tunnel is mapped for node {0}, topology must be rediscovered")]
pub struct UnmappedNode(pub NodeAddress);

/// Translation table keyed by `host:port` of the real node
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct NatMap {
    entries: BTreeMap<String, NodeAddress>,
}

/// Build a NAT map from completed tunnels.
///
/// Keyed by real address, so the result does not depend on the order in
/// which tunnels finished opening. A duplicated real address keeps the last
/// route seen.
pub fn build_nat_map<'a, I>(routes: I) -> NatMap
where
    I: IntoIterator<Item = &'a TunnelRoute>,
{
    let entries = routes
        .into_iter()
        .map(|route| (route.real.key(), route.local.clone()))
        .collect();

    NatMap { entries }
}

impl NatMap {
    pub fn translate(&self, real: &NodeAddress) -> Option<&NodeAddress> {
        self.entries.get(&real.key())
    }

    /// Strict translation: a missing entry is an error, never a fallback to
    /// the real address.
    pub fn resolve(&self, real: &NodeAddress) -> Result<&NodeAddress, UnmappedNode> {
        self.translate(real)
            .ok_or_else(|| UnmappedNode(real.clone()))
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Local endpoints in key order
    pub fn local_addresses(&self) -> impl Iterator<Item = &NodeAddress> {
        self.entries.values()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    fn route(real: &str, local_port: u16) -> TunnelRoute {
        TunnelRoute::new(
            real.parse().unwrap(),
            NodeAddress::new("127.0.0.1", local_port),
        )
    }

    #[test]
    fn test_build_nat_map() {
        let routes = vec![
            route("10.0.0.1:6379", 40001),
            route("10.0.0.2:6379", 40002),
            route("10.0.0.3:6379", 40003),
        ];

        let map = build_nat_map(&routes);

        assert_eq!(map.len(), 3);
        assert_eq!(
            map.translate(&"10.0.0.2:6379".parse().unwrap()),
            Some(&NodeAddress::new("127.0.0.1", 40002))
        );
        let locals: HashSet<_> = map.local_addresses().collect();
        assert_eq!(locals.len(), 3);
    }

    #[test]
    fn test_build_nat_map_order_independent() {
        let forward = vec![route("10.0.0.1:6379", 40001), route("10.0.0.2:6379", 40002)];
        let reversed: Vec<_> = forward.iter().rev().cloned().collect();

        assert_eq!(build_nat_map(&forward), build_nat_map(&reversed));
    }

    #[test]
    fn test_duplicate_real_address_last_write_wins() {
        let routes = vec![route("10.0.0.1:6379", 40001), route("10.0.0.1:6379", 40009)];

        let map = build_nat_map(&routes);

        assert_eq!(map.len(), 1);
        assert_eq!(
            map.translate(&"10.0.0.1:6379".parse().unwrap()),
            Some(&NodeAddress::new("127.0.0.1", 40009))
        );
    }

    #[test]
    fn test_resolve_unmapped_node() {
        let map = build_nat_map(&[route("10.0.0.1:6379", 40001)]);
        let stranger: NodeAddress = "10.0.0.9:6379".parse().unwrap();

        let err = map.resolve(&stranger).unwrap_err();
        assert_eq!(err, UnmappedNode(stranger));
        assert!(err.to_string().contains("rediscovered"));
    }

    #[test]
    fn test_identity_routes() {
        let nodes: Vec<NodeAddress> = vec![
            "10.0.0.1:6379".parse().unwrap(),
            "10.0.0.2:6380".parse().unwrap(),
        ];
        let routes: Vec<_> = nodes.iter().cloned().map(TunnelRoute::identity).collect();

        let map = build_nat_map(&routes);

        for node in &nodes {
            assert_eq!(map.resolve(node).unwrap(), node);
        }
    }

    #[test]
    fn test_serializes_as_key_map() {
        let map = build_nat_map(&[route("10.0.0.1:6379", 40001)]);
        let json = serde_json::to_value(&map).unwrap();

        assert_eq!(json["entries"]["10.0.0.1:6379"]["port"], 40001);
    }
}
