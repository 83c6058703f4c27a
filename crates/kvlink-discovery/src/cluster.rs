//! Cluster node listing
//!
//! `CLUSTER NODES` replies with one record per line:
//!
//! ```text
//! <id> <ip:port@cport[,hostname]> <flags> <master> <ping-sent> <pong-recv> <config-epoch> <link-state> <slot> ...
//! ```
//!
//! Only the address and flags fields are read. Everything after them is
//! ignored, so records from servers that append extra fields still parse.

use crate::error::DiscoveryError;
use kvlink_proto::{DiscoveredNode, KvClient, NodeAddress, NodeRole, Reply};
use tracing::{debug, warn};

const ADDRESS_FIELD: usize = 1;
const FLAGS_FIELD: usize = 2;

/// Query the node list and keep the nodes whose flags match `role`.
///
/// Asking for masters and finding none is an error: a cluster client cannot
/// route a single slot without at least one master.
pub async fn discover_cluster_nodes(
    client: &dyn KvClient,
    role: NodeRole,
) -> Result<Vec<DiscoveredNode>, DiscoveryError> {
    let reply = client.call("CLUSTER", &["NODES"]).await?;

    let text = match reply {
        Reply::Error(message) => {
            return Err(DiscoveryError::Protocol(format!(
                "CLUSTER NODES failed: {}",
                message
            )))
        }
        other => other.to_text().ok_or_else(|| {
            DiscoveryError::Protocol(format!("CLUSTER NODES reply is not text: {:?}", other))
        })?,
    };

    let nodes = parse_cluster_nodes(&text, role)?;
    if nodes.is_empty() && role == NodeRole::Master {
        warn!("CLUSTER NODES listed no masters");
        return Err(DiscoveryError::NoMastersFound);
    }

    debug!("Discovered {} {} node(s)", nodes.len(), role);
    Ok(nodes)
}

/// Parse a `CLUSTER NODES` text block, keeping records whose flags field
/// contains the role token. Input order is preserved.
///
/// Matching is substring containment on the whole flags field, so
/// `myself,master` matches `master`.
pub fn parse_cluster_nodes(
    text: &str,
    role: NodeRole,
) -> Result<Vec<DiscoveredNode>, DiscoveryError> {
    let token = role.flag_token();
    let mut nodes = Vec::new();

    for (line_no, line) in text.lines().enumerate() {
        let line = line.trim_end_matches('\r');
        if line.trim().is_empty() {
            continue;
        }

        let fields: Vec<&str> = line.split_whitespace().collect();
        if fields.len() <= FLAGS_FIELD {
            return Err(DiscoveryError::Protocol(format!(
                "line {}: expected at least 3 fields, got {}",
                line_no + 1,
                fields.len()
            )));
        }

        if !fields[FLAGS_FIELD].contains(token) {
            continue;
        }

        let address = parse_node_address(fields[ADDRESS_FIELD]).map_err(|message| {
            DiscoveryError::Protocol(format!("line {}: {}", line_no + 1, message))
        })?;
        nodes.push(DiscoveredNode::new(address, role));
    }

    Ok(nodes)
}

/// Parse `host:port`, `host:port@cport` or `host:port@cport,hostname`
fn parse_node_address(field: &str) -> Result<NodeAddress, String> {
    let field = field.split(',').next().unwrap_or(field);
    let host_port = field.split('@').next().unwrap_or(field);

    host_port.parse::<NodeAddress>().map_err(|e| e.to_string())
}
