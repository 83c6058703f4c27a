//! Sentinel master lookup

use crate::error::DiscoveryError;
use kvlink_proto::{KvClient, NodeAddress, Reply};
use tracing::{debug, warn};

/// Ask a sentinel for the current master of `master_name`
pub async fn discover_sentinel_master(
    client: &dyn KvClient,
    master_name: &str,
) -> Result<NodeAddress, DiscoveryError> {
    let reply = client
        .call("SENTINEL", &["get-master-addr-by-name", master_name])
        .await?;

    let address = parse_master_reply(reply, master_name)?;
    debug!("Sentinel reports master {} at {}", master_name, address);
    Ok(address)
}

fn parse_master_reply(reply: Reply, master_name: &str) -> Result<NodeAddress, DiscoveryError> {
    let items = match reply {
        Reply::Nil => {
            warn!("Sentinel has no master named {}", master_name);
            return Err(DiscoveryError::MasterNotFound {
                master_name: master_name.to_string(),
            });
        }
        Reply::Array(items) if items.is_empty() => {
            return Err(DiscoveryError::MasterNotFound {
                master_name: master_name.to_string(),
            })
        }
        Reply::Array(items) => items,
        Reply::Error(message) => {
            return Err(DiscoveryError::Protocol(format!(
                "sentinel replied with error: {}",
                message
            )))
        }
        other => {
            return Err(DiscoveryError::Protocol(format!(
                "expected [host, port] array, got {:?}",
                other
            )))
        }
    };

    if items.len() != 2 {
        return Err(DiscoveryError::Protocol(format!(
            "expected 2-element master address, got {} elements",
            items.len()
        )));
    }

    let host = items[0]
        .to_text()
        .filter(|h| !h.is_empty())
        .ok_or_else(|| DiscoveryError::Protocol("master host is not a string".to_string()))?;
    let port = items[1]
        .to_text()
        .and_then(|p| p.parse::<u16>().ok())
        .filter(|p| *p != 0)
        .ok_or_else(|| DiscoveryError::Protocol(format!("invalid master port {:?}", items[1])))?;

    Ok(NodeAddress::new(host, port))
}
