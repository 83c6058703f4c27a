use kvlink_proto::ClientError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum DiscoveryError {
    #[error("master name \"{master_name}\" does not exist")]
    MasterNotFound { master_name: String },

    #[error("Cluster reported no master nodes")]
    NoMastersFound,

    #[error("Protocol error: {0}")]
    Protocol(String),

    #[error("Discovery query failed: {0}")]
    Client(#[from] ClientError),
}
