//! Protocol client collaborator
//!
//! The key-value protocol itself lives outside this workspace. Discovery and
//! connection establishment only need to issue a command on a ready client and
//! read its reply, so that is all this trait exposes.

use crate::address::NodeAddress;
use async_trait::async_trait;
use bytes::Bytes;
use std::time::Duration;
use thiserror::Error;

/// Reply to a single command
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Reply {
    Nil,
    Status(String),
    Integer(i64),
    Bulk(Bytes),
    Array(Vec<Reply>),
    Error(String),
}

impl Reply {
    pub fn bulk(text: impl Into<String>) -> Self {
        Reply::Bulk(Bytes::from(text.into()))
    }

    pub fn is_nil(&self) -> bool {
        matches!(self, Reply::Nil)
    }

    /// Textual view of scalar replies (status, bulk, integer)
    pub fn to_text(&self) -> Option<String> {
        match self {
            Reply::Status(s) => Some(s.clone()),
            Reply::Bulk(b) => std::str::from_utf8(b).ok().map(str::to_string),
            Reply::Integer(i) => Some(i.to_string()),
            _ => None,
        }
    }
}

/// Errors surfaced by the protocol client
#[derive(Debug, Error)]
pub enum ClientError {
    #[error("Failed to connect to {endpoint}: {message}")]
    Connect {
        endpoint: NodeAddress,
        message: String,
    },

    #[error("Authentication rejected by {endpoint}: {message}")]
    Auth {
        endpoint: NodeAddress,
        message: String,
    },

    #[error("Timed out after {0:?} waiting for ready")]
    Timeout(Duration),

    #[error("Command {command} failed: {message}")]
    Command { command: String, message: String },

    #[error("Connection closed")]
    Closed,

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl ClientError {
    /// Rejected credentials will not succeed on retry
    pub fn is_auth_failure(&self) -> bool {
        matches!(self, ClientError::Auth { .. })
    }
}

/// A connected, ready protocol client
#[async_trait]
pub trait KvClient: Send + Sync {
    /// Issue one command and wait for its reply
    async fn call(&self, command: &str, args: &[&str]) -> Result<Reply, ClientError>;

    /// Close the connection; calling it on a closed client is a no-op
    async fn disconnect(&self);
}
