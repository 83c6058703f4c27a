//! Tunnel provisioning
//!
//! Opens one local endpoint per destination node through the configured
//! transport:
//! - direct: no tunnel, the destination is dialled as-is
//! - SSH: local port forward through an injected [`SshForwarder`]
//! - SOCKS: a loopback listener that splices every accepted connection
//!   through a fresh SOCKS4/4a or SOCKS5 CONNECT to the destination
//!
//! Every opened tunnel is represented by a [`TunnelHandle`] owned by whoever
//! opened it. Closing a handle is idempotent and releases its local port.

pub mod config;
pub mod error;
pub mod handle;
pub mod provisioner;
pub mod server;
pub mod socks;
pub mod ssh;

pub use config::{
    IdlePolicy, SocksTunnelConfig, SocksVersion, SshCredentials, SshTunnelConfig,
    TransportConfig, TransportConfigError,
};
pub use error::{TunnelError, TunnelFailure};
pub use handle::{CloseTunnel, TunnelHandle, TunnelKind};
pub use provisioner::{TransportProvisioner, TunnelProvisioner};
pub use socks::SocksError;
pub use ssh::{ForwardedTunnel, SshError, SshForwardRequest, SshForwarder};
