//! Connection establishment for key-value store clients
//!
//! [`ConnectionOrchestrator::establish`] takes a [`ConnectionProfile`]
//! (target, transport, topology) and returns a ready client whose every
//! node address resolves to a local tunnel endpoint.

pub mod config;
pub mod error;
pub mod events;
pub mod options;
pub mod orchestrator;
pub mod reconnect;
pub mod result;

pub use config::{
    AuthConfig, ConnectionProfile, ConnectionProfileBuilder, TlsMaterial, TopologyConfig,
};
pub use error::{ConfigError, ConnectError, FailureClass};
pub use events::{ChannelEventSink, ConnectionEvent, EventSink, NullEventSink, TracingEventSink};
pub use options::{ClientConnector, ClientMode, ClientOptions};
pub use orchestrator::{AttemptState, ConnectionOrchestrator};
pub use reconnect::{ReconnectPolicy, ReconnectSupervisor, ReconnectTracker, RetryDecision};
pub use result::ConnectionResult;
