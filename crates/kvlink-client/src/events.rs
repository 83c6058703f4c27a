//! Connection lifecycle events
//!
//! The orchestrator and the reconnect supervisor report outcomes through an
//! injected [`EventSink`] instead of a process-wide bus. Sinks must not
//! block: events are emitted from inside the connection task.

use crate::error::FailureClass;
use kvlink_proto::NodeAddress;
use serde::Serialize;
use tokio::sync::mpsc;
use tracing::{error, info, warn};

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum ConnectionEvent {
    /// An establish attempt failed and all its tunnels were closed
    AttemptFailed {
        profile: String,
        class: FailureClass,
        message: String,
    },
    /// The client gave up reconnecting; the connection must be torn down
    RetryExhausted {
        profile: String,
        endpoint: NodeAddress,
        attempts: u32,
    },
    /// A connection is ready, holding `tunnels` open tunnels
    Ready { profile: String, tunnels: usize },
}

pub trait EventSink: Send + Sync {
    fn emit(&self, event: ConnectionEvent);
}

/// Writes events to the log
#[derive(Debug, Clone, Copy, Default)]
pub struct TracingEventSink;

impl EventSink for TracingEventSink {
    fn emit(&self, event: ConnectionEvent) {
        match event {
            ConnectionEvent::AttemptFailed {
                profile,
                class,
                message,
            } => {
                warn!(profile = %profile, class = %class, "Connection attempt failed: {}", message);
            }
            ConnectionEvent::RetryExhausted {
                profile,
                endpoint,
                attempts,
            } => {
                error!(
                    profile = %profile,
                    endpoint = %endpoint,
                    attempts = attempts,
                    "Exceeded maximum reconnection attempts"
                );
            }
            ConnectionEvent::Ready { profile, tunnels } => {
                info!(profile = %profile, tunnels = tunnels, "Connection ready");
            }
        }
    }
}

/// Forwards events to an unbounded channel
#[derive(Debug, Clone)]
pub struct ChannelEventSink {
    tx: mpsc::UnboundedSender<ConnectionEvent>,
}

impl ChannelEventSink {
    pub fn new() -> (Self, mpsc::UnboundedReceiver<ConnectionEvent>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self { tx }, rx)
    }
}

impl EventSink for ChannelEventSink {
    fn emit(&self, event: ConnectionEvent) {
        // Receiver gone means nobody is listening any more
        let _ = self.tx.send(event);
    }
}

/// Discards every event
#[derive(Debug, Clone, Copy, Default)]
pub struct NullEventSink;

impl EventSink for NullEventSink {
    fn emit(&self, _event: ConnectionEvent) {}
}
