//! Reconnection policy with bounded linear backoff
//!
//! Governs the client's own reconnects after it has become ready. The
//! establish handshake never retries.

use crate::error::ConnectError;
use crate::events::{ConnectionEvent, EventSink};
use kvlink_proto::NodeAddress;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::sleep;
use tracing::{debug, warn};

/// Reconnection configuration
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReconnectPolicy {
    /// Attempt number at which reconnecting stops
    pub max_attempts: u32,
    /// Backoff added per attempt
    pub step: Duration,
    /// Upper bound on a single backoff
    pub max_delay: Duration,
}

impl Default for ReconnectPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            step: Duration::from_millis(200),
            max_delay: Duration::from_millis(1000),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RetryDecision {
    RetryAfter(Duration),
    Stop,
}

impl ReconnectPolicy {
    /// `min(attempt * step, max_delay)`
    pub fn backoff(&self, attempt: u32) -> Duration {
        self.step.saturating_mul(attempt).min(self.max_delay)
    }

    /// Decide what to do before reconnect attempt `attempt` (1-based)
    pub fn next_delay(&self, attempt: u32) -> RetryDecision {
        if attempt >= self.max_attempts {
            RetryDecision::Stop
        } else {
            RetryDecision::RetryAfter(self.backoff(attempt))
        }
    }
}

/// Policy bound to one connection and its event sink.
///
/// Handed to the protocol client with the final options; the client asks it
/// before every reconnect and tears the connection down on error.
#[derive(Clone)]
pub struct ReconnectSupervisor {
    policy: ReconnectPolicy,
    events: Arc<dyn EventSink>,
    profile: String,
    endpoint: NodeAddress,
}

impl ReconnectSupervisor {
    pub fn new(
        policy: ReconnectPolicy,
        events: Arc<dyn EventSink>,
        profile: impl Into<String>,
        endpoint: NodeAddress,
    ) -> Self {
        Self {
            policy,
            events,
            profile: profile.into(),
            endpoint,
        }
    }

    pub fn policy(&self) -> &ReconnectPolicy {
        &self.policy
    }

    pub fn endpoint(&self) -> &NodeAddress {
        &self.endpoint
    }

    /// Delay before reconnect attempt `attempt`, or `RetryExhausted` once
    /// the bound is reached
    pub fn on_reconnect(&self, attempt: u32) -> Result<Duration, ConnectError> {
        match self.policy.next_delay(attempt) {
            RetryDecision::RetryAfter(delay) => {
                debug!(
                    "Reconnecting to {} in {}ms (attempt {})",
                    self.endpoint,
                    delay.as_millis(),
                    attempt
                );
                Ok(delay)
            }
            RetryDecision::Stop => {
                warn!(
                    "Giving up on {} after {} reconnection attempts",
                    self.endpoint, attempt
                );
                self.events.emit(ConnectionEvent::RetryExhausted {
                    profile: self.profile.clone(),
                    endpoint: self.endpoint.clone(),
                    attempts: attempt,
                });
                Err(ConnectError::RetryExhausted {
                    endpoint: self.endpoint.clone(),
                    attempts: attempt,
                })
            }
        }
    }
}

impl fmt::Debug for ReconnectSupervisor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ReconnectSupervisor")
            .field("policy", &self.policy)
            .field("profile", &self.profile)
            .field("endpoint", &self.endpoint)
            .finish()
    }
}

/// Attempt counter for a client's reconnect loop
pub struct ReconnectTracker {
    supervisor: ReconnectSupervisor,
    attempt: u32,
}

impl ReconnectTracker {
    pub fn new(supervisor: ReconnectSupervisor) -> Self {
        Self {
            supervisor,
            attempt: 0,
        }
    }

    /// Wait before next reconnection attempt
    pub async fn wait(&mut self) -> Result<(), ConnectError> {
        self.attempt += 1;
        let delay = self.supervisor.on_reconnect(self.attempt)?;
        sleep(delay).await;
        Ok(())
    }

    /// Reset the counter (call after a successful reconnect)
    pub fn reset(&mut self) {
        debug!("Resetting reconnection attempts");
        self.attempt = 0;
    }

    /// Get current attempt number
    pub fn attempt(&self) -> u32 {
        self.attempt
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::events::{ChannelEventSink, NullEventSink};

    fn supervisor(events: Arc<dyn EventSink>) -> ReconnectSupervisor {
        ReconnectSupervisor::new(
            ReconnectPolicy::default(),
            events,
            "orders",
            NodeAddress::new("127.0.0.1", 40001),
        )
    }

    #[test]
    fn test_backoff_is_linear_and_capped() {
        let policy = ReconnectPolicy::default();

        assert_eq!(policy.backoff(1), Duration::from_millis(200));
        assert_eq!(policy.backoff(2), Duration::from_millis(400));
        assert_eq!(policy.backoff(3), Duration::from_millis(600));
        assert_eq!(policy.backoff(5), Duration::from_millis(1000));
        assert_eq!(policy.backoff(50), Duration::from_millis(1000));
    }

    #[test]
    fn test_next_delay_stops_at_bound() {
        let policy = ReconnectPolicy::default();

        assert_eq!(
            policy.next_delay(1),
            RetryDecision::RetryAfter(Duration::from_millis(200))
        );
        assert_eq!(
            policy.next_delay(2),
            RetryDecision::RetryAfter(Duration::from_millis(400))
        );
        assert_eq!(policy.next_delay(3), RetryDecision::Stop);
        assert_eq!(policy.next_delay(4), RetryDecision::Stop);
    }

    #[test]
    fn test_wider_policy_reaches_cap() {
        let policy = ReconnectPolicy {
            max_attempts: 10,
            ..ReconnectPolicy::default()
        };

        assert_eq!(
            policy.next_delay(7),
            RetryDecision::RetryAfter(Duration::from_millis(1000))
        );
    }

    #[test]
    fn test_exhaustion_emits_event() {
        let (sink, mut rx) = ChannelEventSink::new();
        let supervisor = supervisor(Arc::new(sink));

        assert!(supervisor.on_reconnect(1).is_ok());
        assert!(rx.try_recv().is_err());

        let err = supervisor.on_reconnect(3).unwrap_err();
        assert!(matches!(err, ConnectError::RetryExhausted { attempts: 3, .. }));

        match rx.try_recv() {
            Ok(ConnectionEvent::RetryExhausted {
                profile,
                endpoint,
                attempts,
            }) => {
                assert_eq!(profile, "orders");
                assert_eq!(endpoint, NodeAddress::new("127.0.0.1", 40001));
                assert_eq!(attempts, 3);
            }
            other => panic!("expected RetryExhausted, got {:?}", other),
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_tracker_waits_then_stops() {
        let mut tracker = ReconnectTracker::new(supervisor(Arc::new(NullEventSink)));

        let started = tokio::time::Instant::now();
        tracker.wait().await.unwrap();
        tracker.wait().await.unwrap();
        assert_eq!(tracker.attempt(), 2);
        assert!(started.elapsed() >= Duration::from_millis(600));

        let result = tracker.wait().await;
        assert!(matches!(result, Err(ConnectError::RetryExhausted { .. })));
    }

    #[tokio::test(start_paused = true)]
    async fn test_tracker_reset() {
        let mut tracker = ReconnectTracker::new(supervisor(Arc::new(NullEventSink)));

        tracker.wait().await.unwrap();
        tracker.wait().await.unwrap();
        tracker.reset();

        assert_eq!(tracker.attempt(), 0);
        assert!(tracker.wait().await.is_ok());
    }
}
