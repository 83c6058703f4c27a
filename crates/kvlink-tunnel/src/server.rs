//! SOCKS tunnel server
//!
//! Listens on an ephemeral loopback port and forwards every accepted
//! connection to the destination through a fresh SOCKS CONNECT.
//! Each tunnel gets its own dedicated listener.

use crate::config::{IdlePolicy, SocksTunnelConfig};
use crate::error::TunnelError;
use crate::handle::{CloseTunnel, TunnelHandle, TunnelKind};
use crate::socks::{self, SocksError};
use kvlink_proto::{NodeAddress, LOOPBACK_HOST};
use std::net::SocketAddr;
use std::sync::atomic::{AtomicU32, AtomicUsize, Ordering};
use std::sync::Arc;
use tokio::net::{TcpListener, TcpStream};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

/// Simple connection ID generator for logging
#[derive(Clone)]
struct ConnectionIdGenerator {
    next_id: Arc<AtomicU32>,
}

impl ConnectionIdGenerator {
    fn new() -> Self {
        Self {
            next_id: Arc::new(AtomicU32::new(1)),
        }
    }

    fn generate(&self) -> u32 {
        self.next_id.fetch_add(1, Ordering::SeqCst)
    }
}

/// Stops the accept loop and every in-flight splice of one tunnel
struct SocksTunnelCloser {
    shutdown: CancellationToken,
}

impl CloseTunnel for SocksTunnelCloser {
    fn close(&self) -> Result<(), TunnelError> {
        self.shutdown.cancel();
        Ok(())
    }
}

pub struct SocksTunnelServer {
    config: SocksTunnelConfig,
    proxy: NodeAddress,
    destination: NodeAddress,
    shutdown: CancellationToken,
    active: Arc<AtomicUsize>,
    id_gen: ConnectionIdGenerator,
}

impl SocksTunnelServer {
    /// Open a SOCKS tunnel to `destination`.
    ///
    /// One upstream CONNECT is dialled before the listener is bound, so an
    /// unreachable proxy or a refused destination fails here rather than as a
    /// dropped client socket later. The check stream is closed straight away;
    /// every inbound connection dials its own upstream.
    pub async fn open(
        config: SocksTunnelConfig,
        destination: NodeAddress,
    ) -> Result<TunnelHandle, TunnelError> {
        let proxy = NodeAddress::new(config.host.clone(), config.port);
        let check = dial_upstream(&config, &proxy, &destination).await?;
        drop(check);

        let listener = TcpListener::bind((LOOPBACK_HOST, 0))
            .await
            .map_err(TunnelError::Bind)?;
        let local_addr = listener.local_addr().map_err(TunnelError::Bind)?;
        let local = NodeAddress::from(local_addr);

        info!(
            "SOCKS{} tunnel listening on {} -> {} via {}",
            u8::from(config.version),
            local,
            destination,
            proxy
        );

        let shutdown = CancellationToken::new();
        let server = Self {
            config,
            proxy,
            destination: destination.clone(),
            shutdown: shutdown.clone(),
            active: Arc::new(AtomicUsize::new(0)),
            id_gen: ConnectionIdGenerator::new(),
        };
        tokio::spawn(server.run(listener, local_addr));

        Ok(TunnelHandle::new(
            TunnelKind::Socks,
            local,
            destination,
            SocksTunnelCloser { shutdown },
        ))
    }

    async fn run(self, listener: TcpListener, local_addr: SocketAddr) {
        let server = Arc::new(self);

        loop {
            tokio::select! {
                _ = server.shutdown.cancelled() => break,
                accepted = listener.accept() => match accepted {
                    Ok((inbound, peer_addr)) => {
                        let conn_id = server.id_gen.generate();
                        debug!(
                            "New connection {} from {} on SOCKS tunnel {}",
                            conn_id, peer_addr, local_addr
                        );

                        server.active.fetch_add(1, Ordering::SeqCst);
                        let server = server.clone();
                        tokio::spawn(async move {
                            if let Err(e) = server.splice(conn_id, inbound).await {
                                error!("SOCKS tunnel connection {} failed: {}", conn_id, e);
                            }
                            server.connection_closed(local_addr);
                        });
                    }
                    Err(e) => {
                        error!("Failed to accept connection on {}: {}", local_addr, e);
                    }
                }
            }
        }

        // Listener dropped here, releasing the port.
        info!("SOCKS tunnel {} -> {} closed", local_addr, server.destination);
    }

    async fn splice(
        &self,
        conn_id: u32,
        mut inbound: TcpStream,
    ) -> Result<(), TunnelError> {
        let mut upstream = dial_upstream(&self.config, &self.proxy, &self.destination).await?;
        inbound.set_nodelay(true).ok();

        tokio::select! {
            _ = self.shutdown.cancelled() => {
                debug!("Connection {} cut by tunnel shutdown", conn_id);
            }
            copied = tokio::io::copy_bidirectional(&mut inbound, &mut upstream) => match copied {
                Ok((to_remote, to_client)) => {
                    debug!(
                        conn_id = conn_id,
                        bytes_to_remote = to_remote,
                        bytes_to_client = to_client,
                        "SOCKS splice completed"
                    );
                }
                Err(e) => {
                    debug!("Connection {} ended with error: {}", conn_id, e);
                }
            }
        }

        Ok(())
    }

    fn connection_closed(&self, local_addr: SocketAddr) {
        let remaining = self.active.fetch_sub(1, Ordering::SeqCst) - 1;
        if remaining == 0 && self.config.idle_policy == IdlePolicy::CloseWhenDrained {
            debug!("Last connection on {} drained, closing tunnel", local_addr);
            self.shutdown.cancel();
        }
    }
}

/// Dial the proxy and complete CONNECT within the configured timeout
async fn dial_upstream(
    config: &SocksTunnelConfig,
    proxy: &NodeAddress,
    destination: &NodeAddress,
) -> Result<TcpStream, TunnelError> {
    let attempt = socks::connect(proxy, config.version, destination);

    match tokio::time::timeout(config.connect_timeout, attempt).await {
        Ok(Ok(stream)) => Ok(stream),
        Ok(Err(e)) => Err(map_socks_error(e, destination)),
        Err(_) => {
            warn!(
                "SOCKS CONNECT to {} via {} timed out after {:?}",
                destination, proxy, config.connect_timeout
            );
            Err(TunnelError::Timeout {
                transport: TunnelKind::Socks,
                target: destination.clone(),
                after: config.connect_timeout,
            })
        }
    }
}

fn map_socks_error(e: SocksError, destination: &NodeAddress) -> TunnelError {
    match e {
        SocksError::AuthMethodRejected => TunnelError::AuthFailure {
            transport: TunnelKind::Socks,
            target: destination.clone(),
            message: e.to_string(),
        },
        other => TunnelError::NetworkUnreachable {
            transport: TunnelKind::Socks,
            target: destination.clone(),
            message: other.to_string(),
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_connection_id_generator() {
        let gen = ConnectionIdGenerator::new();
        assert_eq!(gen.generate(), 1);
        assert_eq!(gen.generate(), 2);
    }

    #[test]
    fn test_auth_method_maps_to_auth_failure() {
        let destination = NodeAddress::new("10.0.0.1", 6379);
        let err = map_socks_error(SocksError::AuthMethodRejected, &destination);

        assert!(matches!(err, TunnelError::AuthFailure { .. }));
        assert!(!err.is_retryable());
    }

    #[test]
    fn test_refusal_maps_to_unreachable() {
        let destination = NodeAddress::new("10.0.0.1", 6379);
        let err = map_socks_error(
            SocksError::ConnectRefused("host unreachable".to_string()),
            &destination,
        );

        assert!(matches!(err, TunnelError::NetworkUnreachable { .. }));
        assert!(err.to_string().contains("host unreachable"));
    }
}
