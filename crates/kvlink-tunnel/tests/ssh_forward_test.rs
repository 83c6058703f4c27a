//! SSH provisioning through a fake forwarder

use async_trait::async_trait;
use kvlink_proto::NodeAddress;
use kvlink_tunnel::{
    CloseTunnel, ForwardedTunnel, SshCredentials, SshError, SshForwardRequest, SshForwarder,
    SshTunnelConfig, TransportConfig, TransportConfigError, TransportProvisioner, TunnelError,
    TunnelKind, TunnelProvisioner,
};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::net::TcpListener;

enum Behavior {
    Forward,
    RejectAuth,
    Hang,
}

struct FakeForwarder {
    behavior: Behavior,
    requests: Mutex<Vec<SshForwardRequest>>,
    closed: Arc<AtomicUsize>,
}

impl FakeForwarder {
    fn new(behavior: Behavior) -> Arc<Self> {
        Arc::new(Self {
            behavior,
            requests: Mutex::new(Vec::new()),
            closed: Arc::new(AtomicUsize::new(0)),
        })
    }
}

struct CountingCloser(Arc<AtomicUsize>);

impl CloseTunnel for CountingCloser {
    fn close(&self) -> Result<(), TunnelError> {
        self.0.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

#[async_trait]
impl SshForwarder for FakeForwarder {
    async fn forward(&self, request: SshForwardRequest) -> Result<ForwardedTunnel, SshError> {
        let bind = request.bind;
        self.requests.lock().unwrap().push(request);

        match self.behavior {
            Behavior::Forward => {
                let listener = TcpListener::bind(bind).await?;
                let local_addr = listener.local_addr()?;
                // Keep the port reserved for the lifetime of the test runtime
                tokio::spawn(async move {
                    let _listener = listener;
                    std::future::pending::<()>().await;
                });
                Ok(ForwardedTunnel {
                    local_addr,
                    closer: Box::new(CountingCloser(self.closed.clone())),
                })
            }
            Behavior::RejectAuth => Err(SshError::Authentication(
                "All configured authentication methods failed".to_string(),
            )),
            Behavior::Hang => std::future::pending().await,
        }
    }
}

fn ssh_transport(ready_timeout: Duration) -> TransportConfig {
    TransportConfig::SshTunnel(
        SshTunnelConfig::new(
            "bastion.internal",
            22,
            SshCredentials::with_password("ops", "hunter2"),
        )
        .with_ready_timeout(ready_timeout),
    )
}

#[tokio::test]
async fn test_ssh_tunnel_through_forwarder() {
    let forwarder = FakeForwarder::new(Behavior::Forward);
    let provisioner = TransportProvisioner::new().with_ssh_forwarder(forwarder.clone());
    let destination = NodeAddress::new("10.0.0.5", 6379);
    let transport = ssh_transport(Duration::from_secs(5));

    assert!(provisioner.check(&transport).is_ok());

    let handle = provisioner.open(&transport, &destination).await.unwrap();
    assert_eq!(handle.kind(), TunnelKind::Ssh);
    assert_eq!(handle.local_address().host, "127.0.0.1");
    assert_ne!(handle.local_address().port, 0);
    assert_eq!(handle.remote_target(), &destination);

    {
        let requests = forwarder.requests.lock().unwrap();
        assert_eq!(requests.len(), 1);
        assert_eq!(requests[0].server, NodeAddress::new("bastion.internal", 22));
        assert_eq!(requests[0].destination, destination);
        assert_eq!(requests[0].credentials.username, "ops");
    }

    handle.close().unwrap();
    handle.close().unwrap();
    assert_eq!(forwarder.closed.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn test_dropping_handle_closes_forward() {
    let forwarder = FakeForwarder::new(Behavior::Forward);
    let provisioner = TransportProvisioner::new().with_ssh_forwarder(forwarder.clone());

    let handle = provisioner
        .open(
            &ssh_transport(Duration::from_secs(5)),
            &NodeAddress::new("10.0.0.5", 6379),
        )
        .await
        .unwrap();
    drop(handle);

    assert_eq!(forwarder.closed.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn test_ssh_auth_failure_is_not_retryable() {
    let provisioner =
        TransportProvisioner::new().with_ssh_forwarder(FakeForwarder::new(Behavior::RejectAuth));

    let err = provisioner
        .open(
            &ssh_transport(Duration::from_secs(5)),
            &NodeAddress::new("10.0.0.5", 6379),
        )
        .await
        .unwrap_err();

    assert!(matches!(err, TunnelError::AuthFailure { .. }));
    assert!(!err.is_retryable());
}

#[tokio::test]
async fn test_ssh_ready_timeout() {
    let provisioner =
        TransportProvisioner::new().with_ssh_forwarder(FakeForwarder::new(Behavior::Hang));

    let err = provisioner
        .open(
            &ssh_transport(Duration::from_millis(50)),
            &NodeAddress::new("10.0.0.5", 6379),
        )
        .await
        .unwrap_err();

    assert!(
        matches!(err, TunnelError::Timeout { after, .. } if after == Duration::from_millis(50))
    );
    assert!(err.is_retryable());
}

#[tokio::test]
async fn test_ssh_without_forwarder_is_misconfigured() {
    let provisioner = TransportProvisioner::new();
    let transport = ssh_transport(Duration::from_secs(5));

    assert_eq!(
        provisioner.check(&transport),
        Err(TransportConfigError::NoSshForwarder)
    );

    let err = provisioner
        .open(&transport, &NodeAddress::new("10.0.0.5", 6379))
        .await
        .unwrap_err();
    assert!(matches!(
        err,
        TunnelError::Misconfigured(TransportConfigError::NoSshForwarder)
    ));
}
