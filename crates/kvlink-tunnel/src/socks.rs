//! SOCKS client handshakes
//!
//! Only the CONNECT command is used, without authentication. SOCKS4 switches
//! to the 4a hostname extension when the destination is not an IPv4 literal.
//! The wire exchange itself is done by `tokio-socks`.

use crate::config::SocksVersion;
use kvlink_proto::NodeAddress;
use std::net::IpAddr;
use thiserror::Error;
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::net::TcpStream;
use tokio_socks::tcp::{Socks4Stream, Socks5Stream};
use tracing::debug;

#[derive(Debug, Error)]
pub enum SocksError {
    #[error("Failed to reach SOCKS proxy {proxy}: {source}")]
    ProxyUnreachable {
        proxy: NodeAddress,
        source: std::io::Error,
    },

    #[error("SOCKS proxy requires an authentication method we do not offer")]
    AuthMethodRejected,

    #[error("SOCKS proxy refused CONNECT: {0}")]
    ConnectRefused(String),

    #[error("Invalid SOCKS reply: {0}")]
    InvalidReply(String),

    #[error("Destination {0} cannot be expressed in this SOCKS version")]
    UnsupportedDestination(NodeAddress),

    #[error("IO error during SOCKS handshake: {0}")]
    Io(#[from] std::io::Error),
}

impl SocksError {
    fn from_handshake(e: tokio_socks::Error, destination: &NodeAddress) -> Self {
        use tokio_socks::Error as E;

        match e {
            E::Io(io) => SocksError::Io(io),
            E::NoAcceptableAuthMethods
            | E::UnknownAuthMethod
            | E::AuthorizationRequired
            | E::PasswordAuthFailure(_) => SocksError::AuthMethodRejected,
            E::InvalidTargetAddress(_) => SocksError::UnsupportedDestination(destination.clone()),
            refused @ (E::GeneralSocksServerFailure
            | E::ConnectionNotAllowedByRuleset
            | E::NetworkUnreachable
            | E::HostUnreachable
            | E::ConnectionRefused
            | E::TtlExpired
            | E::CommandNotSupported
            | E::AddressTypeNotSupported
            | E::IdentdAuthFailure
            | E::InvalidUserIdAuthFailure
            | E::UnknownError) => SocksError::ConnectRefused(refused.to_string()),
            other => SocksError::InvalidReply(other.to_string()),
        }
    }
}

/// Connect to `proxy` and ask it to CONNECT to `destination`.
///
/// On success the returned stream carries the destination's bytes.
pub async fn connect(
    proxy: &NodeAddress,
    version: SocksVersion,
    destination: &NodeAddress,
) -> Result<TcpStream, SocksError> {
    let stream = TcpStream::connect(proxy.dial_target())
        .await
        .map_err(|source| SocksError::ProxyUnreachable {
            proxy: proxy.clone(),
            source,
        })?;
    stream.set_nodelay(true).ok();

    let stream = handshake(stream, version, destination).await?;

    debug!(
        "SOCKS{} CONNECT via {} to {} established",
        u8::from(version),
        proxy,
        destination
    );

    Ok(stream)
}

/// Run the CONNECT exchange on an already-open proxy stream and hand the
/// stream back once the proxy reports success.
pub async fn handshake<S>(
    stream: S,
    version: SocksVersion,
    destination: &NodeAddress,
) -> Result<S, SocksError>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    let target = (destination.host.as_str(), destination.port);

    match version {
        SocksVersion::V5 => Socks5Stream::connect_with_socket(stream, target)
            .await
            .map(Socks5Stream::into_inner)
            .map_err(|e| SocksError::from_handshake(e, destination)),
        SocksVersion::V4 => {
            if matches!(destination.host.parse::<IpAddr>(), Ok(IpAddr::V6(_))) {
                return Err(SocksError::UnsupportedDestination(destination.clone()));
            }
            Socks4Stream::connect_with_socket(stream, target)
                .await
                .map(Socks4Stream::into_inner)
                .map_err(|e| SocksError::from_handshake(e, destination))
        }
    }
}
