//! Transport seams.
//!
//! The connection only needs an async byte stream. How that stream is made
//! ([`Connector`]) and how a seed host expands into concrete addresses
//! ([`Resolver`]) are injected so tests can swap in in-process servers.

use std::fmt;
use std::io;

use async_trait::async_trait;
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::net::TcpStream;

use crate::driver::driver::ServerAddress;

/// A byte stream a connection can run on.
pub trait Transport: AsyncRead + AsyncWrite + Send + Unpin {}

impl<T: AsyncRead + AsyncWrite + Send + Unpin> Transport for T {}

/// Owned transport handed to a connection.
pub type BoxedTransport = Box<dyn Transport>;

/// Opens transports to server addresses.
#[async_trait]
pub trait Connector: Send + Sync + fmt::Debug {
    /// Open a byte stream to `address`.
    async fn connect(&self, address: &ServerAddress) -> io::Result<BoxedTransport>;
}

/// Plain TCP with `TCP_NODELAY`.
#[derive(Debug, Clone, Copy, Default)]
pub struct TcpConnector;

#[async_trait]
impl Connector for TcpConnector {
    async fn connect(&self, address: &ServerAddress) -> io::Result<BoxedTransport> {
        let stream = TcpStream::connect((address.host.as_str(), address.port)).await?;
        stream.set_nodelay(true)?;
        Ok(Box::new(stream))
    }
}

/// Expands a seed address into the addresses to try.
#[async_trait]
pub trait Resolver: Send + Sync + fmt::Debug {
    /// Resolve `address`; an empty result means nothing to try.
    async fn resolve(&self, address: &ServerAddress) -> io::Result<Vec<ServerAddress>>;
}

/// DNS lookup through the tokio resolver.
#[derive(Debug, Clone, Copy, Default)]
pub struct DnsResolver;

#[async_trait]
impl Resolver for DnsResolver {
    async fn resolve(&self, address: &ServerAddress) -> io::Result<Vec<ServerAddress>> {
        let mut resolved: Vec<ServerAddress> = Vec::new();
        for addr in tokio::net::lookup_host((address.host.as_str(), address.port)).await? {
            let candidate = ServerAddress::new(addr.ip().to_string(), addr.port());
            if !resolved.contains(&candidate) {
                resolved.push(candidate);
            }
        }
        Ok(resolved)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_dns_resolver_literal_ip() {
        let resolved = DnsResolver
            .resolve(&ServerAddress::new("127.0.0.1", 7687))
            .await
            .unwrap();
        assert_eq!(resolved, vec![ServerAddress::new("127.0.0.1", 7687)]);
    }

    #[tokio::test]
    async fn test_tcp_connector_refused() {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();
        drop(listener);

        let result = TcpConnector.connect(&ServerAddress::new("127.0.0.1", port)).await;
        assert!(result.is_err());
    }
}
