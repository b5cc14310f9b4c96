//! Network module - Handles TCP/UDP communication between hosts
//!
//! Provides:
//! - Transport sessions over streams and datagrams
//! - Servers that answer one peer at a time
//! - A client that performs a single exchange

mod session;
mod server;
mod client;

pub use session::*;
pub use server::*;
pub use client::*;

use serde::{Deserialize, Serialize};
use std::fmt;
use std::net::SocketAddr;
use std::time::Duration;

use crate::protocol::{DEFAULT_PORT, GREETING};

/// Which transport carries the protocol
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum TransportKind {
    /// Connection-oriented byte stream
    #[default]
    Tcp,
    /// Connectionless datagrams
    Udp,
}

impl TransportKind {
    /// Only a stream server knows its peer before the peer speaks
    pub fn sends_greeting(self) -> bool {
        matches!(self, TransportKind::Tcp)
    }
}

impl fmt::Display for TransportKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TransportKind::Tcp => f.write_str("TCP"),
            TransportKind::Udp => f.write_str("UDP"),
        }
    }
}

/// Configuration for network operations
#[derive(Debug, Clone)]
pub struct NetworkConfig {
    /// Transport to use
    pub transport: TransportKind,
    /// Port to listen on or connect to
    pub port: u16,
    /// Address the server binds to
    pub bind_address: String,
    /// Banner the stream server sends to each new connection
    pub greeting: String,
    /// Connection timeout in milliseconds
    pub connect_timeout_ms: u64,
    /// Per-receive timeout in milliseconds (unset = wait forever)
    pub receive_timeout_ms: Option<u64>,
}

impl Default for NetworkConfig {
    fn default() -> Self {
        Self {
            transport: TransportKind::default(),
            port: DEFAULT_PORT,
            bind_address: "0.0.0.0".to_string(),
            greeting: GREETING.to_string(),
            connect_timeout_ms: 5000,
            receive_timeout_ms: None,
        }
    }
}

impl NetworkConfig {
    pub fn new(transport: TransportKind, port: u16) -> Self {
        Self {
            transport,
            port,
            ..Default::default()
        }
    }

    pub fn with_bind_address(mut self, bind_address: impl Into<String>) -> Self {
        self.bind_address = bind_address.into();
        self
    }

    pub fn with_receive_timeout(mut self, timeout_ms: Option<u64>) -> Self {
        self.receive_timeout_ms = timeout_ms;
        self
    }

    pub fn connect_timeout(&self) -> Duration {
        Duration::from_millis(self.connect_timeout_ms)
    }

    pub fn receive_timeout(&self) -> Option<Duration> {
        self.receive_timeout_ms.map(Duration::from_millis)
    }
}

/// Resolve a hostname to a socket address, preferring IPv4
pub async fn resolve_host(host: &str, port: u16) -> std::io::Result<SocketAddr> {
    use tokio::net::lookup_host;

    let addrs: Vec<SocketAddr> = lookup_host((host, port)).await?.collect();

    addrs
        .iter()
        .find(|addr| addr.is_ipv4())
        .or_else(|| addrs.first())
        .copied()
        .ok_or_else(|| {
            std::io::Error::new(
                std::io::ErrorKind::NotFound,
                format!("Could not resolve host: {}", host),
            )
        })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_resolve_ip_literal() {
        let addr = resolve_host("127.0.0.1", 5193).await.unwrap();
        assert_eq!(addr, "127.0.0.1:5193".parse().unwrap());
    }

    #[tokio::test]
    async fn test_resolve_localhost_prefers_ipv4() {
        let addr = resolve_host("localhost", 80).await.unwrap();
        assert!(addr.is_ipv4());
        assert_eq!(addr.port(), 80);
    }

    #[test]
    fn test_greeting_only_on_stream() {
        assert!(TransportKind::Tcp.sends_greeting());
        assert!(!TransportKind::Udp.sends_greeting());
    }

    #[test]
    fn test_timeouts() {
        let config = NetworkConfig::new(TransportKind::Udp, 1).with_receive_timeout(Some(250));
        assert_eq!(config.receive_timeout(), Some(Duration::from_millis(250)));
        assert_eq!(NetworkConfig::default().receive_timeout(), None);
    }
}
