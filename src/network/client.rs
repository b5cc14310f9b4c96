//! CalcNet Client
//!
//! Resolves the server, opens one session and performs exactly one exchange.

use std::net::SocketAddr;
use std::sync::Arc;
use thiserror::Error;
use tokio::net::{TcpStream, UdpSocket};

use super::session::{DatagramSession, StreamSession};
use super::{NetworkConfig, TransportKind};
use crate::console::OperatorInput;
use crate::exchange::{self, ClientOutcome, ExchangeError};

/// Client errors
#[derive(Error, Debug)]
pub enum ClientError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Could not resolve {host}: {source}")]
    Resolve {
        host: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Connection to {0} timed out")]
    Timeout(SocketAddr),

    #[error("Exchange failed: {0}")]
    Exchange(#[from] ExchangeError),
}

pub type ClientResult<T> = Result<T, ClientError>;

/// CalcNet Client
pub struct Client {
    config: NetworkConfig,
}

impl Client {
    pub fn new(config: NetworkConfig) -> Self {
        Self { config }
    }

    /// Resolve `host` on the configured port and run one exchange
    pub async fn run<I>(&self, host: &str, input: &mut I) -> ClientResult<ClientOutcome>
    where
        I: OperatorInput + ?Sized,
    {
        let addr = super::resolve_host(host, self.config.port)
            .await
            .map_err(|source| ClientError::Resolve {
                host: host.to_string(),
                source,
            })?;
        self.run_addr(addr, input).await
    }

    /// Run one exchange against an already resolved server address
    pub async fn run_addr<I>(
        &self,
        server_addr: SocketAddr,
        input: &mut I,
    ) -> ClientResult<ClientOutcome>
    where
        I: OperatorInput + ?Sized,
    {
        match self.config.transport {
            TransportKind::Tcp => self.run_stream(server_addr, input).await,
            TransportKind::Udp => self.run_datagram(server_addr, input).await,
        }
    }

    async fn run_stream<I>(&self, server_addr: SocketAddr, input: &mut I) -> ClientResult<ClientOutcome>
    where
        I: OperatorInput + ?Sized,
    {
        tracing::info!("Connecting to {}", server_addr);

        let stream = tokio::time::timeout(
            self.config.connect_timeout(),
            TcpStream::connect(server_addr),
        )
        .await
        .map_err(|_| ClientError::Timeout(server_addr))??;

        tracing::info!("Connected to {} over {}", server_addr, TransportKind::Tcp);

        let mut session = StreamSession::new(stream, server_addr)
            .with_receive_timeout(self.config.receive_timeout());

        let expect_greeting = self.config.transport.sends_greeting();
        let outcome = exchange::run_client(&mut session, input, expect_greeting).await?;

        if let Err(e) = session.shutdown().await {
            tracing::debug!("Shutdown failed: {}", e);
        }

        Ok(outcome)
    }

    async fn run_datagram<I>(
        &self,
        server_addr: SocketAddr,
        input: &mut I,
    ) -> ClientResult<ClientOutcome>
    where
        I: OperatorInput + ?Sized,
    {
        let local: SocketAddr = if server_addr.is_ipv4() {
            ([0, 0, 0, 0], 0).into()
        } else {
            ([0u16; 8], 0).into()
        };
        let socket = UdpSocket::bind(local).await?;

        tracing::info!(
            "{} client on {} ready for {}",
            TransportKind::Udp,
            socket.local_addr()?,
            server_addr
        );

        let mut session = DatagramSession::new(Arc::new(socket), server_addr)
            .with_receive_timeout(self.config.receive_timeout());

        let expect_greeting = self.config.transport.sends_greeting();
        Ok(exchange::run_client(&mut session, input, expect_greeting).await?)
    }
}
