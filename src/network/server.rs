//! CalcNet Servers
//!
//! Both servers handle exactly one exchange at a time, end to end, before
//! waiting for the next peer. A failed exchange is logged and dropped; it
//! never stops the server.

use bytes::Bytes;
use std::net::SocketAddr;
use std::sync::Arc;
use thiserror::Error;
use tokio::net::{TcpListener, UdpSocket};

use super::session::{Backlog, DatagramSession, StreamSession, TransportSession};
use super::NetworkConfig;
use crate::exchange::{self, ExchangeResult, ExchangeSummary};
use crate::protocol::MAX_MESSAGE_SIZE;

/// Server errors
#[derive(Error, Debug)]
pub enum ServerError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Bind failed: {0}")]
    BindFailed(String),
}

pub type ServerResult<T> = Result<T, ServerError>;

fn log_outcome(peer: SocketAddr, outcome: &ExchangeResult<ExchangeSummary>) {
    match outcome {
        Ok(ExchangeSummary {
            peer,
            command: Some(command),
            token: Some(token),
            operands: Some(operands),
            result: Some(result),
        }) => {
            tracing::info!(
                "{}: {} {} ({}, {}) = {}",
                peer,
                command,
                token,
                operands.first,
                operands.second,
                result
            );
        }
        Ok(summary) => {
            tracing::info!(
                "{}: exchange ended with {}",
                summary.peer,
                summary.token.map(|t| t.as_str()).unwrap_or("no token")
            );
        }
        Err(e) => tracing::error!("Exchange with {} failed: {}", peer, e),
    }
}

/// Server over TCP: one connection, one exchange
pub struct StreamServer {
    config: NetworkConfig,
    listener: TcpListener,
}

impl StreamServer {
    /// Bind the listening socket
    pub async fn bind(config: NetworkConfig) -> ServerResult<Self> {
        let bind_addr = (config.bind_address.as_str(), config.port);
        let listener = TcpListener::bind(bind_addr).await.map_err(|e| {
            ServerError::BindFailed(format!(
                "Failed to bind to {}:{}: {}",
                config.bind_address, config.port, e
            ))
        })?;

        tracing::info!("TCP server listening on {}", listener.local_addr()?);

        Ok(Self { config, listener })
    }

    pub fn local_addr(&self) -> ServerResult<SocketAddr> {
        Ok(self.listener.local_addr()?)
    }

    /// Accept one connection and run its exchange to completion.
    ///
    /// The outer error is an accept failure; the inner result is the exchange.
    pub async fn serve_next(&self) -> ServerResult<ExchangeResult<ExchangeSummary>> {
        let (stream, addr) = self.listener.accept().await?;
        tracing::info!("Connection accepted from {}", addr);

        let mut session =
            StreamSession::new(stream, addr).with_receive_timeout(self.config.receive_timeout());

        let outcome = exchange::serve(&mut session, Some(self.config.greeting.as_str())).await;

        let stats = session.stats();
        tracing::debug!(
            "Closing {}: {} bytes in, {} bytes out, {} bytes unread",
            addr,
            stats.bytes_received,
            stats.bytes_sent,
            session.buffered()
        );
        if let Err(e) = session.shutdown().await {
            tracing::debug!("Shutdown of {} failed: {}", addr, e);
        }

        log_outcome(addr, &outcome);
        Ok(outcome)
    }

    /// Serve connections forever
    pub async fn run(&self) {
        loop {
            if let Err(e) = self.serve_next().await {
                tracing::error!("Accept error: {}", e);
            }
        }
    }
}

/// Server over UDP: one bound socket shared by all peers in turn.
///
/// Datagrams from other peers that arrive mid-exchange wait in the backlog
/// and are served, in arrival order, before the socket is read again.
pub struct DatagramServer {
    config: NetworkConfig,
    socket: Arc<UdpSocket>,
    backlog: Backlog,
}

impl DatagramServer {
    /// Bind the receiving socket
    pub async fn bind(config: NetworkConfig) -> ServerResult<Self> {
        let bind_addr = (config.bind_address.as_str(), config.port);
        let socket = UdpSocket::bind(bind_addr).await.map_err(|e| {
            ServerError::BindFailed(format!(
                "Failed to bind to {}:{}: {}",
                config.bind_address, config.port, e
            ))
        })?;

        tracing::info!("UDP server listening on {}", socket.local_addr()?);

        Ok(Self {
            config,
            socket: Arc::new(socket),
            backlog: Backlog::default(),
        })
    }

    pub fn local_addr(&self) -> ServerResult<SocketAddr> {
        Ok(self.socket.local_addr()?)
    }

    /// Wait for a command datagram and run that peer's exchange to completion.
    ///
    /// The outer error is a socket receive failure; the inner result is the exchange.
    pub async fn serve_next(&self) -> ServerResult<ExchangeResult<ExchangeSummary>> {
        let queued = self.backlog.lock().await.pop_front();
        let (peer, first) = match queued {
            Some((peer, datagram)) => {
                tracing::debug!("Taking queued datagram from {}", peer);
                (peer, datagram)
            }
            None => {
                let mut buf = vec![0u8; MAX_MESSAGE_SIZE];
                let (n, peer) = self.socket.recv_from(&mut buf).await?;
                (peer, Bytes::copy_from_slice(&buf[..n]))
            }
        };
        tracing::info!("Datagram exchange with {}", peer);

        let mut session = DatagramSession::seeded(self.socket.clone(), peer, first)
            .with_backlog(self.backlog.clone())
            .with_receive_timeout(self.config.receive_timeout());

        let outcome = exchange::serve(&mut session, None).await;
        log_outcome(peer, &outcome);
        Ok(outcome)
    }

    /// Serve peers forever
    pub async fn run(&self) {
        loop {
            if let Err(e) = self.serve_next().await {
                tracing::error!("Receive error: {}", e);
            }
        }
    }
}
