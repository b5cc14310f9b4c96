//! Transport sessions for CalcNet
//!
//! A session moves whole protocol messages between this host and exactly one
//! peer. Two variants exist:
//! - [`StreamSession`]: a byte stream with an explicit reassembly buffer
//! - [`DatagramSession`]: one datagram per message, keyed to one peer address

use async_trait::async_trait;
use bytes::{Bytes, BytesMut};
use std::collections::VecDeque;
use std::future::Future;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tokio::net::UdpSocket;
use tokio::sync::Mutex;

use crate::protocol::MAX_MESSAGE_SIZE;

/// Upper bound on datagrams held for peers waiting their turn
pub const MAX_BACKLOG: usize = 64;

/// Datagrams that arrived from other peers while one exchange was running,
/// in arrival order
pub type Backlog = Arc<Mutex<VecDeque<(SocketAddr, Bytes)>>>;

/// Session errors
#[derive(Error, Debug)]
pub enum SessionError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Connection closed by peer")]
    Closed,

    #[error("Received an empty message")]
    Empty,

    #[error("Framing error: expected {expected} bytes, got {actual}")]
    Framing { expected: usize, actual: usize },

    #[error("Receive timed out")]
    Timeout,
}

pub type SessionResult<T> = Result<T, SessionError>;

/// Session statistics
#[derive(Debug, Default, Clone)]
pub struct SessionStats {
    /// Messages sent
    pub messages_sent: u64,
    /// Messages received
    pub messages_received: u64,
    /// Bytes sent
    pub bytes_sent: u64,
    /// Bytes received
    pub bytes_received: u64,
}

impl SessionStats {
    fn record_sent(&mut self, len: usize) {
        self.messages_sent += 1;
        self.bytes_sent += len as u64;
    }

    fn record_received(&mut self, len: usize) {
        self.messages_received += 1;
        self.bytes_received += len as u64;
    }
}

/// Send one message / receive one message with a single peer
#[async_trait]
pub trait TransportSession: Send {
    /// Address of the peer this session talks to
    fn peer_addr(&self) -> SocketAddr;

    /// Whether the transport delimits messages itself (datagrams do, streams don't)
    fn preserves_boundaries(&self) -> bool;

    /// Send one complete message
    async fn send_message(&mut self, bytes: &[u8]) -> SessionResult<()>;

    /// Receive the next natural unit of data, at most `max_len` bytes.
    ///
    /// For datagrams this is one datagram. For streams it is whatever is
    /// already buffered, or the bytes returned by the next read.
    async fn receive_message(&mut self, max_len: usize) -> SessionResult<Bytes>;

    /// Receive a fixed-size message of exactly `len` bytes
    async fn receive_exact(&mut self, len: usize) -> SessionResult<Bytes>;

    fn stats(&self) -> &SessionStats;
}

/// Run a receive under an optional deadline
async fn within<T, F>(limit: Option<Duration>, fut: F) -> SessionResult<T>
where
    F: Future<Output = SessionResult<T>>,
{
    match limit {
        Some(limit) => tokio::time::timeout(limit, fut)
            .await
            .map_err(|_| SessionError::Timeout)?,
        None => fut.await,
    }
}

/// Session over a connection-oriented byte stream
pub struct StreamSession<S> {
    /// Remote peer address
    peer_addr: SocketAddr,
    /// The underlying stream
    stream: S,
    /// Bytes read from the stream but not yet handed out
    read_buf: BytesMut,
    /// Deadline for a single receive
    receive_timeout: Option<Duration>,
    stats: SessionStats,
}

impl<S> StreamSession<S>
where
    S: AsyncRead + AsyncWrite + Unpin + Send,
{
    /// Create a new session from an established stream
    pub fn new(stream: S, peer_addr: SocketAddr) -> Self {
        Self {
            peer_addr,
            stream,
            read_buf: BytesMut::with_capacity(MAX_MESSAGE_SIZE),
            receive_timeout: None,
            stats: SessionStats::default(),
        }
    }

    pub fn with_receive_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.receive_timeout = timeout;
        self
    }

    /// Number of bytes waiting in the reassembly buffer
    pub fn buffered(&self) -> usize {
        self.read_buf.len()
    }

    /// Read once from the stream into the reassembly buffer.
    /// Returns the number of bytes read (0 on end of stream).
    async fn fill(&mut self) -> SessionResult<usize> {
        let mut buf = [0u8; MAX_MESSAGE_SIZE];
        let n = self.stream.read(&mut buf).await?;
        self.read_buf.extend_from_slice(&buf[..n]);
        Ok(n)
    }

    /// Close the write half of the stream
    pub async fn shutdown(&mut self) -> SessionResult<()> {
        self.stream.shutdown().await?;
        Ok(())
    }
}

#[async_trait]
impl<S> TransportSession for StreamSession<S>
where
    S: AsyncRead + AsyncWrite + Unpin + Send,
{
    fn peer_addr(&self) -> SocketAddr {
        self.peer_addr
    }

    fn preserves_boundaries(&self) -> bool {
        false
    }

    async fn send_message(&mut self, bytes: &[u8]) -> SessionResult<()> {
        self.stream.write_all(bytes).await?;
        self.stream.flush().await?;
        self.stats.record_sent(bytes.len());
        Ok(())
    }

    async fn receive_message(&mut self, max_len: usize) -> SessionResult<Bytes> {
        if self.read_buf.is_empty() {
            let limit = self.receive_timeout;
            let n = within(limit, self.fill()).await?;
            if n == 0 {
                return Err(SessionError::Closed);
            }
        }

        let take = max_len.min(self.read_buf.len());
        let message = self.read_buf.split_to(take).freeze();
        self.stats.record_received(message.len());
        Ok(message)
    }

    async fn receive_exact(&mut self, len: usize) -> SessionResult<Bytes> {
        while self.read_buf.len() < len {
            let limit = self.receive_timeout;
            let n = within(limit, self.fill()).await?;
            if n == 0 {
                if self.read_buf.is_empty() {
                    return Err(SessionError::Closed);
                }
                return Err(SessionError::Framing {
                    expected: len,
                    actual: self.read_buf.len(),
                });
            }
        }

        let message = self.read_buf.split_to(len).freeze();
        self.stats.record_received(message.len());
        Ok(message)
    }

    fn stats(&self) -> &SessionStats {
        &self.stats
    }
}

/// Session over a shared datagram socket, bound to one peer address.
///
/// Datagrams arriving from any other address are never matched to this
/// exchange. With a backlog attached they are queued for their own turn;
/// without one they are dropped.
pub struct DatagramSession {
    socket: Arc<UdpSocket>,
    peer_addr: SocketAddr,
    /// A datagram already received for this peer (the command, on the server)
    pending: Option<Bytes>,
    backlog: Option<Backlog>,
    receive_timeout: Option<Duration>,
    stats: SessionStats,
}

impl DatagramSession {
    pub fn new(socket: Arc<UdpSocket>, peer_addr: SocketAddr) -> Self {
        Self {
            socket,
            peer_addr,
            pending: None,
            backlog: None,
            receive_timeout: None,
            stats: SessionStats::default(),
        }
    }

    /// Create a session whose first receive yields `first`, a datagram the
    /// caller already pulled off the socket while discovering the peer
    pub fn seeded(socket: Arc<UdpSocket>, peer_addr: SocketAddr, first: Bytes) -> Self {
        Self {
            pending: Some(first),
            ..Self::new(socket, peer_addr)
        }
    }

    pub fn with_receive_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.receive_timeout = timeout;
        self
    }

    /// Queue datagrams from other peers here instead of dropping them
    pub fn with_backlog(mut self, backlog: Backlog) -> Self {
        self.backlog = Some(backlog);
        self
    }

    /// Receive the next datagram from the bound peer
    async fn recv_from_peer(&mut self, capacity: usize) -> SessionResult<Bytes> {
        if let Some(datagram) = self.pending.take() {
            return Ok(datagram);
        }

        // This peer may have spoken while another exchange was running
        if let Some(backlog) = &self.backlog {
            let mut queue = backlog.lock().await;
            if let Some(index) = queue.iter().position(|(from, _)| *from == self.peer_addr) {
                if let Some((_, datagram)) = queue.remove(index) {
                    return Ok(datagram);
                }
            }
        }

        let mut buf = vec![0u8; capacity];
        loop {
            let (n, from) = self.socket.recv_from(&mut buf).await?;
            if from == self.peer_addr {
                return Ok(Bytes::copy_from_slice(&buf[..n]));
            }
            self.set_aside(from, Bytes::copy_from_slice(&buf[..n])).await;
        }
    }

    async fn set_aside(&self, from: SocketAddr, datagram: Bytes) {
        match &self.backlog {
            Some(backlog) => {
                let mut queue = backlog.lock().await;
                if queue.len() < MAX_BACKLOG {
                    tracing::debug!(
                        "Queued {} byte datagram from {} while serving {}",
                        datagram.len(),
                        from,
                        self.peer_addr
                    );
                    queue.push_back((from, datagram));
                } else {
                    tracing::warn!("Backlog full, dropping datagram from {}", from);
                }
            }
            None => tracing::warn!(
                "Dropping {} byte datagram from {} while talking to {}",
                datagram.len(),
                from,
                self.peer_addr
            ),
        }
    }
}

#[async_trait]
impl TransportSession for DatagramSession {
    fn peer_addr(&self) -> SocketAddr {
        self.peer_addr
    }

    fn preserves_boundaries(&self) -> bool {
        true
    }

    async fn send_message(&mut self, bytes: &[u8]) -> SessionResult<()> {
        self.socket.send_to(bytes, self.peer_addr).await?;
        self.stats.record_sent(bytes.len());
        Ok(())
    }

    async fn receive_message(&mut self, max_len: usize) -> SessionResult<Bytes> {
        let limit = self.receive_timeout;
        let mut datagram = within(limit, self.recv_from_peer(max_len)).await?;
        if datagram.is_empty() {
            return Err(SessionError::Empty);
        }
        // A seeded datagram may exceed the requested size
        datagram.truncate(max_len);
        self.stats.record_received(datagram.len());
        Ok(datagram)
    }

    async fn receive_exact(&mut self, len: usize) -> SessionResult<Bytes> {
        // One spare byte so an oversized datagram shows up as too long
        let capacity = MAX_MESSAGE_SIZE.max(len + 1);
        let limit = self.receive_timeout;
        let datagram = within(limit, self.recv_from_peer(capacity)).await?;
        if datagram.len() != len {
            return Err(SessionError::Framing {
                expected: len,
                actual: datagram.len(),
            });
        }
        self.stats.record_received(datagram.len());
        Ok(datagram)
    }

    fn stats(&self) -> &SessionStats {
        &self.stats
    }
}
