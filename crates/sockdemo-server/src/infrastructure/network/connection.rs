//! One accepted client socket.
//!
//! A [`Connection`] is created by the listener at accept time, handed to the
//! dispatcher exactly once, and from then on owned by the single handler that
//! serves it.  Nothing else holds a reference to the socket, so no locking is
//! needed.
//!
//! # Receive buffer
//!
//! Each connection owns a fixed-capacity receive buffer.  [`Connection::receive`]
//! performs exactly one read and returns only the bytes that read produced,
//! so stale bytes left over from an earlier, longer read can never be
//! mistaken for payload.
//!
//! # Closing
//!
//! [`Connection::close`] shuts the socket down in both directions and then
//! releases it.  After that every operation returns
//! [`ConnectionError::AlreadyClosed`], including a second `close`.

use std::fmt;
use std::io;
use std::net::{Shutdown, SocketAddr};

use sockdemo_core::{ConnectionState, TransitionError, DEFAULT_BUFFER_CAPACITY};
use thiserror::Error;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;
use tracing::debug;

/// Accept-order number the listener assigns to each connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ConnectionId(pub u64);

impl fmt::Display for ConnectionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Errors that end a single connection.  None of them affect the listener.
#[derive(Debug, Error)]
pub enum ConnectionError {
    /// Writing to the peer failed (broken pipe, reset).
    #[error("send failed: {0}")]
    Send(#[source] io::Error),

    /// Reading from the peer failed (reset).
    #[error("receive failed: {0}")]
    Receive(#[source] io::Error),

    /// Shutting the socket down failed.  The socket is released regardless.
    #[error("shutdown failed: {0}")]
    Shutdown(#[source] io::Error),

    /// No data arrived within the configured idle timeout.
    #[error("no data received for {0:?}")]
    IdleTimeout(std::time::Duration),

    /// The connection has already reached `Closed`.
    #[error("connection {0} already closed")]
    AlreadyClosed(ConnectionId),

    /// The handler attempted a protocol step out of order.
    #[error("protocol state error: {0}")]
    Protocol(#[from] TransitionError),
}

/// An accepted TCP connection, its peer address, and its lifecycle state.
pub struct Connection {
    id: ConnectionId,
    peer_addr: SocketAddr,
    stream: Option<TcpStream>,
    state: ConnectionState,
    buffer: Vec<u8>,
}

impl Connection {
    /// Wraps an accepted stream.  The receive buffer starts at
    /// [`DEFAULT_BUFFER_CAPACITY`]; see [`with_receive_capacity`](Self::with_receive_capacity).
    pub fn new(id: ConnectionId, stream: TcpStream, peer_addr: SocketAddr) -> Self {
        Self {
            id,
            peer_addr,
            stream: Some(stream),
            state: ConnectionState::Open,
            buffer: vec![0u8; DEFAULT_BUFFER_CAPACITY],
        }
    }

    /// Replaces the receive buffer with one of `capacity` bytes.
    ///
    /// A capacity of zero is raised to one byte: a zero-length read buffer
    /// would make every receive look like the termination signal.
    pub fn with_receive_capacity(mut self, capacity: usize) -> Self {
        self.buffer = vec![0u8; capacity.max(1)];
        self
    }

    pub fn id(&self) -> ConnectionId {
        self.id
    }

    pub fn peer_addr(&self) -> SocketAddr {
        self.peer_addr
    }

    pub fn state(&self) -> ConnectionState {
        self.state
    }

    pub fn receive_capacity(&self) -> usize {
        self.buffer.len()
    }

    /// Writes all of `bytes` to the peer.
    ///
    /// # Errors
    ///
    /// [`ConnectionError::Send`] on I/O failure,
    /// [`ConnectionError::AlreadyClosed`] after [`close`](Self::close).
    pub async fn send(&mut self, bytes: &[u8]) -> Result<(), ConnectionError> {
        let id = self.id;
        let stream = self.stream.as_mut().ok_or(ConnectionError::AlreadyClosed(id))?;
        stream.write_all(bytes).await.map_err(ConnectionError::Send)
    }

    /// Performs one read and returns exactly the bytes it produced.
    ///
    /// An empty slice means the peer shut down its write side.
    ///
    /// # Errors
    ///
    /// [`ConnectionError::Receive`] on I/O failure,
    /// [`ConnectionError::AlreadyClosed`] after [`close`](Self::close).
    pub async fn receive(&mut self) -> Result<&[u8], ConnectionError> {
        let id = self.id;
        let stream = self.stream.as_mut().ok_or(ConnectionError::AlreadyClosed(id))?;
        let n = stream
            .read(&mut self.buffer)
            .await
            .map_err(ConnectionError::Receive)?;
        Ok(&self.buffer[..n])
    }

    /// Shuts the socket down in both directions and releases it.
    ///
    /// The state moves `Open → Closing → Closed`.  A peer that has already
    /// gone away is not an error: the socket is released either way.
    ///
    /// # Errors
    ///
    /// [`ConnectionError::AlreadyClosed`] when called a second time;
    /// [`ConnectionError::Shutdown`] if the OS rejects the shutdown (the
    /// connection still ends up `Closed`).
    pub fn close(&mut self) -> Result<(), ConnectionError> {
        let stream = self
            .stream
            .take()
            .ok_or(ConnectionError::AlreadyClosed(self.id))?;

        self.state = ConnectionState::Closing;
        let result = shutdown_both(stream);
        self.state = ConnectionState::Closed;

        debug!("connection {} ({}) closed", self.id, self.peer_addr);
        result
    }
}

impl fmt::Debug for Connection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Connection")
            .field("id", &self.id)
            .field("peer_addr", &self.peer_addr)
            .field("state", &self.state)
            .field("receive_capacity", &self.buffer.len())
            .finish()
    }
}

/// Full-duplex shutdown, then drop the descriptor.
///
/// Tokio's `shutdown()` only closes the write half, so the stream is
/// converted back to a std socket for `Shutdown::Both`.
fn shutdown_both(stream: TcpStream) -> Result<(), ConnectionError> {
    let std_stream = stream.into_std().map_err(ConnectionError::Shutdown)?;
    match std_stream.shutdown(Shutdown::Both) {
        Ok(()) => Ok(()),
        Err(e) if e.kind() == io::ErrorKind::NotConnected => Ok(()),
        Err(e) => Err(ConnectionError::Shutdown(e)),
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::net::TcpListener;

    /// Returns (server-side Connection, client-side stream) over loopback.
    async fn connected_pair() -> (Connection, TcpStream) {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let client = TcpStream::connect(addr).await.unwrap();
        let (server_side, peer) = listener.accept().await.unwrap();
        (Connection::new(ConnectionId(1), server_side, peer), client)
    }

    #[tokio::test]
    async fn test_new_connection_is_open_with_default_capacity() {
        let (conn, _client) = connected_pair().await;
        assert_eq!(conn.state(), ConnectionState::Open);
        assert_eq!(conn.receive_capacity(), 1024);
        assert_eq!(conn.id(), ConnectionId(1));
    }

    #[tokio::test]
    async fn test_receive_returns_only_bytes_read() {
        // Arrange: fill the buffer with a long message first, then a short one.
        let (mut conn, mut client) = connected_pair().await;
        client.write_all(b"a much longer first message").await.unwrap();
        let first = conn.receive().await.unwrap().to_vec();
        assert_eq!(first, b"a much longer first message");

        // Act
        client.write_all(b"hi").await.unwrap();
        let second = conn.receive().await.unwrap();

        // Assert: nothing from the first message leaks into the second.
        assert_eq!(second, b"hi");
    }

    #[tokio::test]
    async fn test_receive_is_truncated_to_capacity() {
        let (conn, mut client) = connected_pair().await;
        let mut conn = conn.with_receive_capacity(4);
        client.write_all(b"abcdefgh").await.unwrap();

        let first = conn.receive().await.unwrap().to_vec();

        assert_eq!(first, b"abcd");
    }

    #[tokio::test]
    async fn test_zero_capacity_is_raised_to_one() {
        let (conn, _client) = connected_pair().await;
        assert_eq!(conn.with_receive_capacity(0).receive_capacity(), 1);
    }

    #[tokio::test]
    async fn test_peer_shutdown_reads_as_empty() {
        let (mut conn, mut client) = connected_pair().await;
        client.shutdown().await.unwrap();

        let received = conn.receive().await.unwrap();

        assert!(received.is_empty());
    }

    #[tokio::test]
    async fn test_close_reaches_closed_and_peer_sees_eof() {
        // Arrange
        let (mut conn, mut client) = connected_pair().await;

        // Act
        conn.close().unwrap();

        // Assert
        assert_eq!(conn.state(), ConnectionState::Closed);
        let mut buf = [0u8; 8];
        let n = client.read(&mut buf).await.unwrap();
        assert_eq!(n, 0);
    }

    #[tokio::test]
    async fn test_second_close_returns_already_closed() {
        let (mut conn, _client) = connected_pair().await;
        conn.close().unwrap();

        let err = conn.close().unwrap_err();

        assert!(matches!(err, ConnectionError::AlreadyClosed(ConnectionId(1))));
        assert_eq!(conn.state(), ConnectionState::Closed);
    }

    #[tokio::test]
    async fn test_io_after_close_is_rejected() {
        let (mut conn, _client) = connected_pair().await;
        conn.close().unwrap();

        assert!(matches!(
            conn.send(b"x").await,
            Err(ConnectionError::AlreadyClosed(_))
        ));
        assert!(matches!(
            conn.receive().await,
            Err(ConnectionError::AlreadyClosed(_))
        ));
    }

    #[test]
    fn test_connection_id_display() {
        assert_eq!(ConnectionId(42).to_string(), "#42");
    }
}
