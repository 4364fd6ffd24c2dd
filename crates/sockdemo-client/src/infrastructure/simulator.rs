//! Client simulator: one complete conversation with the server.
//!
//! ```text
//! connect ──► read greeting ──► send × N (delay between) ──► terminate ──► close
//! ```
//!
//! The simulator never sends before the greeting has arrived, so the server's
//! greeting-before-receive ordering is observable from the client side.
//!
//! Messages are written with no framing.  The server treats whatever one
//! `read` returns as one message, so with a zero inter-message delay several
//! messages may reach the server as a single message.  A delay of a few tens
//! of milliseconds keeps them apart on loopback.

use std::io;
use std::net::{Shutdown, SocketAddr};
use std::time::Duration;

use sockdemo_core::{Message, DEFAULT_BUFFER_CAPACITY};
use thiserror::Error;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;
use tracing::{debug, info, warn};

/// Default text of each simulated message.
pub const DEFAULT_MESSAGE: &str = "world";

/// Default number of messages per run.
pub const DEFAULT_MESSAGE_COUNT: usize = 10;

/// Errors that can occur while simulating a client.
#[derive(Debug, Error)]
pub enum ClientError {
    /// TCP connection to the server failed.
    #[error("failed to connect to server at {addr}: {source}")]
    Connect {
        addr: SocketAddr,
        #[source]
        source: io::Error,
    },
    /// An I/O error occurred on the established connection.
    #[error("connection I/O error: {0}")]
    Io(#[from] io::Error),
    /// The server closed the connection before sending its greeting.
    #[error("connection closed by server before the greeting")]
    Closed,
}

/// What one simulated client does.
#[derive(Debug, Clone)]
pub struct SimulatorConfig {
    pub server_addr: SocketAddr,
    /// Text sent as each message.
    pub message: String,
    pub message_count: usize,
    /// Pause between consecutive messages (not before the first).
    pub inter_message_delay: Duration,
    /// Bytes read for the greeting.
    pub receive_capacity: usize,
    /// How long to wait for the server to close after termination.
    pub close_timeout: Duration,
}

impl SimulatorConfig {
    pub fn new(server_addr: SocketAddr) -> Self {
        Self {
            server_addr,
            message: DEFAULT_MESSAGE.to_string(),
            message_count: DEFAULT_MESSAGE_COUNT,
            inter_message_delay: Duration::from_millis(100),
            receive_capacity: DEFAULT_BUFFER_CAPACITY,
            close_timeout: Duration::from_secs(5),
        }
    }
}

/// Result of a completed run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SimulationReport {
    /// The greeting as decoded from the first receive.
    pub greeting: String,
    pub messages_sent: usize,
    /// The client's own socket address, which is the peer address the
    /// server logs for this connection.
    pub local_addr: SocketAddr,
}

/// Drives one client conversation.
#[derive(Debug, Clone)]
pub struct ClientSimulator {
    config: SimulatorConfig,
}

impl ClientSimulator {
    pub fn new(config: SimulatorConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &SimulatorConfig {
        &self.config
    }

    /// Connects, waits for the greeting, sends the messages, terminates and
    /// closes.
    ///
    /// # Errors
    ///
    /// - [`ClientError::Connect`] if nothing accepts at `server_addr`.
    /// - [`ClientError::Closed`] if the server closes before greeting.
    /// - [`ClientError::Io`] if a send fails (for example the server closed
    ///   after a single exchange while more messages were queued).
    pub async fn run(&self) -> Result<SimulationReport, ClientError> {
        let cfg = &self.config;
        let mut stream = TcpStream::connect(cfg.server_addr)
            .await
            .map_err(|source| ClientError::Connect {
                addr: cfg.server_addr,
                source,
            })?;
        let local_addr = stream.local_addr()?;

        let greeting = receive_greeting(&mut stream, cfg.receive_capacity).await?;
        info!("{local_addr} received greeting: {greeting}");

        for i in 0..cfg.message_count {
            if i > 0 && !cfg.inter_message_delay.is_zero() {
                tokio::time::sleep(cfg.inter_message_delay).await;
            }
            stream.write_all(cfg.message.as_bytes()).await?;
            debug!("{local_addr} sent message {}: {}", i + 1, cfg.message);
        }
        info!("{local_addr} sent {} message(s)", cfg.message_count);

        terminate(stream, cfg.close_timeout).await?;
        info!("{local_addr} closed");

        Ok(SimulationReport {
            greeting,
            messages_sent: cfg.message_count,
            local_addr,
        })
    }
}

/// Runs one client with the default message text.
pub async fn run(
    server_addr: SocketAddr,
    message_count: usize,
    inter_message_delay: Duration,
) -> Result<SimulationReport, ClientError> {
    let config = SimulatorConfig {
        message_count,
        inter_message_delay,
        ..SimulatorConfig::new(server_addr)
    };
    ClientSimulator::new(config).run().await
}

/// Receives the greeting, sends exactly one message, then closes.
pub async fn single_exchange(
    server_addr: SocketAddr,
    message: &str,
) -> Result<SimulationReport, ClientError> {
    let config = SimulatorConfig {
        message: message.to_string(),
        message_count: 1,
        inter_message_delay: Duration::ZERO,
        ..SimulatorConfig::new(server_addr)
    };
    ClientSimulator::new(config).run().await
}

/// Reads the greeting with a single `read` of at most `capacity` bytes.
///
/// There is no reassembly: if the greeting arrives in more than one TCP
/// segment, only the bytes of the first read are returned and the rest stay
/// in the stream.  A greeting longer than `capacity` is cut the same way.
async fn receive_greeting(stream: &mut TcpStream, capacity: usize) -> Result<String, ClientError> {
    let mut buf = vec![0u8; capacity.max(1)];
    let n = stream.read(&mut buf).await?;
    if n == 0 {
        return Err(ClientError::Closed);
    }
    Ok(Message::decode(&buf[..n]).into_text())
}

/// Sends the termination signal, waits for the server to close, then shuts
/// down both directions and releases the socket.
///
/// The empty write carries no bytes; the write-side shutdown that follows is
/// what the server reads as an empty message.  Draining until end-of-stream
/// before dropping avoids resetting a connection that still has unread data.
async fn terminate(mut stream: TcpStream, close_timeout: Duration) -> Result<(), ClientError> {
    stream.write_all(&[]).await?;
    match stream.shutdown().await {
        Ok(()) => {}
        // The server already closed (single-exchange mode).
        Err(e) if e.kind() == io::ErrorKind::NotConnected => return Ok(()),
        Err(e) => return Err(e.into()),
    }

    let mut scratch = [0u8; 256];
    let drained = tokio::time::timeout(close_timeout, async {
        loop {
            match stream.read(&mut scratch).await {
                Ok(0) => break,
                Ok(n) => debug!("discarded {n} byte(s) after termination"),
                // A reset here still means the server is gone.
                Err(_) => break,
            }
        }
    })
    .await;

    if drained.is_err() {
        warn!("server did not close within {close_timeout:?}; dropping connection");
    }
    shutdown_both(stream)
}

/// Tokio's `shutdown()` only closes the write half; the read half is shut
/// through the std socket.
fn shutdown_both(stream: TcpStream) -> Result<(), ClientError> {
    match stream.into_std()?.shutdown(Shutdown::Both) {
        Ok(()) => Ok(()),
        Err(e) if e.kind() == io::ErrorKind::NotConnected => Ok(()),
        Err(e) => Err(e.into()),
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
