//! Dispatcher: how an accepted connection reaches its handler.
//!
//! # Sequential
//!
//! The handler runs inline inside the accept loop.  While one client is being
//! served, no other client is accepted; later clients wait in the OS backlog
//! until the current one is closed.  This serializes all client service and
//! is only meant as a minimal demo mode.
//!
//! # Concurrent
//!
//! Each connection is served on its own Tokio task and the accept loop moves
//! on immediately.  Workers share nothing mutable: each owns its connection
//! and its receive buffer, and the handler they share is read-only.  The
//! number of workers is not bounded.
//!
//! Worker tasks are tracked in a [`JoinSet`] owned by the dispatcher (and
//! therefore by the accept loop alone), so shutdown can wait for in-flight
//! connections with [`Dispatcher::drain`].

use std::sync::Arc;
use std::time::Duration;

use sockdemo_core::DispatchMode;
use tokio::task::{JoinError, JoinSet};
use tracing::{error, info, warn};

use crate::application::events::ServerEvent;
use crate::application::serve_connection::ConnectionHandler;
use crate::infrastructure::network::Connection;

/// Hands accepted connections to a [`ConnectionHandler`].
pub struct Dispatcher {
    mode: DispatchMode,
    handler: Arc<ConnectionHandler>,
    workers: JoinSet<()>,
}

impl Dispatcher {
    pub fn new(mode: DispatchMode, handler: ConnectionHandler) -> Self {
        Self {
            mode,
            handler: Arc::new(handler),
            workers: JoinSet::new(),
        }
    }

    pub fn mode(&self) -> DispatchMode {
        self.mode
    }

    /// Number of concurrent workers that have not been reaped yet.
    pub fn active_workers(&self) -> usize {
        self.workers.len()
    }

    /// Serves `connection` according to the dispatch mode.
    ///
    /// In sequential mode this returns once the connection is closed; in
    /// concurrent mode it returns as soon as the worker is spawned.
    pub async fn handle(&mut self, connection: Connection) {
        self.handler.events().emit(ServerEvent::Accepted {
            id: connection.id(),
            peer: connection.peer_addr(),
        });

        match self.mode {
            DispatchMode::Sequential => serve_and_log(&self.handler, connection).await,
            DispatchMode::Concurrent => {
                self.reap_finished();
                let handler = Arc::clone(&self.handler);
                self.workers.spawn(async move {
                    serve_and_log(&handler, connection).await;
                });
            }
        }
    }

    /// Waits up to `grace` for in-flight workers, then aborts the rest.
    ///
    /// Aborted workers drop their connection, which releases the socket.
    pub async fn drain(&mut self, grace: Duration) {
        if self.workers.is_empty() {
            return;
        }
        info!("waiting up to {grace:?} for {} connection(s)", self.workers.len());

        let workers = &mut self.workers;
        let joined_all = tokio::time::timeout(grace, async {
            while let Some(result) = workers.join_next().await {
                log_join_result(result);
            }
        })
        .await;

        if joined_all.is_err() {
            warn!(
                "aborting {} connection(s) still open after {grace:?}",
                self.workers.len()
            );
            self.workers.shutdown().await;
        }
    }

    fn reap_finished(&mut self) {
        while let Some(result) = self.workers.try_join_next() {
            log_join_result(result);
        }
    }
}

async fn serve_and_log(handler: &ConnectionHandler, connection: Connection) {
    let id = connection.id();
    let peer = connection.peer_addr();
    match handler.serve(connection).await {
        Ok(outcome) => info!(
            "connection {id} ({peer}) closed: {:?} after {} message(s)",
            outcome.reason, outcome.messages
        ),
        Err(e) => warn!("connection {id} ({peer}) closed with error: {e}"),
    }
}

fn log_join_result(result: Result<(), JoinError>) {
    if let Err(e) = result {
        if e.is_panic() {
            error!("connection worker panicked: {e}");
        }
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use crate::application::events::EventSink;
    use crate::infrastructure::network::ConnectionId;
    use sockdemo_core::HandlerConfig;
    use tokio::io::{AsyncReadExt, AsyncWriteExt};
    use tokio::net::{TcpListener, TcpStream};

    async fn accepted(listener: &TcpListener, id: u64) -> (Connection, TcpStream) {
        let client = TcpStream::connect(listener.local_addr().unwrap())
            .await
            .unwrap();
        let (stream, peer) = listener.accept().await.unwrap();
        (Connection::new(ConnectionId(id), stream, peer), client)
    }

    #[tokio::test]
    async fn test_concurrent_handle_returns_before_connection_closes() {
        // Arrange
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let mut dispatcher =
            Dispatcher::new(DispatchMode::Concurrent, ConnectionHandler::new(HandlerConfig::default()));
        let (conn, mut client) = accepted(&listener, 1).await;

        // Act: the client never terminates, yet handle() must come back.
        tokio::time::timeout(Duration::from_secs(1), dispatcher.handle(conn))
            .await
            .expect("concurrent dispatch must not wait for the connection");

        // Assert
        assert_eq!(dispatcher.active_workers(), 1);

        // Cleanup: terminate and drain.
        let mut buf = [0u8; 64];
        let _ = client.read(&mut buf).await.unwrap();
        client.shutdown().await.unwrap();
        dispatcher.drain(Duration::from_secs(2)).await;
        assert_eq!(dispatcher.active_workers(), 0);
    }

    #[tokio::test]
    async fn test_sequential_handle_waits_for_close() {
        // Arrange
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let (sink, mut rx) = EventSink::channel();
        let handler = ConnectionHandler::new(HandlerConfig::default()).with_events(sink);
        let mut dispatcher = Dispatcher::new(DispatchMode::Sequential, handler);
        let (conn, mut client) = accepted(&listener, 1).await;

        let client_task = tokio::spawn(async move {
            let mut buf = [0u8; 64];
            let _ = client.read(&mut buf).await.unwrap();
            client.write_all(b"hello").await.unwrap();
            tokio::time::sleep(Duration::from_millis(50)).await;
            client.shutdown().await.unwrap();
        });

        // Act
        dispatcher.handle(conn).await;

        // Assert: by the time handle() returns, the connection is closed.
        let events: Vec<_> = std::iter::from_fn(|| rx.try_recv().ok()).collect();
        assert!(matches!(events.first(), Some(ServerEvent::Accepted { .. })));
        assert!(matches!(events.last(), Some(ServerEvent::Closed { .. })));
        assert_eq!(dispatcher.active_workers(), 0);
        client_task.await.unwrap();
    }

    #[tokio::test]
    async fn test_drain_aborts_idle_workers_after_grace() {
        // Arrange: a client that connects and then sits idle.
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let mut dispatcher =
            Dispatcher::new(DispatchMode::Concurrent, ConnectionHandler::new(HandlerConfig::default()));
        let (conn, mut client) = accepted(&listener, 1).await;
        dispatcher.handle(conn).await;

        // Act
        dispatcher.drain(Duration::from_millis(100)).await;

        // Assert: worker gone, socket released (client sees end-of-stream
        // after the greeting).
        assert_eq!(dispatcher.active_workers(), 0);
        let mut buf = [0u8; 128];
        let mut total = 0;
        loop {
            match client.read(&mut buf).await {
                Ok(0) | Err(_) => break,
                Ok(n) => total += n,
            }
        }
        assert!(total <= buf.len());
    }
}
