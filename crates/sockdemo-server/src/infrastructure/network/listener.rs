//! TCP listener: bind, listen, accept loop, stop.
//!
//! # Lifecycle
//!
//! 1. [`Listener::start`] creates the socket, binds it, and calls `listen`
//!    with the configured backlog.  Any failure here is fatal and reported
//!    synchronously as [`ListenerError::Bind`]; no accept is ever attempted.
//! 2. [`Listener::accept`] waits for the next client and wraps it in an Open
//!    [`Connection`].  [`Listener::accept_loop`] repeats this and hands each
//!    connection to the [`Dispatcher`] exactly once.
//! 3. [`StopHandle::stop`] closes the listening socket.  A pending or future
//!    `accept` then returns [`ListenerError::Stopped`] instead of blocking.
//!
//! # Transient accept failures
//!
//! `accept` can fail without the listener being broken, most commonly when
//! the process runs out of file descriptors.  The accept loop logs these,
//! waits briefly so it does not spin, and keeps accepting.

use std::future::Future;
use std::io;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use sockdemo_core::{ConfigValidationError, ListenerConfig};
use thiserror::Error;
use tokio::net::{TcpListener, TcpSocket};
use tokio::sync::watch;
use tracing::{debug, info, warn};

use super::connection::{Connection, ConnectionId};
use crate::application::dispatch::Dispatcher;

/// Pause after a failed accept before trying again.
const ACCEPT_ERROR_BACKOFF: Duration = Duration::from_millis(50);

/// Errors produced by the listener.
#[derive(Debug, Error)]
pub enum ListenerError {
    /// Binding or listening failed (port in use, permission denied).  Fatal.
    #[error("failed to listen on {addr}: {source}")]
    Bind {
        addr: SocketAddr,
        #[source]
        source: io::Error,
    },

    /// The listener configuration is unusable.  Fatal.
    #[error("invalid listener configuration: {0}")]
    InvalidConfig(#[from] ConfigValidationError),

    /// A single accept failed.  Transient; the loop continues.
    #[error("accept failed: {0}")]
    Accept(#[source] io::Error),

    /// The listener was stopped.
    #[error("listener stopped")]
    Stopped,
}

/// Cloneable handle that stops a [`Listener`] from any task.
#[derive(Debug, Clone)]
pub struct StopHandle {
    tx: Arc<watch::Sender<bool>>,
}

impl StopHandle {
    /// Closes the listening socket.  Idempotent.
    pub fn stop(&self) {
        self.tx.send_replace(true);
    }

    /// Whether [`stop`](Self::stop) has been called.
    pub fn is_stopped(&self) -> bool {
        *self.tx.borrow()
    }
}

/// A bound, listening TCP socket.
pub struct Listener {
    socket: Option<TcpListener>,
    local_addr: SocketAddr,
    stop_tx: Arc<watch::Sender<bool>>,
    stop_rx: watch::Receiver<bool>,
    next_id: u64,
}

impl Listener {
    /// Binds and listens according to `config`.
    ///
    /// # Errors
    ///
    /// [`ListenerError::InvalidConfig`] for a zero backlog,
    /// [`ListenerError::Bind`] when the OS refuses the address.
    pub fn start(config: &ListenerConfig) -> Result<Self, ListenerError> {
        config.validate()?;

        let addr = config.socket_addr();
        let bind_err = |source| ListenerError::Bind { addr, source };

        // `TcpListener::bind` always uses the OS default backlog, so build
        // the socket by hand to pass ours to `listen`.
        let socket = if addr.is_ipv4() {
            TcpSocket::new_v4()
        } else {
            TcpSocket::new_v6()
        }
        .map_err(bind_err)?;

        // Lets a restarted server rebind while old connections sit in
        // TIME_WAIT.  Not set on Windows, where it allows port hijacking.
        #[cfg(not(windows))]
        socket.set_reuseaddr(true).map_err(bind_err)?;

        socket.bind(addr).map_err(bind_err)?;
        let listener = socket.listen(config.backlog).map_err(bind_err)?;
        let local_addr = listener.local_addr().map_err(bind_err)?;

        info!(
            "listening on {local_addr} (backlog {}), waiting for clients",
            config.backlog
        );

        let (stop_tx, stop_rx) = watch::channel(false);
        Ok(Self {
            socket: Some(listener),
            local_addr,
            stop_tx: Arc::new(stop_tx),
            stop_rx,
            next_id: 1,
        })
    }

    /// The address actually bound (resolves port `0`).
    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    /// Returns a handle that can stop this listener from another task.
    pub fn stop_handle(&self) -> StopHandle {
        StopHandle {
            tx: Arc::clone(&self.stop_tx),
        }
    }

    /// Waits for the next client.
    ///
    /// # Errors
    ///
    /// [`ListenerError::Stopped`] once the listener has been stopped (the
    /// listening socket is closed on the first such return);
    /// [`ListenerError::Accept`] for a transient accept failure.
    pub async fn accept(&mut self) -> Result<Connection, ListenerError> {
        if *self.stop_rx.borrow() {
            self.close_socket();
            return Err(ListenerError::Stopped);
        }
        let Some(socket) = self.socket.as_ref() else {
            return Err(ListenerError::Stopped);
        };

        let stop_rx = &mut self.stop_rx;
        let accepted = tokio::select! {
            result = socket.accept() => Some(result),
            // `changed` only errors if the sender is dropped, and `self`
            // holds it, so either outcome means "stop".
            _ = stop_rx.changed() => None,
        };

        match accepted {
            Some(Ok((stream, peer_addr))) => {
                let id = ConnectionId(self.next_id);
                self.next_id += 1;
                info!("accepted connection {id} from {peer_addr}");
                Ok(Connection::new(id, stream, peer_addr))
            }
            Some(Err(e)) => Err(ListenerError::Accept(e)),
            None => {
                self.close_socket();
                Err(ListenerError::Stopped)
            }
        }
    }

    /// Accepts clients and hands each one to `dispatcher` until stopped.
    ///
    /// Returns the number of connections accepted.  In
    /// [`DispatchMode::Sequential`](sockdemo_core::DispatchMode::Sequential)
    /// the loop only comes back to `accept` once the previous client is
    /// closed; in `Concurrent` mode it comes back immediately.
    ///
    /// A stop that arrives while a client is served inline closes the
    /// listening socket at once; that client then gets at most
    /// `shutdown_grace` before its connection is dropped.
    pub async fn accept_loop(self, dispatcher: &mut Dispatcher, shutdown_grace: Duration) -> u64 {
        run_accept_loop(self, dispatcher, shutdown_grace).await
    }

    fn close_socket(&mut self) {
        if self.socket.take().is_some() {
            debug!("listening socket {} closed", self.local_addr);
        }
    }
}

// ── Accept loop ───────────────────────────────────────────────────────────────

/// Where the accept loop gets its connections from.
///
/// [`Listener`] is the only production source; the trait lets the loop's
/// error handling run against scripted accept results.
pub(crate) trait AcceptSource: Send {
    fn accept(&mut self) -> impl Future<Output = Result<Connection, ListenerError>> + Send + '_;

    /// Receiver whose value turns `true` once the source is stopped.
    fn stop_signal(&self) -> watch::Receiver<bool>;

    /// Releases the listening socket ahead of the next `accept`.
    fn close(&mut self);

    fn local_addr(&self) -> SocketAddr;
}

impl AcceptSource for Listener {
    fn accept(&mut self) -> impl Future<Output = Result<Connection, ListenerError>> + Send + '_ {
        Listener::accept(self)
    }

    fn stop_signal(&self) -> watch::Receiver<bool> {
        self.stop_rx.clone()
    }

    fn close(&mut self) {
        self.close_socket();
    }

    fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }
}

pub(crate) async fn run_accept_loop<S: AcceptSource>(
    mut source: S,
    dispatcher: &mut Dispatcher,
    shutdown_grace: Duration,
) -> u64 {
    let mut accepted = 0u64;
    loop {
        match source.accept().await {
            Ok(connection) => {
                accepted += 1;
                let id = connection.id();
                let handle = dispatcher.handle(connection);
                tokio::pin!(handle);

                tokio::select! {
                    () = &mut handle => {}
                    () = stopped(source.stop_signal()) => {
                        source.close();
                        if tokio::time::timeout(shutdown_grace, &mut handle).await.is_err() {
                            warn!("dropping connection {id} still open after {shutdown_grace:?}");
                        }
                    }
                }
            }
            Err(ListenerError::Stopped) => {
                info!(
                    "listener on {} stopped after {accepted} connection(s)",
                    source.local_addr()
                );
                break;
            }
            Err(e) => {
                warn!("{e}; continuing to accept");
                tokio::time::sleep(ACCEPT_ERROR_BACKOFF).await;
            }
        }
    }
    accepted
}

/// Resolves once `stop_rx` holds `true`.  A dropped sender counts as a stop.
async fn stopped(mut stop_rx: watch::Receiver<bool>) {
    while !*stop_rx.borrow_and_update() {
        if stop_rx.changed().await.is_err() {
            return;
        }
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::VecDeque;

    use sockdemo_core::{DispatchMode, HandlerConfig};
    use tokio::io::AsyncWriteExt;
    use tokio::net::{TcpListener, TcpStream};
    use tokio::time::timeout;

    use crate::application::ConnectionHandler;

    fn any_port() -> ListenerConfig {
        ListenerConfig::loopback(0)
    }

    #[tokio::test]
    async fn test_start_resolves_ephemeral_port() {
        let listener = Listener::start(&any_port()).unwrap();
        assert_ne!(listener.local_addr().port(), 0);
        assert!(listener.local_addr().ip().is_loopback());
    }

    #[tokio::test]
    async fn test_port_in_use_is_bind_error() {
        // Arrange: occupy a port.
        let first = Listener::start(&any_port()).unwrap();
        let taken = ListenerConfig::loopback(first.local_addr().port());

        // Act
        let result = Listener::start(&taken);

        // Assert
        assert!(matches!(result, Err(ListenerError::Bind { .. })));
    }

    #[tokio::test]
    async fn test_zero_backlog_is_rejected_before_binding() {
        let cfg = ListenerConfig {
            backlog: 0,
            ..any_port()
        };
        assert!(matches!(
            Listener::start(&cfg),
            Err(ListenerError::InvalidConfig(ConfigValidationError::ZeroBacklog))
        ));
    }

    #[tokio::test]
    async fn test_accept_yields_open_connection_with_peer_address() {
        // Arrange
        let mut listener = Listener::start(&any_port()).unwrap();
        let client = TcpStream::connect(listener.local_addr()).await.unwrap();

        // Act
        let conn = listener.accept().await.unwrap();

        // Assert
        assert!(conn.state().is_open());
        assert_eq!(conn.peer_addr(), client.local_addr().unwrap());
        assert_eq!(conn.id(), ConnectionId(1));
    }

    #[tokio::test]
    async fn test_connection_ids_follow_accept_order() {
        let mut listener = Listener::start(&any_port()).unwrap();
        let addr = listener.local_addr();
        let _a = TcpStream::connect(addr).await.unwrap();
        let first = listener.accept().await.unwrap();
        let _b = TcpStream::connect(addr).await.unwrap();
        let second = listener.accept().await.unwrap();

        assert_eq!(first.id(), ConnectionId(1));
        assert_eq!(second.id(), ConnectionId(2));
    }

    #[tokio::test]
    async fn test_stop_unblocks_pending_accept() {
        // Arrange: an accept with no client would block forever.
        let mut listener = Listener::start(&any_port()).unwrap();
        let stop = listener.stop_handle();
        let pending = tokio::spawn(async move { listener.accept().await });

        // Act
        tokio::time::sleep(Duration::from_millis(50)).await;
        stop.stop();

        // Assert
        let result = timeout(Duration::from_secs(2), pending)
            .await
            .expect("accept must unblock after stop")
            .unwrap();
        assert!(matches!(result, Err(ListenerError::Stopped)));
        assert!(stop.is_stopped());
    }

    #[tokio::test]
    async fn test_stop_before_accept_returns_stopped_and_frees_port() {
        // Arrange
        let mut listener = Listener::start(&any_port()).unwrap();
        let port = listener.local_addr().port();
        listener.stop_handle().stop();

        // Act
        let first = listener.accept().await;
        let second = listener.accept().await;

        // Assert: both calls report the stop, and the port can be reused.
        assert!(matches!(first, Err(ListenerError::Stopped)));
        assert!(matches!(second, Err(ListenerError::Stopped)));
        assert!(Listener::start(&ListenerConfig::loopback(port)).is_ok());
    }

    // ── Accept loop against scripted accept results ──────────────────────────

    /// Replays a fixed list of accept results, then reports `Stopped`.
    struct ScriptedSource {
        script: VecDeque<Result<Connection, ListenerError>>,
        stop_tx: watch::Sender<bool>,
        addr: SocketAddr,
    }

    impl AcceptSource for ScriptedSource {
        fn accept(
            &mut self,
        ) -> impl Future<Output = Result<Connection, ListenerError>> + Send + '_ {
            let next = self.script.pop_front().unwrap_or(Err(ListenerError::Stopped));
            async move { next }
        }

        fn stop_signal(&self) -> watch::Receiver<bool> {
            self.stop_tx.subscribe()
        }

        fn close(&mut self) {}

        fn local_addr(&self) -> SocketAddr {
            self.addr
        }
    }

    fn exhausted() -> ListenerError {
        ListenerError::Accept(io::Error::new(io::ErrorKind::Other, "too many open files"))
    }

    /// A server-side connection whose client has already finished sending.
    async fn finished_client(
        server: &TcpListener,
        id: u64,
        keep: &mut Vec<TcpStream>,
    ) -> Connection {
        let mut client = TcpStream::connect(server.local_addr().unwrap()).await.unwrap();
        let (stream, peer) = server.accept().await.unwrap();
        client.shutdown().await.unwrap();
        keep.push(client);
        Connection::new(ConnectionId(id), stream, peer)
    }

    #[tokio::test]
    async fn test_accept_loop_keeps_going_after_transient_accept_errors() {
        // Arrange: errors before, between and after two real connections.
        let server = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let mut clients = Vec::new();
        let first = finished_client(&server, 1, &mut clients).await;
        let second = finished_client(&server, 2, &mut clients).await;
        let (stop_tx, _) = watch::channel(false);
        let source = ScriptedSource {
            script: VecDeque::from(vec![
                Err(exhausted()),
                Ok(first),
                Err(exhausted()),
                Err(exhausted()),
                Ok(second),
                Err(exhausted()),
            ]),
            stop_tx,
            addr: server.local_addr().unwrap(),
        };
        let handler = ConnectionHandler::new(HandlerConfig::default());
        let mut dispatcher = Dispatcher::new(DispatchMode::Sequential, handler);

        // Act
        let accepted = timeout(
            Duration::from_secs(3),
            run_accept_loop(source, &mut dispatcher, Duration::from_secs(1)),
        )
        .await
        .expect("accept loop must reach the end of the script");

        // Assert: every connection after an error was still served.
        assert_eq!(accepted, 2);
    }
}
