//! Server runner: wires the listener, dispatcher and handler together.
//!
//! [`Server::bind`] turns a [`ServerConfig`] into a bound listener plus a
//! dispatcher.  [`Server::run`] drives the accept loop until the listener is
//! stopped, then drains in-flight connections for the configured grace
//! period.  [`run_server`] is the binary's entry point: bind, run, and stop
//! when the supplied shutdown future (Ctrl+C in `main.rs`) resolves.

use std::future::Future;
use std::net::SocketAddr;
use std::time::Duration;

use anyhow::Context;
use tracing::info;

use crate::application::{ConnectionHandler, Dispatcher, EventSink};
use crate::infrastructure::network::{Listener, StopHandle};
use crate::infrastructure::storage::config::ServerConfig;

/// A bound server that has not started accepting yet.
pub struct Server {
    listener: Listener,
    dispatcher: Dispatcher,
    shutdown_grace: Duration,
}

impl Server {
    /// Validates `config`, binds the listening socket and builds the
    /// dispatcher.  No client is accepted until [`run`](Self::run).
    ///
    /// # Errors
    ///
    /// Fails on an invalid bind address, an unusable handler configuration,
    /// or when the OS refuses the bind.
    pub fn bind(config: &ServerConfig) -> anyhow::Result<Self> {
        Self::bind_with_events(config, EventSink::disabled())
    }

    /// Like [`bind`](Self::bind), reporting every connection's lifecycle to
    /// `events`.
    pub fn bind_with_events(config: &ServerConfig, events: EventSink) -> anyhow::Result<Self> {
        let listener_config = config
            .listener_config()
            .context("invalid [listener] configuration")?;
        let handler_config = config.handler_config();
        handler_config
            .validate()
            .context("invalid [handler] configuration")?;

        let listener = Listener::start(&listener_config)
            .with_context(|| format!("could not start listener on {}", listener_config.socket_addr()))?;

        info!(
            "handler mode {}, dispatch {}",
            handler_config.mode, config.server.dispatch
        );
        let handler = ConnectionHandler::new(handler_config).with_events(events);
        let dispatcher = Dispatcher::new(config.server.dispatch, handler);

        Ok(Self {
            listener,
            dispatcher,
            shutdown_grace: config.shutdown_grace(),
        })
    }

    pub fn local_addr(&self) -> SocketAddr {
        self.listener.local_addr()
    }

    pub fn stop_handle(&self) -> StopHandle {
        self.listener.stop_handle()
    }

    /// Accepts clients until stopped, then waits for open connections.
    ///
    /// Returns the number of connections accepted.
    pub async fn run(self) -> u64 {
        let Self {
            listener,
            mut dispatcher,
            shutdown_grace,
        } = self;

        let accepted = listener.accept_loop(&mut dispatcher, shutdown_grace).await;
        dispatcher.drain(shutdown_grace).await;
        accepted
    }
}

/// Binds according to `config` and serves until `shutdown` resolves.
///
/// # Errors
///
/// Returns an error if the server cannot be bound (see [`Server::bind`]).
/// Per-connection failures are logged and never end the server.
pub async fn run_server<F>(config: &ServerConfig, shutdown: F) -> anyhow::Result<()>
where
    F: Future<Output = ()> + Send + 'static,
{
    let server = Server::bind(config)?;
    let stop = server.stop_handle();

    tokio::spawn(async move {
        shutdown.await;
        stop.stop();
    });

    let accepted = server.run().await;
    info!("server finished after {accepted} connection(s)");
    Ok(())
}

// ── Tests ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::io::{AsyncReadExt, AsyncWriteExt};
    use tokio::net::TcpStream;
    use tokio::sync::oneshot;
    use tokio_test::assert_ok;

    fn ephemeral() -> ServerConfig {
        let mut cfg = ServerConfig::default();
        cfg.listener.port = 0;
        cfg.server.shutdown_grace_secs = 1;
        cfg
    }

    #[test]
    fn test_bind_rejects_zero_buffer_capacity() {
        let mut cfg = ephemeral();
        cfg.handler.buffer_capacity = 0;
        assert!(Server::bind(&cfg).is_err());
    }

    #[test]
    fn test_bind_rejects_zero_idle_timeout() {
        let mut cfg = ephemeral();
        cfg.handler.idle_timeout_secs = Some(0);
        let err = Server::bind(&cfg).err().expect("bind must fail");
        assert!(format!("{err:#}").contains("idle timeout"));
    }

    #[test]
    fn test_bind_rejects_host_name_address() {
        let mut cfg = ephemeral();
        cfg.listener.bind_address = "example.invalid".to_string();
        let err = Server::bind(&cfg).err().expect("bind must fail");
        assert!(err.to_string().contains("[listener]"));
    }

    #[tokio::test]
    async fn test_run_server_stops_when_shutdown_resolves() {
        // Arrange
        let (tx, rx) = oneshot::channel::<()>();
        let cfg = ephemeral();

        // Act
        let task = tokio::spawn(async move {
            run_server(&cfg, async move {
                let _ = rx.await;
            })
            .await
        });
        tokio::time::sleep(Duration::from_millis(50)).await;
        tx.send(()).unwrap();

        // Assert
        let result = tokio::time::timeout(Duration::from_secs(3), task)
            .await
            .expect("server must stop")
            .unwrap();
        assert_ok!(result);
    }

    #[tokio::test]
    async fn test_server_greets_client_and_counts_accepts() {
        // Arrange
        let server = Server::bind(&ephemeral()).unwrap();
        let addr = server.local_addr();
        let stop = server.stop_handle();
        let run = tokio::spawn(server.run());

        // Act
        let mut client = TcpStream::connect(addr).await.unwrap();
        let mut buf = [0u8; 64];
        let n = client.read(&mut buf).await.unwrap();
        client.write_all(b"world").await.unwrap();
        client.shutdown().await.unwrap();
        tokio::time::sleep(Duration::from_millis(50)).await;
        stop.stop();

        // Assert
        assert_eq!(
            std::str::from_utf8(&buf[..n]).unwrap(),
            sockdemo_core::DEFAULT_GREETING
        );
        let accepted = tokio::time::timeout(Duration::from_secs(3), run)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(accepted, 1);
    }
}
