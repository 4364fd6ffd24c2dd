//! ConnectionHandler: the per-connection protocol.
//!
//! ```text
//! Greeting ──► Receiving ──► Closed
//! ```
//!
//! 1. **Greeting** – send the configured greeting once.  The receive phase
//!    only starts after the send has completed or failed.
//! 2. **Receiving** – one read into the connection's fixed-size buffer, then
//!    decode exactly the bytes that read returned:
//!    - empty → termination signal, go to `Closed`;
//!    - otherwise log the message and, in `FramedLoop` mode, read again; in
//!      `SingleExchange` mode go to `Closed`.
//! 3. **Closed** – shut the socket down in both directions and release it.
//!
//! There is no reassembly: one read is one message.  A sender that writes
//! twice in quick succession may have both writes reported as one message,
//! and a write longer than the buffer is reported in pieces.
//!
//! Any send or receive failure skips straight to `Closed`.  The error is
//! returned from [`ConnectionHandler::serve`] and never reaches the listener.

use std::net::SocketAddr;

use sockdemo_core::{HandlerConfig, HandlerEvent, HandlerState, Inbound};
use tokio::time::timeout;
use tracing::{debug, info};

use crate::application::events::{CloseReason, EventSink, ServerEvent};
use crate::infrastructure::network::{Connection, ConnectionError, ConnectionId};

/// Summary of a connection that ended without error.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServeOutcome {
    pub id: ConnectionId,
    pub peer: SocketAddr,
    pub messages: usize,
    pub reason: CloseReason,
}

/// Runs the greeting/receive/close protocol on one connection at a time.
///
/// The handler itself is immutable and can be shared (behind an `Arc`) by
/// every worker; all per-connection state lives in [`serve`](Self::serve).
#[derive(Debug, Clone)]
pub struct ConnectionHandler {
    config: HandlerConfig,
    events: EventSink,
}

impl ConnectionHandler {
    pub fn new(config: HandlerConfig) -> Self {
        Self {
            config,
            events: EventSink::disabled(),
        }
    }

    /// Reports events for every connection this handler serves to `events`.
    pub fn with_events(mut self, events: EventSink) -> Self {
        self.events = events;
        self
    }

    pub fn config(&self) -> &HandlerConfig {
        &self.config
    }

    pub fn events(&self) -> &EventSink {
        &self.events
    }

    /// Serves `connection` until it reaches `Closed`.
    ///
    /// The connection is always closed before this returns, whatever the
    /// outcome.
    ///
    /// # Errors
    ///
    /// Returns the [`ConnectionError`] that aborted the exchange.  A failed
    /// shutdown after an otherwise clean exchange is logged, not returned.
    pub async fn serve(&self, connection: Connection) -> Result<ServeOutcome, ConnectionError> {
        let mut connection = connection.with_receive_capacity(self.config.buffer_capacity);
        let id = connection.id();
        let peer = connection.peer_addr();
        let mut messages = 0usize;

        let result = self.exchange(&mut connection, &mut messages).await;

        if let Err(e) = connection.close() {
            debug!("connection {id} ({peer}): {e}");
        }

        let reason = match &result {
            Ok(reason) => reason.clone(),
            Err(e) => CloseReason::Failed(e.to_string()),
        };
        self.events.emit(ServerEvent::Closed {
            id,
            peer,
            reason,
            messages,
        });

        result.map(|reason| ServeOutcome {
            id,
            peer,
            messages,
            reason,
        })
    }

    /// Greeting and receive phases.  Returns why the exchange ended.
    async fn exchange(
        &self,
        connection: &mut Connection,
        messages: &mut usize,
    ) -> Result<CloseReason, ConnectionError> {
        let id = connection.id();
        let peer = connection.peer_addr();
        let mut state = HandlerState::Greeting;

        // ── Greeting ─────────────────────────────────────────────────────────
        if let Err(e) = connection.send(self.config.greeting.as_bytes()).await {
            advance(&mut state, HandlerEvent::GreetingFailed, id)?;
            return Err(e);
        }
        advance(&mut state, HandlerEvent::GreetingSent, id)?;
        info!("connection {id}: sent greeting to {peer}: {}", self.config.greeting);
        self.events.emit(ServerEvent::GreetingSent { id });

        // ── Receiving ────────────────────────────────────────────────────────
        loop {
            let inbound = match self.receive_one(connection).await {
                Ok(inbound) => inbound,
                Err(e) => {
                    advance(&mut state, HandlerEvent::ReceiveFailed, id)?;
                    return Err(e);
                }
            };

            match inbound {
                Inbound::Termination => {
                    advance(&mut state, HandlerEvent::TerminationReceived, id)?;
                    info!("connection {id}: {peer} sent termination signal");
                    return Ok(CloseReason::Terminated);
                }
                Inbound::Message(message) => {
                    *messages += 1;
                    info!("connection {id}: received from {peer}: {}", message.text());
                    self.events.emit(ServerEvent::MessageReceived {
                        id,
                        peer,
                        text: message.into_text(),
                    });

                    if self.config.mode.loops() {
                        advance(&mut state, HandlerEvent::MessageReceived, id)?;
                    } else {
                        advance(&mut state, HandlerEvent::ExchangeComplete, id)?;
                        return Ok(CloseReason::ExchangeComplete);
                    }
                }
            }
        }
    }

    /// One receive, bounded by the idle timeout when configured.
    async fn receive_one(&self, connection: &mut Connection) -> Result<Inbound, ConnectionError> {
        let received = match self.config.idle_timeout {
            Some(limit) => timeout(limit, connection.receive())
                .await
                .map_err(|_| ConnectionError::IdleTimeout(limit))??,
            None => connection.receive().await?,
        };
        Ok(Inbound::from_received(received))
    }
}

fn advance(
    state: &mut HandlerState,
    event: HandlerEvent,
    id: ConnectionId,
) -> Result<(), ConnectionError> {
    let next = state.on(event)?;
    debug!("connection {id}: {state:?} --{event:?}--> {next:?}");
    *state = next;
    Ok(())
}

// ── Tests ─────────────────────────────────────────────────────────────────────
