//! Observable server events.
//!
//! Handlers report what happens on their connection through an
//! [`EventSink`].  The sink is a cloned unbounded channel sender: each
//! handler owns its own clone, so handlers still share no mutable state, and
//! a slow or absent observer never stalls a receive loop.

use std::net::SocketAddr;

use tokio::sync::mpsc;

use crate::infrastructure::network::ConnectionId;

/// Why a connection reached `Closed`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CloseReason {
    /// The peer sent the termination signal.
    Terminated,
    /// Single-exchange mode finished its one message.
    ExchangeComplete,
    /// An I/O error or timeout aborted the connection.
    Failed(String),
}

/// Something that happened on a connection.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ServerEvent {
    /// The listener accepted a connection and handed it to the dispatcher.
    Accepted { id: ConnectionId, peer: SocketAddr },
    /// The greeting was written in full.
    GreetingSent { id: ConnectionId },
    /// One receive call produced a non-empty message.
    MessageReceived {
        id: ConnectionId,
        peer: SocketAddr,
        text: String,
    },
    /// The connection was shut down and released.
    Closed {
        id: ConnectionId,
        peer: SocketAddr,
        reason: CloseReason,
        messages: usize,
    },
}

/// Optional destination for [`ServerEvent`]s.
#[derive(Debug, Clone, Default)]
pub struct EventSink {
    tx: Option<mpsc::UnboundedSender<ServerEvent>>,
}

impl EventSink {
    /// A sink that drops every event.
    pub fn disabled() -> Self {
        Self::default()
    }

    /// Creates a sink and the receiver that observes it.
    pub fn channel() -> (Self, mpsc::UnboundedReceiver<ServerEvent>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self { tx: Some(tx) }, rx)
    }

    /// Reports `event`.  A dropped receiver is ignored.
    pub fn emit(&self, event: ServerEvent) {
        if let Some(tx) = &self.tx {
            let _ = tx.send(event);
        }
    }
}
