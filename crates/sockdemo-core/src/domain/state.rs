//! Connection and handler state machines.
//!
//! # Connection lifecycle
//!
//! ```text
//! Open ──► Closing ──► Closed
//! ```
//!
//! - `Open`: accepted, owned by its handler, usable for I/O.
//! - `Closing`: the handler decided to end the connection (termination
//!   signal, I/O error, or loop completion); shutdown is in progress.
//! - `Closed`: both directions were shut down and the socket released.  The
//!   connection must never be used again.
//!
//! # Handler lifecycle
//!
//! ```text
//! Greeting ──► Receiving ──► Closed
//!     │                        ▲
//!     └────────────────────────┘  (greeting send failed)
//! ```
//!
//! `Closed` is terminal: once there, the handler never receives again.

use thiserror::Error;

/// Error returned by an invalid state transition.
#[derive(Debug, Error, PartialEq, Eq)]
#[error("invalid transition from {from:?} on {event:?}")]
pub struct TransitionError {
    pub from: HandlerState,
    pub event: HandlerEvent,
}

/// Lifecycle of one accepted connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ConnectionState {
    #[default]
    Open,
    Closing,
    Closed,
}

impl ConnectionState {
    /// Whether I/O is still allowed.
    pub fn is_open(self) -> bool {
        matches!(self, ConnectionState::Open)
    }

    /// Whether the connection has been fully released.
    pub fn is_closed(self) -> bool {
        matches!(self, ConnectionState::Closed)
    }
}

/// Protocol phase of a connection handler.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum HandlerState {
    /// About to send, or sending, the greeting.
    #[default]
    Greeting,
    /// Waiting for or processing client messages.
    Receiving,
    /// Done.  Terminal.
    Closed,
}

/// Inputs that drive [`HandlerState`] transitions.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HandlerEvent {
    /// The greeting was written in full.
    GreetingSent,
    /// Writing the greeting failed.
    GreetingFailed,
    /// A non-empty message was received and the handler keeps looping.
    MessageReceived,
    /// A non-empty message was received and the exchange is complete
    /// (single-exchange mode).
    ExchangeComplete,
    /// The peer sent the termination signal.
    TerminationReceived,
    /// A receive failed or timed out.
    ReceiveFailed,
}

impl HandlerState {
    /// Applies `event`, returning the next state.
    ///
    /// # Errors
    ///
    /// Returns [`TransitionError`] for events that cannot occur in the
    /// current state, including any event once `Closed` has been reached.
    pub fn on(self, event: HandlerEvent) -> Result<HandlerState, TransitionError> {
        use HandlerEvent::*;
        use HandlerState::*;

        match (self, event) {
            (Greeting, GreetingSent) => Ok(Receiving),
            (Greeting, GreetingFailed) => Ok(Closed),
            (Receiving, MessageReceived) => Ok(Receiving),
            (Receiving, ExchangeComplete | TerminationReceived | ReceiveFailed) => Ok(Closed),
            (from, event) => Err(TransitionError { from, event }),
        }
    }

    /// Whether the handler has finished.
    pub fn is_terminal(self) -> bool {
        matches!(self, HandlerState::Closed)
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
