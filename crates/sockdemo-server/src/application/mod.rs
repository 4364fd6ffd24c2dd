//! Application layer for the server.
//!
//! Use cases:
//! - `serve_connection` – [`ConnectionHandler`]: greeting, receive loop,
//!   termination, close.
//! - `dispatch` – [`Dispatcher`]: sequential or task-per-connection service.
//! - `events` – [`ServerEvent`]s reported to an optional observer.

pub mod dispatch;
pub mod events;
pub mod serve_connection;

pub use dispatch::Dispatcher;
pub use events::{CloseReason, EventSink, ServerEvent};
pub use serve_connection::{ConnectionHandler, ServeOutcome};
