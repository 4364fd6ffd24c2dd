//! Network infrastructure for the server.
//!
//! - `listener` – binds the listening socket and runs the accept loop.
//! - `connection` – one accepted socket and its Open/Closing/Closed state.

pub mod connection;
pub mod listener;

pub use connection::{Connection, ConnectionError, ConnectionId};
pub use listener::{Listener, ListenerError, StopHandle};
