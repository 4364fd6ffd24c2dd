//! Domain entities for sockdemo.
//!
//! This module contains pure business logic with no infrastructure
//! dependencies: no sockets, no async runtime, no file system.
//!
//! Code in outer layers (the server's listener and handler, the client
//! simulator) depends on the domain, but the domain never depends on them.
//! This makes the protocol rules easy to unit-test in isolation.

/// Listener and handler configuration, plus the two operating-mode flags.
pub mod config;

/// Decoding of one receive call into a [`message::Inbound`].
pub mod message;

/// Connection and handler state machines.
pub mod state;
