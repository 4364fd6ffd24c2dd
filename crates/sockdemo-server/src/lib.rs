//! sockdemo-server library entry point.
//!
//! Re-exports all public modules so that integration tests in `tests/`
//! and the binary entry point in `main.rs` share the same module tree.
//!
//! # What does the server do? (for beginners)
//!
//! 1. Binds a TCP socket and starts listening with a fixed backlog.
//! 2. Accepts clients one at a time in an accept loop.
//! 3. Hands each accepted connection to the dispatcher, which either serves
//!    it inline (`sequential`) or on its own Tokio task (`concurrent`).
//! 4. The connection handler sends a greeting, then reads whatever the
//!    client sends until the client signals termination with an empty
//!    message, then shuts the socket down in both directions.
//!
//! ```text
//! Listener::accept ──► Dispatcher::handle ──► ConnectionHandler::serve
//!                                               Greeting → Receiving → Closed
//! ```

/// Application layer: the per-connection protocol and its dispatch.
pub mod application;

/// Infrastructure layer: sockets, config file, server runner.
pub mod infrastructure;
