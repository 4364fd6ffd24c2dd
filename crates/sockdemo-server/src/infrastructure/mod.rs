//! Infrastructure layer for sockdemo-server.
//!
//! # Responsibilities
//!
//! - Binding and listening on the TCP socket, running the accept loop
//! - Owning accepted sockets and shutting them down
//! - Loading the TOML configuration file
//! - Wiring everything together in [`run_server`]
//!
//! # What does NOT belong here?
//!
//! - The greeting/receive/terminate protocol (that is the application layer)
//! - Message decoding rules (that is `sockdemo-core`)

pub mod network;
pub mod server;
pub mod storage;

pub use server::{run_server, Server};
