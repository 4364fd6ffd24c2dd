//! # sockdemo-core
//!
//! Shared library for sockdemo containing the domain types of the
//! connection-oriented TCP exchange and the lifecycle contract of the external
//! HTTP self-hosting collaborator.
//!
//! This crate is used by both the server and the client simulator.
//! It has zero dependencies on sockets, runtimes, or UI frameworks.
//!
//! # Architecture overview (for beginners)
//!
//! sockdemo is a small TCP exchange: a server greets each client that
//! connects, then reads whatever the client sends until the client signals
//! that it is done.  There is no framing on the wire; a "message" is simply
//! whatever byte range one receive call returns.
//!
//! This crate (`sockdemo-core`) is the shared foundation.  It defines:
//!
//! - **`domain`** – Configuration (`ListenerConfig`, `HandlerConfig`), the
//!   decoded `Message` and its termination rule, and the two state machines
//!   (`ConnectionState`, `HandlerState`) the server drives per connection.
//!
//! - **`hosting`** – The `SelfHostService` start/close contract of the HTTP
//!   self-hosting component and `HostToggle`, the two-button controller that
//!   drives it.

pub mod domain;
pub mod hosting;

// Re-export the most-used types at the crate root so callers can write
// `sockdemo_core::Message` instead of `sockdemo_core::domain::message::Message`.
pub use domain::config::{
    ConfigValidationError, DispatchMode, HandlerConfig, HandlerMode, ListenerConfig,
    ParseModeError, DEFAULT_BACKLOG, DEFAULT_BUFFER_CAPACITY, DEFAULT_GREETING, DEFAULT_PORT,
};
pub use domain::message::{Inbound, Message};
pub use domain::state::{ConnectionState, HandlerEvent, HandlerState, TransitionError};
pub use hosting::{HostError, HostHandle, HostState, HostToggle, SelfHostService};
