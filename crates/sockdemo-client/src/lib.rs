//! sockdemo-client library entry point.
//!
//! The client simulator is the counterpart of `sockdemo-server`: it connects,
//! waits for the greeting, sends a configurable number of messages, then
//! sends the termination signal and closes.  It exists so the server can be
//! exercised from tests and from the command line.
//!
//! # Termination on a stream socket (for beginners)
//!
//! The protocol ends a conversation with an *empty* message.  TCP cannot
//! carry a zero-byte segment as data, so writing an empty buffer sends
//! nothing.  What the server actually observes is the client shutting down
//! its write direction: the next `read` on the server returns `0` bytes,
//! which decodes to the empty message.  The simulator therefore always
//! follows the empty write with a write-side shutdown.

/// Infrastructure layer: the TCP client simulator.
pub mod infrastructure;

pub use infrastructure::simulator::{
    run, single_exchange, ClientError, ClientSimulator, SimulationReport, SimulatorConfig,
};
