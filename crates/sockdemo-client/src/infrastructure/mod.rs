//! Infrastructure layer for sockdemo-client.
//!
//! - `simulator` – [`ClientSimulator`](simulator::ClientSimulator): one TCP
//!   conversation with the server, start to finish.

pub mod simulator;
