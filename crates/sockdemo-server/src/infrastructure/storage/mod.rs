//! Storage infrastructure: the server's TOML configuration file.
//!
//! The `config` sub-module reads the file, falls back to defaults when it is
//! absent, and converts the on-disk schema into the domain types
//! ([`ListenerConfig`](sockdemo_core::ListenerConfig),
//! [`HandlerConfig`](sockdemo_core::HandlerConfig)) the rest of the server
//! works with.

pub mod config;
