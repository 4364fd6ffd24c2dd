//! Listener and handler configuration types.
//!
//! [`ListenerConfig`] describes where the server listens; [`HandlerConfig`]
//! describes what each connection handler does once a client is accepted.
//! Both are plain structs with the demo defaults
//! (loopback, port 50000, backlog 10, 1024-byte receive buffer).
//!
//! The infrastructure layer is responsible for populating these from a TOML
//! file or CLI flags; nothing here reads the environment.

use std::fmt;
use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::str::FromStr;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Demo listening port.
pub const DEFAULT_PORT: u16 = 50000;

/// Demo backlog depth: pending connections the OS queues before `accept`.
pub const DEFAULT_BACKLOG: u32 = 10;

/// Fixed receive buffer capacity per connection, in bytes.
pub const DEFAULT_BUFFER_CAPACITY: usize = 1024;

/// Greeting sent to every client immediately after accept.
pub const DEFAULT_GREETING: &str = "来自服务端消息: hello";

/// Errors returned when a configuration value is unusable.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ConfigValidationError {
    /// A zero-byte buffer would make every receive look like termination.
    #[error("receive buffer capacity must be at least 1 byte")]
    ZeroBufferCapacity,

    /// The OS needs room for at least one pending connection.
    #[error("backlog depth must be at least 1")]
    ZeroBacklog,

    /// A zero timeout fails every receive that is not already ready.
    #[error("idle timeout must be longer than zero (omit it to wait forever)")]
    ZeroIdleTimeout,
}

/// Error returned when a mode string does not name a known variant.
#[derive(Debug, Error, PartialEq, Eq)]
#[error("unknown {kind} '{value}' (expected one of: {expected})")]
pub struct ParseModeError {
    kind: &'static str,
    value: String,
    expected: &'static str,
}

// ── Modes ─────────────────────────────────────────────────────────────────────

/// How a connection handler treats the receive phase.
///
/// Both modes share one code path in the handler; the flag only decides
/// whether the handler loops after the first message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum HandlerMode {
    /// Send the greeting, receive exactly one message, close.
    SingleExchange,
    /// Send the greeting, then receive until the peer sends the termination
    /// signal (an empty message) or the connection fails.
    #[default]
    FramedLoop,
}

impl HandlerMode {
    /// Whether the handler keeps receiving after a non-empty message.
    pub fn loops(self) -> bool {
        matches!(self, HandlerMode::FramedLoop)
    }
}

impl fmt::Display for HandlerMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            HandlerMode::SingleExchange => "single_exchange",
            HandlerMode::FramedLoop => "framed_loop",
        })
    }
}

impl FromStr for HandlerMode {
    type Err = ParseModeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().replace('-', "_").as_str() {
            "single_exchange" | "single" => Ok(HandlerMode::SingleExchange),
            "framed_loop" | "loop" => Ok(HandlerMode::FramedLoop),
            _ => Err(ParseModeError {
                kind: "handler mode",
                value: s.to_string(),
                expected: "single_exchange, framed_loop",
            }),
        }
    }
}

/// How the accept loop hands a new connection to its handler.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DispatchMode {
    /// Serve the connection inline.  The accept loop does not accept the next
    /// client until the current one is closed, so all client service is
    /// serialized.
    Sequential,
    /// Serve each connection on its own task; the accept loop continues
    /// immediately.
    #[default]
    Concurrent,
}

impl fmt::Display for DispatchMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            DispatchMode::Sequential => "sequential",
            DispatchMode::Concurrent => "concurrent",
        })
    }
}

impl FromStr for DispatchMode {
    type Err = ParseModeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "sequential" => Ok(DispatchMode::Sequential),
            "concurrent" => Ok(DispatchMode::Concurrent),
            _ => Err(ParseModeError {
                kind: "dispatch mode",
                value: s.to_string(),
                expected: "sequential, concurrent",
            }),
        }
    }
}

// ── ListenerConfig ────────────────────────────────────────────────────────────

/// Where and how the server listens.  Immutable once the listener starts.
///
/// # Example
///
/// ```rust
/// use sockdemo_core::ListenerConfig;
///
/// let cfg = ListenerConfig::default();
/// assert_eq!(cfg.socket_addr().to_string(), "127.0.0.1:50000");
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ListenerConfig {
    /// Interface to bind: loopback for local demos, `0.0.0.0` for all.
    pub bind_address: IpAddr,
    /// TCP port.  `0` lets the OS pick one (used by tests).
    pub port: u16,
    /// Maximum number of pending, not-yet-accepted connections.
    pub backlog: u32,
}

impl ListenerConfig {
    /// Loopback listener on `port` with the default backlog.
    pub fn loopback(port: u16) -> Self {
        Self {
            port,
            ..Self::default()
        }
    }

    /// The full address the listener binds to.
    pub fn socket_addr(&self) -> SocketAddr {
        SocketAddr::new(self.bind_address, self.port)
    }

    /// Checks the values the OS cannot work with.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigValidationError::ZeroBacklog`] for a zero backlog.
    pub fn validate(&self) -> Result<(), ConfigValidationError> {
        if self.backlog == 0 {
            return Err(ConfigValidationError::ZeroBacklog);
        }
        Ok(())
    }
}

impl Default for ListenerConfig {
    fn default() -> Self {
        Self {
            bind_address: IpAddr::V4(Ipv4Addr::LOCALHOST),
            port: DEFAULT_PORT,
            backlog: DEFAULT_BACKLOG,
        }
    }
}

// ── HandlerConfig ─────────────────────────────────────────────────────────────

/// Per-connection protocol settings, shared read-only by every handler.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HandlerConfig {
    /// Text sent to the client right after accept.
    pub greeting: String,
    /// Size of the receive buffer.  A single receive never yields more than
    /// this many bytes; longer sends arrive split across receives.
    pub buffer_capacity: usize,
    /// Single exchange or loop-until-termination.
    pub mode: HandlerMode,
    /// Maximum time a receive may wait.  `None` blocks indefinitely.
    pub idle_timeout: Option<Duration>,
}

impl HandlerConfig {
    /// Checks the values the handler cannot work with.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigValidationError::ZeroBufferCapacity`] when the buffer
    /// capacity is zero and [`ConfigValidationError::ZeroIdleTimeout`] when
    /// an idle timeout is set to zero.
    pub fn validate(&self) -> Result<(), ConfigValidationError> {
        if self.buffer_capacity == 0 {
            return Err(ConfigValidationError::ZeroBufferCapacity);
        }
        if self.idle_timeout.is_some_and(|t| t.is_zero()) {
            return Err(ConfigValidationError::ZeroIdleTimeout);
        }
        Ok(())
    }
}

impl Default for HandlerConfig {
    fn default() -> Self {
        Self {
            greeting: DEFAULT_GREETING.to_string(),
            buffer_capacity: DEFAULT_BUFFER_CAPACITY,
            mode: HandlerMode::default(),
            idle_timeout: None,
        }
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
