//! TOML-based configuration for the server binary.
//!
//! # File layout
//!
//! ```toml
//! [listener]
//! bind_address = "127.0.0.1"
//! port = 50000
//! backlog = 10
//!
//! [handler]
//! greeting = "来自服务端消息: hello"
//! buffer_capacity = 1024
//! mode = "framed_loop"          # or "single_exchange"
//! # idle_timeout_secs = 30      # absent = wait forever
//!
//! [server]
//! dispatch = "concurrent"       # or "sequential"
//! log_level = "info"
//! shutdown_grace_secs = 5
//! ```
//!
//! # Serde default values
//!
//! Every field carries `#[serde(default = "...")]`, so an empty file, a file
//! with only some tables, or no file at all yields a working configuration.
//! The defaults are the demo values from `sockdemo_core`.

use std::net::IpAddr;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use sockdemo_core::{
    DispatchMode, HandlerConfig, HandlerMode, ListenerConfig, DEFAULT_BACKLOG,
    DEFAULT_BUFFER_CAPACITY, DEFAULT_GREETING, DEFAULT_PORT,
};
use thiserror::Error;

/// Error type for configuration file operations.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// A file system I/O error other than "not found".
    #[error("I/O error accessing config at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// The TOML content could not be parsed.
    #[error("failed to parse config TOML: {0}")]
    Parse(#[from] toml::de::Error),

    /// The config could not be serialized to TOML.
    #[error("failed to serialize config: {0}")]
    Serialize(#[from] toml::ser::Error),

    /// `bind_address` is not an IP address literal.
    #[error("invalid bind address '{0}'")]
    InvalidAddress(String),
}

// ── Config schema types ───────────────────────────────────────────────────────

/// Top-level server configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct ServerConfig {
    #[serde(default)]
    pub listener: ListenerSection,
    #[serde(default)]
    pub handler: HandlerSection,
    #[serde(default)]
    pub server: RuntimeSection,
}

/// `[listener]`: where to listen.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ListenerSection {
    /// IP address to bind.  `"0.0.0.0"` binds all interfaces.
    #[serde(default = "default_bind_address")]
    pub bind_address: String,
    #[serde(default = "default_port")]
    pub port: u16,
    #[serde(default = "default_backlog")]
    pub backlog: u32,
}

/// `[handler]`: what each connection handler does.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct HandlerSection {
    #[serde(default = "default_greeting")]
    pub greeting: String,
    #[serde(default = "default_buffer_capacity")]
    pub buffer_capacity: usize,
    #[serde(default)]
    pub mode: HandlerMode,
    /// Seconds a handler waits for the next message before giving up.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub idle_timeout_secs: Option<u64>,
}

/// `[server]`: process-level behaviour.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct RuntimeSection {
    #[serde(default)]
    pub dispatch: DispatchMode,
    /// `tracing` level used when `RUST_LOG` is unset.
    #[serde(default = "default_log_level")]
    pub log_level: String,
    /// Seconds to wait for open connections after Ctrl+C.
    #[serde(default = "default_shutdown_grace_secs")]
    pub shutdown_grace_secs: u64,
}

// ── Default helpers ───────────────────────────────────────────────────────────

fn default_bind_address() -> String {
    "127.0.0.1".to_string()
}
fn default_port() -> u16 {
    DEFAULT_PORT
}
fn default_backlog() -> u32 {
    DEFAULT_BACKLOG
}
fn default_greeting() -> String {
    DEFAULT_GREETING.to_string()
}
fn default_buffer_capacity() -> usize {
    DEFAULT_BUFFER_CAPACITY
}
fn default_log_level() -> String {
    "info".to_string()
}
fn default_shutdown_grace_secs() -> u64 {
    5
}

impl Default for ListenerSection {
    fn default() -> Self {
        Self {
            bind_address: default_bind_address(),
            port: default_port(),
            backlog: default_backlog(),
        }
    }
}

impl Default for HandlerSection {
    fn default() -> Self {
        Self {
            greeting: default_greeting(),
            buffer_capacity: default_buffer_capacity(),
            mode: HandlerMode::default(),
            idle_timeout_secs: None,
        }
    }
}

impl Default for RuntimeSection {
    fn default() -> Self {
        Self {
            dispatch: DispatchMode::default(),
            log_level: default_log_level(),
            shutdown_grace_secs: default_shutdown_grace_secs(),
        }
    }
}

// ── Conversions ───────────────────────────────────────────────────────────────

impl ServerConfig {
    /// The `[listener]` table as a domain [`ListenerConfig`].
    ///
    /// # Errors
    ///
    /// [`ConfigError::InvalidAddress`] when `bind_address` is not an IP
    /// literal.  Host names are not resolved.
    pub fn listener_config(&self) -> Result<ListenerConfig, ConfigError> {
        let bind_address: IpAddr = self
            .listener
            .bind_address
            .trim()
            .parse()
            .map_err(|_| ConfigError::InvalidAddress(self.listener.bind_address.clone()))?;
        Ok(ListenerConfig {
            bind_address,
            port: self.listener.port,
            backlog: self.listener.backlog,
        })
    }

    /// The `[handler]` table as a domain [`HandlerConfig`].
    pub fn handler_config(&self) -> HandlerConfig {
        HandlerConfig {
            greeting: self.handler.greeting.clone(),
            buffer_capacity: self.handler.buffer_capacity,
            mode: self.handler.mode,
            idle_timeout: self.handler.idle_timeout_secs.map(Duration::from_secs),
        }
    }

    pub fn shutdown_grace(&self) -> Duration {
        Duration::from_secs(self.server.shutdown_grace_secs)
    }

    /// Renders the configuration as pretty TOML.
    ///
    /// # Errors
    ///
    /// [`ConfigError::Serialize`] if serialization fails.
    pub fn to_toml(&self) -> Result<String, ConfigError> {
        Ok(toml::to_string_pretty(self)?)
    }
}

// ── Loading ───────────────────────────────────────────────────────────────────

/// Parses a configuration from TOML text.
///
/// # Errors
///
/// [`ConfigError::Parse`] if the TOML is malformed or a value has the wrong
/// type (for example an unknown `mode`).
pub fn parse_config(content: &str) -> Result<ServerConfig, ConfigError> {
    Ok(toml::from_str(content)?)
}

/// Loads the configuration at `path`, returning [`ServerConfig::default()`]
/// if the file does not exist.
///
/// # Errors
///
/// Returns [`ConfigError::Io`] for file-system errors other than "not found",
/// and [`ConfigError::Parse`] if the TOML is malformed.
pub fn load_config(path: &Path) -> Result<ServerConfig, ConfigError> {
    match std::fs::read_to_string(path) {
        Ok(content) => parse_config(&content),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(ServerConfig::default()),
        Err(e) => Err(ConfigError::Io {
            path: path.to_path_buf(),
            source: e,
        }),
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
