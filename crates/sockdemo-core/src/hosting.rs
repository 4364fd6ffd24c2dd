//! Lifecycle contract of the HTTP self-hosting collaborator.
//!
//! The HTTP side of the demo (a self-hosted web API toggled from a desktop
//! window) is not implemented here.  The rest of the system only depends on
//! its start/close lifecycle, expressed as the [`SelfHostService`] trait, and
//! on the two-button behaviour of the window, expressed as [`HostToggle`]:
//!
//! ```text
//!            start(port) ok
//!   Stopped ────────────────► Running { port, handle }
//!      ▲                             │
//!      └──────── close() ok ─────────┘
//! ```
//!
//! A failed `start` leaves the toggle `Stopped`; a failed `close` leaves it
//! `Running` so the caller can retry.  Pressing a button that is disabled in
//! the current state returns [`HostError::InvalidState`] without touching the
//! service.

use async_trait::async_trait;
use thiserror::Error;
use tracing::{info, warn};

/// Errors reported by a [`SelfHostService`] or by [`HostToggle`].
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum HostError {
    /// The OS refused to let the process listen on the port (typically the
    /// process needs elevated rights to register the URL).
    #[error("permission denied while opening port {port}")]
    PermissionDenied { port: u16 },

    /// Any other start or close failure.
    #[error("self-hosting operation failed: {0}")]
    Failed(String),

    /// The requested operation is not available in the current state.
    #[error("cannot {operation} while the host is {state}")]
    InvalidState {
        operation: &'static str,
        state: &'static str,
    },
}

/// Opaque handle to a started host, returned by [`SelfHostService::start`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct HostHandle(pub u64);

/// Start/close lifecycle of an external self-hosting component.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait SelfHostService: Send + Sync {
    /// Opens the host on `port`.
    async fn start(&self, port: u16) -> Result<HostHandle, HostError>;

    /// Closes a host previously returned by [`start`](Self::start).
    async fn close(&self, handle: HostHandle) -> Result<(), HostError>;
}

/// Current state of a [`HostToggle`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HostState {
    Stopped,
    Running { port: u16, handle: HostHandle },
}

impl HostState {
    fn name(&self) -> &'static str {
        match self {
            HostState::Stopped => "stopped",
            HostState::Running { .. } => "running",
        }
    }
}

/// Start/close controller over a [`SelfHostService`].
pub struct HostToggle<S> {
    service: S,
    state: HostState,
}

impl<S: SelfHostService> HostToggle<S> {
    /// Creates a stopped toggle.
    pub fn new(service: S) -> Self {
        Self {
            service,
            state: HostState::Stopped,
        }
    }

    /// Current state.
    pub fn state(&self) -> HostState {
        self.state
    }

    /// Whether `start` is currently allowed (the "start" button is enabled).
    pub fn can_start(&self) -> bool {
        matches!(self.state, HostState::Stopped)
    }

    /// Whether `close` is currently allowed (the "close" button is enabled).
    pub fn can_close(&self) -> bool {
        matches!(self.state, HostState::Running { .. })
    }

    /// Starts the host on `port`.
    ///
    /// # Errors
    ///
    /// Returns [`HostError::InvalidState`] when already running, or the
    /// service's error when the start fails.  The toggle stays `Stopped`.
    pub async fn start(&mut self, port: u16) -> Result<(), HostError> {
        if !self.can_start() {
            return Err(HostError::InvalidState {
                operation: "start",
                state: self.state.name(),
            });
        }

        match self.service.start(port).await {
            Ok(handle) => {
                info!("self-host started on port {port}");
                self.state = HostState::Running { port, handle };
                Ok(())
            }
            Err(e) => {
                warn!("self-host start on port {port} failed: {e}");
                Err(e)
            }
        }
    }

    /// Closes the running host.
    ///
    /// # Errors
    ///
    /// Returns [`HostError::InvalidState`] when not running, or the service's
    /// error when the close fails.  The toggle stays `Running`.
    pub async fn close(&mut self) -> Result<(), HostError> {
        let HostState::Running { port, handle } = self.state else {
            return Err(HostError::InvalidState {
                operation: "close",
                state: self.state.name(),
            });
        };

        match self.service.close(handle).await {
            Ok(()) => {
                info!("self-host on port {port} closed");
                self.state = HostState::Stopped;
                Ok(())
            }
            Err(e) => {
                warn!("self-host close on port {port} failed: {e}");
                Err(e)
            }
        }
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
