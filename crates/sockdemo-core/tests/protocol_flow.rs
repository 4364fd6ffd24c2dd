//! Integration tests for the core domain types used together.
//!
//! # Purpose
//!
//! These tests walk the public API the way the server and a hosting front end
//! use it, without any sockets:
//!
//! - A handler state machine fed by decoded receives, for both handler modes.
//! - The self-hosting start/close toggle driven against an in-memory service
//!   that behaves like a real host (ports in use, privileged ports).

use std::collections::HashSet;
use std::sync::Mutex;

use async_trait::async_trait;
use sockdemo_core::{
    HandlerEvent, HandlerMode, HandlerState, HostError, HostHandle, HostState, HostToggle, Inbound,
    SelfHostService,
};

// ── Handler state machine driven by receives ─────────────────────────────────

/// Runs the handler transitions for a sequence of raw receives, the way the
/// connection handler does, and returns the final state plus the texts seen.
fn drive(mode: HandlerMode, receives: &[&[u8]]) -> (HandlerState, Vec<String>) {
    let mut state = HandlerState::default();
    state = state.on(HandlerEvent::GreetingSent).unwrap();

    let mut texts = Vec::new();
    for raw in receives {
        match Inbound::from_received(raw) {
            Inbound::Termination => {
                state = state.on(HandlerEvent::TerminationReceived).unwrap();
            }
            Inbound::Message(message) => {
                texts.push(message.into_text());
                let event = if mode.loops() {
                    HandlerEvent::MessageReceived
                } else {
                    HandlerEvent::ExchangeComplete
                };
                state = state.on(event).unwrap();
            }
        }
        if state.is_terminal() {
            break;
        }
    }
    (state, texts)
}

#[test]
fn test_framed_loop_consumes_until_empty_receive() {
    // Arrange
    let receives: [&[u8]; 4] = [b"world", b"world", b"", b"never read"];

    // Act
    let (state, texts) = drive(HandlerMode::FramedLoop, &receives);

    // Assert
    assert_eq!(state, HandlerState::Closed);
    assert_eq!(texts, vec!["world", "world"]);
}

#[test]
fn test_single_exchange_stops_after_first_message() {
    let receives: [&[u8]; 2] = [b"first", b"second"];

    let (state, texts) = drive(HandlerMode::SingleExchange, &receives);

    assert_eq!(state, HandlerState::Closed);
    assert_eq!(texts, vec!["first"]);
}

#[test]
fn test_framed_loop_without_termination_keeps_receiving() {
    let receives: [&[u8]; 3] = [b"a", b"b", b"c"];

    let (state, texts) = drive(HandlerMode::FramedLoop, &receives);

    assert_eq!(state, HandlerState::Receiving);
    assert_eq!(texts.len(), 3);
}

#[test]
fn test_receive_before_greeting_is_rejected() {
    let err = HandlerState::Greeting
        .on(HandlerEvent::MessageReceived)
        .unwrap_err();
    assert_eq!(err.from, HandlerState::Greeting);
}

// ── Hosting toggle against an in-memory host ─────────────────────────────────

/// Host that refuses privileged ports and ports already in use.
#[derive(Default)]
struct InMemoryHost {
    bound: Mutex<HashSet<u16>>,
}

#[async_trait]
impl SelfHostService for InMemoryHost {
    async fn start(&self, port: u16) -> Result<HostHandle, HostError> {
        if port < 1024 {
            return Err(HostError::PermissionDenied { port });
        }
        let mut bound = self.bound.lock().unwrap();
        if !bound.insert(port) {
            return Err(HostError::Failed(format!("port {port} already in use")));
        }
        Ok(HostHandle(u64::from(port)))
    }

    async fn close(&self, handle: HostHandle) -> Result<(), HostError> {
        let port = handle.0 as u16;
        if self.bound.lock().unwrap().remove(&port) {
            Ok(())
        } else {
            Err(HostError::Failed(format!("no host on port {port}")))
        }
    }
}

#[tokio::test]
async fn test_toggle_start_close_start_again() {
    // Arrange
    let mut toggle = HostToggle::new(InMemoryHost::default());

    // Act / Assert: start.
    toggle.start(8080).await.unwrap();
    assert_eq!(
        toggle.state(),
        HostState::Running {
            port: 8080,
            handle: HostHandle(8080)
        }
    );
    assert!(!toggle.can_start());
    assert!(toggle.can_close());

    // Close, then the same port can be hosted again.
    toggle.close().await.unwrap();
    assert_eq!(toggle.state(), HostState::Stopped);
    toggle.start(8080).await.unwrap();
    assert!(toggle.can_close());
}

#[tokio::test]
async fn test_toggle_privileged_port_reports_permission_denied() {
    let mut toggle = HostToggle::new(InMemoryHost::default());

    let err = toggle.start(80).await.unwrap_err();

    assert_eq!(err, HostError::PermissionDenied { port: 80 });
    assert_eq!(toggle.state(), HostState::Stopped);
    assert!(toggle.can_start());
}

#[tokio::test]
async fn test_toggle_rejects_double_start_without_touching_host() {
    let mut toggle = HostToggle::new(InMemoryHost::default());
    toggle.start(9000).await.unwrap();

    let err = toggle.start(9001).await.unwrap_err();

    assert!(matches!(err, HostError::InvalidState { operation: "start", .. }));
    assert_eq!(
        toggle.state(),
        HostState::Running {
            port: 9000,
            handle: HostHandle(9000)
        }
    );
}

#[tokio::test]
async fn test_toggle_close_while_stopped_is_invalid() {
    let mut toggle = HostToggle::new(InMemoryHost::default());

    let err = toggle.close().await.unwrap_err();

    assert!(matches!(err, HostError::InvalidState { operation: "close", .. }));
}
