//! Decoding of received bytes into messages.
//!
//! # Wire format
//!
//! There is no framing on the wire: no length prefix, no delimiter.  A
//! message is exactly the byte range one receive call returned.  Two sends
//! that arrive close together may be returned by a single receive, and one
//! long send may be split across several; the sender spaces its sends out to
//! keep the boundaries intact.
//!
//! The receiver must only ever decode the bytes the receive call actually
//! wrote.  Decoding the whole buffer would turn stale or zeroed trailing
//! bytes into payload, so callers pass `&buf[..n]`, never `&buf`.
//!
//! # Termination
//!
//! A message that decodes to the empty string is the termination signal.  On
//! TCP an empty send puts nothing on the wire, so in practice the receiver
//! observes it as a zero-byte read caused by the peer shutting down its
//! write side.

/// The text decoded from one receive call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Message {
    text: String,
    byte_len: usize,
}

impl Message {
    /// Decodes `bytes` as UTF-8.
    ///
    /// Invalid sequences are replaced with U+FFFD rather than rejected, so a
    /// multi-byte character split across two receives shows up as
    /// replacement characters on both sides of the split.
    pub fn decode(bytes: &[u8]) -> Self {
        Self {
            text: String::from_utf8_lossy(bytes).into_owned(),
            byte_len: bytes.len(),
        }
    }

    /// The decoded text.
    pub fn text(&self) -> &str {
        &self.text
    }

    /// Number of bytes the receive call returned for this message.
    pub fn byte_len(&self) -> usize {
        self.byte_len
    }

    /// Whether this message is the termination signal.
    pub fn is_termination(&self) -> bool {
        self.byte_len == 0 || self.text.is_empty()
    }

    /// Consumes the message, returning the decoded text.
    pub fn into_text(self) -> String {
        self.text
    }
}

/// What one receive call produced.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Inbound {
    /// A non-empty message to process.
    Message(Message),
    /// The peer asked to end the exchange.
    Termination,
}

impl Inbound {
    /// Classifies the bytes returned by a single receive call.
    ///
    /// `received` must be exactly the filled prefix of the receive buffer.
    ///
    /// ```rust
    /// use sockdemo_core::Inbound;
    ///
    /// let mut buf = [0u8; 16];
    /// buf[..5].copy_from_slice(b"world");
    /// let n = 5;
    ///
    /// match Inbound::from_received(&buf[..n]) {
    ///     Inbound::Message(msg) => assert_eq!(msg.text(), "world"),
    ///     Inbound::Termination => unreachable!(),
    /// }
    /// assert_eq!(Inbound::from_received(&buf[..0]), Inbound::Termination);
    /// ```
    pub fn from_received(received: &[u8]) -> Self {
        let message = Message::decode(received);
        if message.is_termination() {
            Inbound::Termination
        } else {
            Inbound::Message(message)
        }
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
