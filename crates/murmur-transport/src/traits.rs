//! Transport abstraction traits for Murmur.
//!
//! A [`Connector`] dials the chat server and hands back the two halves of the
//! connection. The halves are driven by separate tasks, so reading never
//! blocks writing.

use async_trait::async_trait;
use thiserror::Error;

/// Transport errors.
#[derive(Debug, Error)]
pub enum TransportError {
    /// Connection was closed.
    #[error("Connection closed")]
    ConnectionClosed,

    /// The server refused the credentials during the handshake.
    #[error("Unauthorized (HTTP {0})")]
    Unauthorized(u16),

    /// Handshake failed for another reason.
    #[error("Handshake failed: {0}")]
    Handshake(String),

    /// Failed to send data.
    #[error("Send failed: {0}")]
    SendFailed(String),

    /// Failed to receive data.
    #[error("Receive failed: {0}")]
    ReceiveFailed(String),

    /// Inbound message over the size limit.
    #[error("Message of {0} bytes exceeds limit")]
    MessageTooLarge(usize),

    /// I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl TransportError {
    /// Whether retrying with the same credentials is pointless.
    #[must_use]
    pub fn is_auth_rejection(&self) -> bool {
        matches!(self, TransportError::Unauthorized(_))
    }
}

/// Both halves of an open connection.
pub struct TransportPair {
    pub sender: Box<dyn FrameSender>,
    pub receiver: Box<dyn FrameReceiver>,
}

/// Dials the chat server.
#[async_trait]
pub trait Connector: Send + Sync {
    /// Open a connection to `url`, completing the handshake.
    async fn connect(&self, url: &str) -> Result<TransportPair, TransportError>;

    /// Get the transport name (e.g., "websocket", "memory").
    fn name(&self) -> &'static str;
}

/// Outbound half of a connection.
#[async_trait]
pub trait FrameSender: Send {
    /// Send one text frame.
    async fn send_text(&mut self, text: String) -> Result<(), TransportError>;

    /// Close the connection gracefully.
    async fn close(&mut self) -> Result<(), TransportError>;
}

/// Inbound half of a connection.
#[async_trait]
pub trait FrameReceiver: Send {
    /// Receive the next text frame.
    ///
    /// Returns `None` if the connection is closed cleanly.
    async fn recv(&mut self) -> Result<Option<String>, TransportError>;
}
