//! Chat message types stored by the client.

use murmur_protocol::{MessageFrame, MessageId, Timestamp, UserId};
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{SystemTime, UNIX_EPOCH};

/// Atomic counter distinguishing ids minted within the same millisecond.
static ID_COUNTER: AtomicU64 = AtomicU64::new(0);

/// Generate a local message id.
///
/// Used when the server omits an id and for optimistic local sends.
#[must_use]
pub fn generate_local_id() -> MessageId {
    let millis = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis())
        .unwrap_or_default();
    let seq = ID_COUNTER.fetch_add(1, Ordering::Relaxed);
    MessageId::new(format!("local-{millis}-{seq}"))
}

/// Whether a message went to a room or to a single user.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MessageKind {
    Public,
    Private,
}

/// A stored chat message. Never mutated after insertion.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChatMessage {
    /// Unique message identifier.
    pub id: MessageId,
    /// Public or private.
    pub kind: MessageKind,
    /// Author.
    pub sender_id: UserId,
    /// Author display name.
    pub sender_name: String,
    /// Recipient of a private message.
    pub receiver_id: Option<UserId>,
    /// Room of a public message.
    pub room_id: Option<String>,
    /// Message text.
    pub content: String,
    /// Server or local timestamp.
    pub timestamp: Timestamp,
}

impl ChatMessage {
    /// Build a stored message from a received frame body, minting an id if
    /// the server did not send one.
    #[must_use]
    pub fn from_frame(kind: MessageKind, body: MessageFrame) -> Self {
        Self {
            id: body.id.unwrap_or_else(generate_local_id),
            kind,
            sender_id: body.sender_id,
            sender_name: body.sender_name,
            receiver_id: body.receiver_id,
            room_id: body.room_id,
            content: body.content,
            timestamp: body.timestamp.unwrap_or_else(Timestamp::now),
        }
    }

    /// Build an outbound private message for optimistic display.
    #[must_use]
    pub fn outgoing_private(
        sender_id: UserId,
        sender_name: impl Into<String>,
        receiver_id: UserId,
        content: impl Into<String>,
    ) -> Self {
        Self {
            id: generate_local_id(),
            kind: MessageKind::Private,
            sender_id,
            sender_name: sender_name.into(),
            receiver_id: Some(receiver_id),
            room_id: None,
            content: content.into(),
            timestamp: Timestamp::now(),
        }
    }

    /// The other party of a private message, seen from `local`.
    ///
    /// When the local identity is unknown the sender is taken as the peer.
    #[must_use]
    pub fn peer_of(&self, local: Option<&UserId>) -> Option<&UserId> {
        match local {
            Some(me) if &self.sender_id == me => self.receiver_id.as_ref(),
            _ => Some(&self.sender_id),
        }
    }
}
