//! Frame types for the Murmur chat protocol.
//!
//! Frames are JSON objects carrying a `type` discriminator. Inbound and
//! outbound traffic use disjoint sets of types, so each direction gets its
//! own closed enum.

use serde::{Deserialize, Serialize};
use std::time::{SystemTime, UNIX_EPOCH};

use crate::ids::{MessageId, UserId};

/// Room used when the caller does not name one.
pub const DEFAULT_ROOM: &str = "global";

/// Frame timestamp.
///
/// The server stamps chat messages with ISO-8601 text and notices with epoch
/// milliseconds; both are preserved as received.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Timestamp {
    /// Milliseconds since the Unix epoch.
    Millis(u64),
    /// Server-formatted date time.
    Text(String),
}

impl Timestamp {
    /// Current wall-clock time in milliseconds.
    #[must_use]
    pub fn now() -> Self {
        let millis = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_millis() as u64)
            .unwrap_or_default();
        Timestamp::Millis(millis)
    }
}

/// A user as carried by presence frames.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PresenceUser {
    /// User identifier.
    pub user_id: UserId,
    /// Display name.
    #[serde(default)]
    pub username: String,
}

impl PresenceUser {
    /// Create a presence user.
    #[must_use]
    pub fn new(user_id: impl Into<UserId>, username: impl Into<String>) -> Self {
        Self {
            user_id: user_id.into(),
            username: username.into(),
        }
    }
}

/// Body shared by public and private chat message frames.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MessageFrame {
    /// Server-assigned id, absent on some server versions.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<MessageId>,
    /// Author of the message.
    pub sender_id: UserId,
    /// Author display name.
    #[serde(default)]
    pub sender_name: String,
    /// Recipient, present on private messages.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub receiver_id: Option<UserId>,
    /// Message text.
    pub content: String,
    /// When the server accepted the message.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timestamp: Option<Timestamp>,
    /// Room of a public message.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub room_id: Option<String>,
}

/// A frame received from the server.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum ServerFrame {
    /// Greeting sent right after the handshake.
    Welcome {
        #[serde(default)]
        message: Option<String>,
        #[serde(default)]
        timestamp: Option<Timestamp>,
    },

    /// Reply to a client `test` probe.
    #[serde(rename_all = "camelCase")]
    TestResponse {
        #[serde(default)]
        original_message: Option<String>,
        #[serde(default)]
        response: Option<String>,
        #[serde(default)]
        timestamp: Option<Timestamp>,
    },

    /// Public room message.
    NewMessage(MessageFrame),

    /// Private message, either addressed to us or an echo of our own.
    PrivateMessage(MessageFrame),

    /// A user came online.
    UserOnline(PresenceUser),

    /// A user went offline.
    UserOffline(PresenceUser),

    /// Full snapshot of online users.
    OnlineUsers {
        #[serde(default)]
        users: Option<Vec<PresenceUser>>,
    },

    /// Server-side error notice.
    Error {
        #[serde(default)]
        message: Option<String>,
    },

    /// Any `type` this client does not understand.
    #[serde(skip)]
    Unrecognized {
        /// The `type` value as received.
        kind: String,
    },
}

/// Inbound `type` values understood by [`ServerFrame`].
pub const SERVER_FRAME_TYPES: &[&str] = &[
    "welcome",
    "testResponse",
    "newMessage",
    "privateMessage",
    "userOnline",
    "userOffline",
    "onlineUsers",
    "error",
];

impl ServerFrame {
    /// Get the wire `type` of this frame.
    #[must_use]
    pub fn kind(&self) -> &str {
        match self {
            ServerFrame::Welcome { .. } => "welcome",
            ServerFrame::TestResponse { .. } => "testResponse",
            ServerFrame::NewMessage(_) => "newMessage",
            ServerFrame::PrivateMessage(_) => "privateMessage",
            ServerFrame::UserOnline(_) => "userOnline",
            ServerFrame::UserOffline(_) => "userOffline",
            ServerFrame::OnlineUsers { .. } => "onlineUsers",
            ServerFrame::Error { .. } => "error",
            ServerFrame::Unrecognized { kind } => kind,
        }
    }

    /// Create a Welcome frame.
    #[must_use]
    pub fn welcome(message: impl Into<String>) -> Self {
        ServerFrame::Welcome {
            message: Some(message.into()),
            timestamp: Some(Timestamp::now()),
        }
    }

    /// Create a public NewMessage frame.
    #[must_use]
    pub fn new_message(
        sender_id: impl Into<UserId>,
        sender_name: impl Into<String>,
        content: impl Into<String>,
    ) -> Self {
        ServerFrame::NewMessage(MessageFrame {
            id: None,
            sender_id: sender_id.into(),
            sender_name: sender_name.into(),
            receiver_id: None,
            content: content.into(),
            timestamp: None,
            room_id: Some(DEFAULT_ROOM.to_string()),
        })
    }

    /// Create a PrivateMessage frame.
    #[must_use]
    pub fn private_message(
        sender_id: impl Into<UserId>,
        sender_name: impl Into<String>,
        receiver_id: impl Into<UserId>,
        content: impl Into<String>,
    ) -> Self {
        ServerFrame::PrivateMessage(MessageFrame {
            id: None,
            sender_id: sender_id.into(),
            sender_name: sender_name.into(),
            receiver_id: Some(receiver_id.into()),
            content: content.into(),
            timestamp: None,
            room_id: None,
        })
    }

    /// Create a UserOnline frame.
    #[must_use]
    pub fn user_online(user_id: impl Into<UserId>, username: impl Into<String>) -> Self {
        ServerFrame::UserOnline(PresenceUser::new(user_id, username))
    }

    /// Create a UserOffline frame.
    #[must_use]
    pub fn user_offline(user_id: impl Into<UserId>, username: impl Into<String>) -> Self {
        ServerFrame::UserOffline(PresenceUser::new(user_id, username))
    }

    /// Create an OnlineUsers snapshot frame.
    #[must_use]
    pub fn online_users(users: Vec<PresenceUser>) -> Self {
        ServerFrame::OnlineUsers { users: Some(users) }
    }

    /// Create an Error frame.
    #[must_use]
    pub fn error(message: impl Into<String>) -> Self {
        ServerFrame::Error {
            message: Some(message.into()),
        }
    }
}

/// A frame sent to the server.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum ClientFrame {
    /// Public room message.
    #[serde(rename_all = "camelCase")]
    Message { content: String, room_id: String },

    /// Private message to one user.
    #[serde(rename_all = "camelCase")]
    PrivateMessage {
        content: String,
        target_user_id: UserId,
        sender_id: UserId,
        sender_name: String,
    },

    /// Join a named room.
    #[serde(rename_all = "camelCase")]
    JoinRoom { room_id: String },

    /// Connectivity probe, answered with `testResponse`.
    Test { message: String },
}

impl ClientFrame {
    /// Get the wire `type` of this frame.
    #[must_use]
    pub fn kind(&self) -> &'static str {
        match self {
            ClientFrame::Message { .. } => "message",
            ClientFrame::PrivateMessage { .. } => "privateMessage",
            ClientFrame::JoinRoom { .. } => "joinRoom",
            ClientFrame::Test { .. } => "test",
        }
    }

    /// Create a public Message frame.
    #[must_use]
    pub fn message(content: impl Into<String>, room_id: impl Into<String>) -> Self {
        ClientFrame::Message {
            content: content.into(),
            room_id: room_id.into(),
        }
    }

    /// Create a PrivateMessage frame.
    #[must_use]
    pub fn private_message(
        content: impl Into<String>,
        target_user_id: UserId,
        sender_id: UserId,
        sender_name: impl Into<String>,
    ) -> Self {
        ClientFrame::PrivateMessage {
            content: content.into(),
            target_user_id,
            sender_id,
            sender_name: sender_name.into(),
        }
    }

    /// Create a JoinRoom frame.
    #[must_use]
    pub fn join_room(room_id: impl Into<String>) -> Self {
        ClientFrame::JoinRoom {
            room_id: room_id.into(),
        }
    }

    /// Create a Test frame.
    #[must_use]
    pub fn test(message: impl Into<String>) -> Self {
        ClientFrame::Test {
            message: message.into(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_server_frame_kind() {
        assert_eq!(ServerFrame::welcome("hi").kind(), "welcome");
        assert_eq!(ServerFrame::user_online("1", "a").kind(), "userOnline");
        let unknown = ServerFrame::Unrecognized {
            kind: "typing".into(),
        };
        assert_eq!(unknown.kind(), "typing");
    }

    #[test]
    fn test_private_message_wire_shape() {
        let frame = ClientFrame::private_message("hi", UserId::new("2"), UserId::new("1"), "alice");
        let value = serde_json::to_value(&frame).unwrap();
        assert_eq!(
            value,
            json!({
                "type": "privateMessage",
                "content": "hi",
                "targetUserId": 2,
                "senderId": 1,
                "senderName": "alice"
            })
        );
    }

    #[test]
    fn test_public_message_wire_shape() {
        let value = serde_json::to_value(ClientFrame::message("yo", DEFAULT_ROOM)).unwrap();
        assert_eq!(value, json!({"type": "message", "content": "yo", "roomId": "global"}));
    }

    #[test]
    fn test_server_message_accepts_backend_shape() {
        let frame: ServerFrame = serde_json::from_value(json!({
            "type": "newMessage",
            "id": 1_700_000_000_000u64,
            "senderId": 7,
            "senderName": "bob",
            "content": "hello",
            "timestamp": "2024-05-01T10:00:00.123",
            "roomId": "global"
        }))
        .unwrap();

        match frame {
            ServerFrame::NewMessage(body) => {
                assert_eq!(body.sender_id, UserId::new("7"));
                assert_eq!(body.id, Some(MessageId::new("1700000000000")));
                assert_eq!(
                    body.timestamp,
                    Some(Timestamp::Text("2024-05-01T10:00:00.123".into()))
                );
            }
            other => panic!("Expected NewMessage, got {:?}", other),
        }
    }

    #[test]
    fn test_presence_frame_ignores_online_flag() {
        let frame: ServerFrame = serde_json::from_value(json!({
            "type": "userOffline",
            "userId": 3,
            "username": "carol",
            "online": false
        }))
        .unwrap();
        assert_eq!(frame, ServerFrame::user_offline("3", "carol"));
    }
}
