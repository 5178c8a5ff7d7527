//! # murmur-protocol
//!
//! Wire protocol definitions for the Murmur chat client.
//!
//! The chat server speaks JSON text frames over a WebSocket. Every frame is an
//! object with a `type` discriminator; this crate models the two directions as
//! closed enums and provides the codec between them and text.
//!
//! ## Frame Types
//!
//! - `ServerFrame` - welcome/test notices, public and private messages,
//!   presence changes and snapshots, server errors
//! - `ClientFrame` - public and private sends, room joins, probes
//!
//! ## Example
//!
//! ```rust
//! use murmur_protocol::{codec, ClientFrame, ServerFrame};
//!
//! let text = codec::encode(&ClientFrame::message("hello", "global")).unwrap();
//! assert!(text.contains("\"roomId\":\"global\""));
//!
//! let frame = codec::decode(r#"{"type":"userOnline","userId":7,"username":"bob"}"#).unwrap();
//! assert_eq!(frame, ServerFrame::user_online("7", "bob"));
//! ```

pub mod codec;
pub mod frames;
pub mod ids;

pub use codec::{decode, encode, ProtocolError};
pub use frames::{ClientFrame, MessageFrame, PresenceUser, ServerFrame, Timestamp, DEFAULT_ROOM};
pub use ids::{MessageId, UserId};
