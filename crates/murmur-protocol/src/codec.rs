//! Codec for encoding and decoding Murmur frames.
//!
//! Frames travel as JSON text messages, one frame per WebSocket message.

use serde_json::Value;
use thiserror::Error;

use crate::frames::{ClientFrame, ServerFrame, SERVER_FRAME_TYPES};

/// Maximum accepted frame size (1 MiB).
pub const MAX_FRAME_SIZE: usize = 1024 * 1024;

/// Protocol errors that can occur during encoding/decoding.
#[derive(Debug, Error)]
pub enum ProtocolError {
    /// Frame exceeds maximum size.
    #[error("Frame size {0} exceeds maximum {MAX_FRAME_SIZE}")]
    FrameTooLarge(usize),

    /// Frame is not a JSON object with a string `type`.
    #[error("Frame has no type discriminator")]
    MissingType,

    /// JSON encoding or decoding error.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Frame parsed but its content is unusable.
    #[error("Invalid frame: {0}")]
    Invalid(String),
}

/// Encode an outbound frame to JSON text.
///
/// # Errors
///
/// Returns an error if the frame is too large or serialization fails.
pub fn encode(frame: &ClientFrame) -> Result<String, ProtocolError> {
    let text = serde_json::to_string(frame)?;
    check_size(text.len())?;
    Ok(text)
}

/// Decode an inbound frame from JSON text.
///
/// Frames with a `type` this client does not know decode to
/// [`ServerFrame::Unrecognized`] rather than failing, so callers can log and
/// skip them.
///
/// # Errors
///
/// Returns an error if the text is oversized, not JSON, has no `type`, or a
/// known frame type is missing required fields.
pub fn decode(text: &str) -> Result<ServerFrame, ProtocolError> {
    check_size(text.len())?;

    let value: Value = serde_json::from_str(text)?;
    let kind = match value.get("type") {
        Some(Value::String(kind)) => kind.clone(),
        _ => return Err(ProtocolError::MissingType),
    };

    if !SERVER_FRAME_TYPES.contains(&kind.as_str()) {
        return Ok(ServerFrame::Unrecognized { kind });
    }

    let frame = serde_json::from_value(value)?;
    validate(&frame)?;
    Ok(frame)
}

/// Encode an inbound frame, as a server would.
///
/// # Errors
///
/// Returns an error for [`ServerFrame::Unrecognized`], which has no wire form.
pub fn encode_server(frame: &ServerFrame) -> Result<String, ProtocolError> {
    if let ServerFrame::Unrecognized { kind } = frame {
        return Err(ProtocolError::Invalid(format!(
            "cannot encode unrecognized frame type {kind}"
        )));
    }
    let text = serde_json::to_string(frame)?;
    check_size(text.len())?;
    Ok(text)
}

/// Decode an outbound frame, as a server would.
///
/// # Errors
///
/// Returns an error if the text is not a valid client frame.
pub fn decode_client(text: &str) -> Result<ClientFrame, ProtocolError> {
    check_size(text.len())?;
    Ok(serde_json::from_str(text)?)
}

fn check_size(len: usize) -> Result<(), ProtocolError> {
    if len > MAX_FRAME_SIZE {
        return Err(ProtocolError::FrameTooLarge(len));
    }
    Ok(())
}

fn validate(frame: &ServerFrame) -> Result<(), ProtocolError> {
    match frame {
        ServerFrame::PrivateMessage(body) if body.receiver_id.is_none() => Err(
            ProtocolError::Invalid("privateMessage without receiverId".into()),
        ),
        ServerFrame::NewMessage(body) | ServerFrame::PrivateMessage(body)
            if body.sender_id.is_empty() =>
        {
            Err(ProtocolError::Invalid(format!(
                "{} with empty senderId",
                frame.kind()
            )))
        }
        ServerFrame::UserOnline(user) | ServerFrame::UserOffline(user)
            if user.user_id.is_empty() =>
        {
            Err(ProtocolError::Invalid(format!(
                "{} with empty userId",
                frame.kind()
            )))
        }
        _ => Ok(()),
    }
}
