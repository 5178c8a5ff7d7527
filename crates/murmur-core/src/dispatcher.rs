//! Inbound frame dispatch.
//!
//! Called once per frame in delivery order. Each frame type maps to exactly
//! one mutation of the [`SessionContext`]; nothing here can fail the
//! connection.

use crate::context::SessionContext;
use crate::events::ChatEvent;
use crate::message::{ChatMessage, MessageKind};
use crate::presence::PresenceEntry;
use murmur_protocol::{codec, ServerFrame};
use tracing::{debug, info, warn};

/// What a dispatched frame did.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DispatchOutcome {
    /// State changed.
    Applied,
    /// Valid frame that turned out to be a no-op (duplicate presence, etc).
    Unchanged,
    /// Informational frame, logged only.
    Notice,
    /// Frame type not understood.
    Ignored,
    /// Frame could not be parsed or used.
    Malformed,
}

/// Decode and dispatch a raw text frame.
///
/// Parse failures are logged and reported as [`DispatchOutcome::Malformed`].
pub fn dispatch_text(ctx: &mut SessionContext, text: &str) -> DispatchOutcome {
    match codec::decode(text) {
        Ok(frame) => dispatch(ctx, frame),
        Err(e) => {
            warn!(error = %e, len = text.len(), "Dropping malformed frame");
            DispatchOutcome::Malformed
        }
    }
}

/// Apply one decoded frame.
pub fn dispatch(ctx: &mut SessionContext, frame: ServerFrame) -> DispatchOutcome {
    debug!(kind = frame.kind(), "Dispatching frame");

    match frame {
        ServerFrame::Welcome { message, .. } => {
            info!(message = message.as_deref().unwrap_or(""), "Server welcome");
            DispatchOutcome::Notice
        }

        ServerFrame::TestResponse {
            original_message,
            response,
            ..
        } => {
            info!(
                original = original_message.as_deref().unwrap_or(""),
                response = response.as_deref().unwrap_or(""),
                "Probe answered"
            );
            DispatchOutcome::Notice
        }

        ServerFrame::NewMessage(body) => {
            let message = ChatMessage::from_frame(MessageKind::Public, body);
            debug!(sender = %message.sender_id, "Public message");
            ctx.conversations.append_public(message.clone());
            ctx.events().publish(ChatEvent::PublicMessage(message));
            DispatchOutcome::Applied
        }

        ServerFrame::PrivateMessage(body) => {
            let message = ChatMessage::from_frame(MessageKind::Private, body);
            match ctx.conversations.append_private(message.clone()) {
                Some(append) => {
                    let unread_count = ctx.conversations.unread_count(&append.peer);
                    debug!(peer = %append.peer, unread = unread_count, "Private message");
                    ctx.events().publish(ChatEvent::PrivateMessage {
                        peer: append.peer,
                        message,
                        unread_count,
                    });
                    DispatchOutcome::Applied
                }
                None => {
                    warn!(sender = %message.sender_id, "Private message has no resolvable peer");
                    DispatchOutcome::Malformed
                }
            }
        }

        ServerFrame::UserOnline(user) => {
            let entry = PresenceEntry::from(user);
            if ctx.presence.join(entry.clone()) {
                ctx.events().publish(ChatEvent::UserOnline(entry));
                DispatchOutcome::Applied
            } else {
                DispatchOutcome::Unchanged
            }
        }

        ServerFrame::UserOffline(user) => match ctx.presence.leave(&user.user_id) {
            Some(entry) => {
                ctx.events().publish(ChatEvent::UserOffline(entry));
                DispatchOutcome::Applied
            }
            None => DispatchOutcome::Unchanged,
        },

        ServerFrame::OnlineUsers { users } => {
            ctx.presence.replace(users.unwrap_or_default());
            ctx.events()
                .publish(ChatEvent::PresenceSnapshot(ctx.presence.snapshot()));
            DispatchOutcome::Applied
        }

        ServerFrame::Error { message } => {
            let message = message.unwrap_or_default();
            warn!(message = %message, "Server error");
            ctx.events().publish(ChatEvent::ServerError(message));
            DispatchOutcome::Notice
        }

        ServerFrame::Unrecognized { kind } => {
            debug!(kind = %kind, "Ignoring unrecognized frame");
            DispatchOutcome::Ignored
        }
    }
}
