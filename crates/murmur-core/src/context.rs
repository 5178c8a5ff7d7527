//! Per-session state container.

use crate::conversation::{ConversationStore, FriendView, HistoryLimits, RosterEntry};
use crate::events::EventBus;
use crate::presence::PresenceSet;
use murmur_protocol::UserId;

/// Everything the dispatcher mutates for one logged-in session.
///
/// Constructed explicitly and owned by whoever drives the session, so
/// independent sessions never share state.
#[derive(Debug)]
pub struct SessionContext {
    pub conversations: ConversationStore,
    pub presence: PresenceSet,
    events: EventBus,
    limits: HistoryLimits,
}

impl SessionContext {
    #[must_use]
    pub fn new(local: Option<UserId>, limits: HistoryLimits, events: EventBus) -> Self {
        Self {
            conversations: ConversationStore::with_limits(local, limits),
            presence: PresenceSet::new(),
            events,
            limits,
        }
    }

    #[must_use]
    pub fn events(&self) -> &EventBus {
        &self.events
    }

    /// Start over for a (possibly different) local user.
    pub fn reset(&mut self, local: Option<UserId>) {
        self.conversations = ConversationStore::with_limits(local, self.limits);
        self.presence.clear();
    }

    /// Roster enriched with unread counts and online flags.
    #[must_use]
    pub fn friends_view(&self, roster: &[RosterEntry]) -> Vec<FriendView> {
        self.conversations.friends_view(roster, &self.presence)
    }
}
