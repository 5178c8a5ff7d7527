//! Conversation state: public history, private partitions and unread counts.

use crate::message::{ChatMessage, MessageKind};
use crate::presence::PresenceSet;
use murmur_protocol::UserId;
use std::collections::HashMap;
use tracing::{debug, trace};

/// History caps and the size each history is compacted to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HistoryLimits {
    /// Maximum public messages before compaction.
    pub public_cap: usize,
    /// Public messages kept after compaction.
    pub public_keep: usize,
    /// Maximum messages per private partition before compaction.
    pub private_cap: usize,
    /// Messages kept per partition after compaction.
    pub private_keep: usize,
}

impl Default for HistoryLimits {
    fn default() -> Self {
        Self {
            public_cap: 1000,
            public_keep: 500,
            private_cap: 500,
            private_keep: 250,
        }
    }
}

/// Drop the oldest messages once `cap` is exceeded, keeping the newest `keep`.
fn compact(messages: &mut Vec<ChatMessage>, cap: usize, keep: usize) -> bool {
    if messages.len() <= cap {
        return false;
    }
    let excess = messages.len() - keep.min(messages.len());
    messages.drain(..excess);
    true
}

/// Private history with one peer.
#[derive(Debug, Default, Clone)]
pub struct Partition {
    messages: Vec<ChatMessage>,
    unread_count: usize,
}

impl Partition {
    /// Messages in insertion order.
    #[must_use]
    pub fn messages(&self) -> &[ChatMessage] {
        &self.messages
    }

    /// Number of unread inbound messages.
    #[must_use]
    pub fn unread_count(&self) -> usize {
        self.unread_count
    }
}

/// Result of storing a private message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PrivateAppend {
    /// Partition the message landed in.
    pub peer: UserId,
    /// Whether the unread counter was incremented.
    pub counted_unread: bool,
}

/// A friend from the roster collaborator.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RosterEntry {
    pub user_id: UserId,
    pub username: String,
}

impl RosterEntry {
    #[must_use]
    pub fn new(user_id: impl Into<UserId>, username: impl Into<String>) -> Self {
        Self {
            user_id: user_id.into(),
            username: username.into(),
        }
    }
}

/// A roster entry enriched with conversation and presence state.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FriendView {
    pub user_id: UserId,
    pub username: String,
    pub unread_count: usize,
    pub is_online: bool,
}

/// In-memory conversation state for one session.
#[derive(Debug)]
pub struct ConversationStore {
    /// Local user, used to find the peer of a private message.
    local: Option<UserId>,
    public: Vec<ChatMessage>,
    partitions: HashMap<UserId, Partition>,
    focused: Option<UserId>,
    limits: HistoryLimits,
}

impl ConversationStore {
    /// Create a store for the given local user.
    #[must_use]
    pub fn new(local: Option<UserId>) -> Self {
        Self::with_limits(local, HistoryLimits::default())
    }

    /// Create a store with custom history limits.
    #[must_use]
    pub fn with_limits(local: Option<UserId>, limits: HistoryLimits) -> Self {
        Self {
            local,
            public: Vec::new(),
            partitions: HashMap::new(),
            focused: None,
            limits,
        }
    }

    /// The local user this store partitions against.
    #[must_use]
    pub fn local_user(&self) -> Option<&UserId> {
        self.local.as_ref()
    }

    /// Append a public message, compacting history past the cap.
    pub fn append_public(&mut self, message: ChatMessage) {
        debug_assert_eq!(message.kind, MessageKind::Public);
        self.public.push(message);
        if compact(
            &mut self.public,
            self.limits.public_cap,
            self.limits.public_keep,
        ) {
            debug!(kept = self.public.len(), "Compacted public history");
        }
    }

    /// Append a private message to the partition of the other party.
    ///
    /// The unread counter grows only for messages written by someone else
    /// into a conversation that is not focused. Returns `None` when the peer
    /// cannot be determined (our own message without a recipient).
    pub fn append_private(&mut self, message: ChatMessage) -> Option<PrivateAppend> {
        let peer = message.peer_of(self.local.as_ref())?.clone();
        let from_peer = self.local.as_ref() != Some(&message.sender_id);
        let counted_unread = from_peer && self.focused.as_ref() != Some(&peer);

        let partition = self.partitions.entry(peer.clone()).or_default();
        partition.messages.push(message);
        if counted_unread {
            partition.unread_count += 1;
            trace!(peer = %peer, unread = partition.unread_count, "Unread incremented");
        }
        if compact(
            &mut partition.messages,
            self.limits.private_cap,
            self.limits.private_keep,
        ) {
            debug!(peer = %peer, kept = partition.messages.len(), "Compacted private history");
        }

        Some(PrivateAppend {
            peer,
            counted_unread,
        })
    }

    /// Make `peer` the active conversation and mark it read.
    pub fn focus(&mut self, peer: &UserId) {
        self.focused = Some(peer.clone());
        self.mark_read(peer);
    }

    /// Leave the active conversation.
    pub fn unfocus(&mut self) {
        self.focused = None;
    }

    /// Zero the unread counter of `peer`.
    pub fn mark_read(&mut self, peer: &UserId) {
        if let Some(partition) = self.partitions.get_mut(peer) {
            if partition.unread_count > 0 {
                debug!(peer = %peer, "Marked conversation read");
            }
            partition.unread_count = 0;
        }
    }

    /// Currently focused peer.
    #[must_use]
    pub fn focused(&self) -> Option<&UserId> {
        self.focused.as_ref()
    }

    /// Public history, oldest first.
    #[must_use]
    pub fn public_history(&self) -> &[ChatMessage] {
        &self.public
    }

    /// Private history with `peer`, oldest first.
    #[must_use]
    pub fn private_history(&self, peer: &UserId) -> &[ChatMessage] {
        self.partitions
            .get(peer)
            .map(Partition::messages)
            .unwrap_or_default()
    }

    /// Unread count for `peer`.
    #[must_use]
    pub fn unread_count(&self, peer: &UserId) -> usize {
        self.partitions
            .get(peer)
            .map(Partition::unread_count)
            .unwrap_or(0)
    }

    /// Unread messages across every partition.
    #[must_use]
    pub fn total_unread(&self) -> usize {
        self.partitions.values().map(Partition::unread_count).sum()
    }

    /// Whether any partition has unread messages.
    #[must_use]
    pub fn has_unread(&self) -> bool {
        self.partitions.values().any(|p| p.unread_count > 0)
    }

    /// Peers with at least one message, ordered by id.
    #[must_use]
    pub fn peers(&self) -> Vec<UserId> {
        let mut peers: Vec<_> = self.partitions.keys().cloned().collect();
        peers.sort();
        peers
    }

    /// Enrich a roster with unread counts and online flags.
    #[must_use]
    pub fn friends_view(&self, roster: &[RosterEntry], presence: &PresenceSet) -> Vec<FriendView> {
        roster
            .iter()
            .map(|friend| FriendView {
                user_id: friend.user_id.clone(),
                username: friend.username.clone(),
                unread_count: self.unread_count(&friend.user_id),
                is_online: presence.is_online(&friend.user_id),
            })
            .collect()
    }

    /// Forget all history and focus.
    pub fn clear(&mut self) {
        self.public.clear();
        self.partitions.clear();
        self.focused = None;
    }
}
