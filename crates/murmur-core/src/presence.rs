//! Presence tracking for Murmur.
//!
//! The presence set holds the users the server reports as online. Entries
//! carry no state beyond identity; membership is all that matters.

use murmur_protocol::{PresenceUser, UserId};
use std::collections::HashMap;
use tracing::debug;

/// A single online user.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PresenceEntry {
    /// User identifier.
    pub user_id: UserId,
    /// Display name.
    pub username: String,
}

impl From<PresenceUser> for PresenceEntry {
    fn from(user: PresenceUser) -> Self {
        Self {
            user_id: user.user_id,
            username: user.username,
        }
    }
}

/// Set of online users, deduplicated by id.
#[derive(Debug, Default)]
pub struct PresenceSet {
    /// Map of user ID to entry.
    members: HashMap<UserId, PresenceEntry>,
}

impl PresenceSet {
    /// Create an empty presence set.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Get the number of online users.
    #[must_use]
    pub fn count(&self) -> usize {
        self.members.len()
    }

    /// Check if a user is online.
    #[must_use]
    pub fn is_online(&self, user_id: &UserId) -> bool {
        self.members.contains_key(user_id)
    }

    /// Mark a user online.
    ///
    /// Returns `true` if the user was not already present.
    pub fn join(&mut self, user: impl Into<PresenceEntry>) -> bool {
        let entry = user.into();
        if self.members.contains_key(&entry.user_id) {
            return false;
        }
        debug!(user = %entry.user_id, "Presence: user online");
        self.members.insert(entry.user_id.clone(), entry);
        true
    }

    /// Mark a user offline.
    ///
    /// Returns the removed entry, if any.
    pub fn leave(&mut self, user_id: &UserId) -> Option<PresenceEntry> {
        let entry = self.members.remove(user_id);
        if entry.is_some() {
            debug!(user = %user_id, "Presence: user offline");
        }
        entry
    }

    /// Replace the whole set with a server snapshot.
    ///
    /// Later duplicates of the same id win.
    pub fn replace<I>(&mut self, users: I)
    where
        I: IntoIterator,
        I::Item: Into<PresenceEntry>,
    {
        self.members = users
            .into_iter()
            .map(|user| {
                let entry: PresenceEntry = user.into();
                (entry.user_id.clone(), entry)
            })
            .collect();
        debug!(count = self.members.len(), "Presence: snapshot applied");
    }

    /// Remove everyone.
    pub fn clear(&mut self) {
        self.members.clear();
    }

    /// Get all online users ordered by id.
    #[must_use]
    pub fn snapshot(&self) -> Vec<PresenceEntry> {
        let mut entries: Vec<_> = self.members.values().cloned().collect();
        entries.sort_by(|a, b| a.user_id.cmp(&b.user_id));
        entries
    }

    /// Check if nobody is online.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.members.is_empty()
    }
}
