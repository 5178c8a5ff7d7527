//! Consumer-facing notifications.
//!
//! Events are published on a broadcast channel from inside the dispatch path,
//! so every subscriber sees them in the order the state changed.

use crate::connection::ConnectionState;
use crate::message::ChatMessage;
use crate::presence::PresenceEntry;
use murmur_protocol::UserId;
use tokio::sync::broadcast;
use tracing::trace;

/// Default event buffer per subscriber.
const DEFAULT_EVENT_CAPACITY: usize = 1024;

/// Something a consumer may want to react to.
#[derive(Debug, Clone, PartialEq)]
pub enum ChatEvent {
    /// Connection state changed.
    Connectivity(ConnectionState),
    /// The transport reported an error. A close usually follows.
    TransportError(String),
    /// Automatic reconnection gave up.
    ConnectivityFailed { attempts: u32 },
    /// A public message was stored.
    PublicMessage(ChatMessage),
    /// A private message was stored in `peer`'s partition.
    PrivateMessage {
        peer: UserId,
        message: ChatMessage,
        unread_count: usize,
    },
    /// A user came online.
    UserOnline(PresenceEntry),
    /// A user went offline.
    UserOffline(PresenceEntry),
    /// The presence set was replaced.
    PresenceSnapshot(Vec<PresenceEntry>),
    /// The server reported an error.
    ServerError(String),
    /// Login state changed.
    SessionChanged { logged_in: bool },
    /// The server rejected our token.
    SessionExpired,
}

/// Broadcast fan-out of [`ChatEvent`]s.
#[derive(Debug, Clone)]
pub struct EventBus {
    sender: broadcast::Sender<ChatEvent>,
}

impl EventBus {
    #[must_use]
    pub fn new() -> Self {
        Self::with_capacity(DEFAULT_EVENT_CAPACITY)
    }

    #[must_use]
    pub fn with_capacity(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity);
        Self { sender }
    }

    /// Register a new observer.
    #[must_use]
    pub fn subscribe(&self) -> broadcast::Receiver<ChatEvent> {
        self.sender.subscribe()
    }

    /// Publish an event.
    ///
    /// Returns the number of observers it reached; zero when nobody listens.
    pub fn publish(&self, event: ChatEvent) -> usize {
        trace!(?event, "Publishing event");
        self.sender.send(event).unwrap_or_default()
    }

    #[must_use]
    pub fn subscriber_count(&self) -> usize {
        self.sender.receiver_count()
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_publish_without_subscribers() {
        let bus = EventBus::new();
        assert_eq!(bus.publish(ChatEvent::SessionExpired), 0);
    }

    #[test]
    fn test_events_arrive_in_order() {
        let bus = EventBus::new();
        let mut rx = bus.subscribe();

        bus.publish(ChatEvent::Connectivity(ConnectionState::Connecting));
        bus.publish(ChatEvent::Connectivity(ConnectionState::Connected));

        assert_eq!(
            rx.try_recv().unwrap(),
            ChatEvent::Connectivity(ConnectionState::Connecting)
        );
        assert_eq!(
            rx.try_recv().unwrap(),
            ChatEvent::Connectivity(ConnectionState::Connected)
        );
        assert!(rx.try_recv().is_err());
    }

    #[test]
    fn test_multiple_observers() {
        let bus = EventBus::new();
        let mut a = bus.subscribe();
        let mut b = bus.subscribe();
        assert_eq!(bus.subscriber_count(), 2);

        assert_eq!(bus.publish(ChatEvent::ServerError("boom".into())), 2);
        assert!(a.try_recv().is_ok());
        assert!(b.try_recv().is_ok());
    }
}
