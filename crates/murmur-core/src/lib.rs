//! # murmur-core
//!
//! Session, conversation and connection state for the Murmur chat client.
//!
//! This crate holds everything that decides; it performs no I/O of its own:
//!
//! - **Session** - reconcile in-memory login state with durable credentials
//! - **Connection** - lifecycle state machine with bounded reconnection
//! - **Dispatcher** - route inbound frames to state mutations
//! - **Conversation** - public history, per-peer partitions, unread counts
//! - **Presence** - the set of online users
//! - **Events** - broadcast notifications for consumers
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────┐     ┌─────────────┐     ┌──────────────┐
//! │   Session   │────▶│ Connection  │────▶│  Dispatcher  │
//! └─────────────┘     └─────────────┘     └──────────────┘
//!                                                │
//!                              ┌─────────────────┼─────────────┐
//!                              ▼                 ▼             ▼
//!                       ┌─────────────┐   ┌────────────┐ ┌──────────┐
//!                       │Conversation │   │  Presence  │ │  Events  │
//!                       └─────────────┘   └────────────┘ └──────────┘
//! ```

pub mod connection;
pub mod context;
pub mod conversation;
pub mod dispatcher;
pub mod events;
pub mod message;
pub mod presence;
pub mod session;

pub use connection::{Action, ConnectError, ConnectionManager, ConnectionState, ReconnectPolicy};
pub use context::SessionContext;
pub use conversation::{ConversationStore, FriendView, HistoryLimits, RosterEntry};
pub use dispatcher::{dispatch, dispatch_text, DispatchOutcome};
pub use events::{ChatEvent, EventBus};
pub use message::{ChatMessage, MessageKind};
pub use presence::{PresenceEntry, PresenceSet};
pub use session::{
    reconcile, Access, CredentialStore, Directive, Identity, MemoryCredentialStore,
    Reconciliation, Route, Session, StoreError, UserProfile,
};
