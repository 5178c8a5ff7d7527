//! # murmur-client
//!
//! The Murmur chat client: a single-task runtime around the session,
//! connection and conversation state from `murmur-core`, wired to a
//! `murmur-transport` connector.
//!
//! ```rust,ignore
//! use murmur_client::{ChatClient, ClientOptions};
//! use murmur_core::MemoryCredentialStore;
//! use murmur_transport::WebSocketConnector;
//! use std::sync::Arc;
//!
//! let (client, _task) = ChatClient::spawn(
//!     ClientOptions::default(),
//!     Arc::new(WebSocketConnector::default()),
//!     Box::new(MemoryCredentialStore::new()),
//! );
//! let mut events = client.subscribe();
//! client.connect().await?;
//! ```

pub mod cli;
pub mod client;
pub mod config;
pub mod metrics;
pub mod store;

pub use client::{ChatClient, ClientError, ClientOptions};
pub use config::ClientConfig;
pub use store::FileCredentialStore;
