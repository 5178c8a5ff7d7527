//! # murmur-transport
//!
//! Client transport layer for the Murmur chat client.
//!
//! - **WebSocket** - connects to the chat server with tokio-tungstenite
//! - **Memory** - in-process connections for tests and offline demos
//!
//! ## Transport Abstraction
//!
//! Every transport implements [`Connector`]. A successful connect yields a
//! [`TransportPair`] whose halves can be moved into separate tasks.
//!
//! ```rust,ignore
//! use murmur_transport::{Connector, TransportPair};
//!
//! async fn pump(connector: &dyn Connector, url: &str) {
//!     let TransportPair { mut receiver, .. } = connector.connect(url).await?;
//!     while let Ok(Some(text)) = receiver.recv().await {
//!         // Decode and dispatch
//!     }
//! }
//! ```

pub mod endpoint;
pub mod memory;
pub mod traits;

#[cfg(feature = "websocket")]
pub mod websocket;

pub use endpoint::endpoint_url;
pub use memory::{MemoryConnector, MemoryPeer, MemoryServer, Refusal};
pub use traits::{Connector, FrameReceiver, FrameSender, TransportError, TransportPair};

#[cfg(feature = "websocket")]
pub use websocket::{WebSocketConfig, WebSocketConnector};
