//! In-memory transport.
//!
//! [`MemoryConnector`] pairs each accepted connection with a [`MemoryPeer`]
//! that plays the server side. Used to drive the client without a network.

use std::collections::VecDeque;
use std::sync::{Arc, Mutex, MutexGuard};

use async_trait::async_trait;
use murmur_protocol::{codec, ClientFrame, ServerFrame};
use tokio::sync::mpsc;
use tracing::debug;

use crate::traits::{Connector, FrameReceiver, FrameSender, TransportError, TransportPair};

/// How the next connection attempt should fail.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Refusal {
    /// The server cannot be reached.
    Unreachable,
    /// The server rejects the token (HTTP 401).
    Unauthorized,
}

impl Refusal {
    fn into_error(self) -> TransportError {
        match self {
            Refusal::Unreachable => TransportError::Io(std::io::Error::new(
                std::io::ErrorKind::ConnectionRefused,
                "connection refused",
            )),
            Refusal::Unauthorized => TransportError::Unauthorized(401),
        }
    }
}

#[derive(Debug)]
enum PeerEvent {
    Text(String),
    Error(String),
    Close,
}

#[derive(Default)]
struct Shared {
    refusals: VecDeque<Refusal>,
    refuse_all: Option<Refusal>,
    urls: Vec<String>,
}

/// Connector whose connections terminate in this process.
#[derive(Clone)]
pub struct MemoryConnector {
    shared: Arc<Mutex<Shared>>,
    accepted: mpsc::UnboundedSender<MemoryPeer>,
}

/// Server side of a [`MemoryConnector`].
pub struct MemoryServer {
    shared: Arc<Mutex<Shared>>,
    accepted: mpsc::UnboundedReceiver<MemoryPeer>,
}

impl MemoryConnector {
    /// Create a connector and the server handle that receives its connections.
    #[must_use]
    pub fn new() -> (Self, MemoryServer) {
        let shared = Arc::new(Mutex::new(Shared::default()));
        let (tx, rx) = mpsc::unbounded_channel();
        (
            Self {
                shared: Arc::clone(&shared),
                accepted: tx,
            },
            MemoryServer {
                shared,
                accepted: rx,
            },
        )
    }
}

fn lock(shared: &Mutex<Shared>) -> MutexGuard<'_, Shared> {
    shared.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

#[async_trait]
impl Connector for MemoryConnector {
    async fn connect(&self, url: &str) -> Result<TransportPair, TransportError> {
        let refusal = {
            let mut shared = lock(&self.shared);
            shared.urls.push(url.to_string());
            shared.refusals.pop_front().or(shared.refuse_all)
        };
        if let Some(refusal) = refusal {
            debug!(?refusal, "Refusing memory connection");
            return Err(refusal.into_error());
        }

        let (to_client, from_server) = mpsc::unbounded_channel();
        let (to_server, from_client) = mpsc::unbounded_channel();

        let peer = MemoryPeer {
            url: url.to_string(),
            to_client,
            from_client,
        };
        self.accepted
            .send(peer)
            .map_err(|_| TransportError::Handshake("memory server dropped".into()))?;

        Ok(TransportPair {
            sender: Box::new(MemorySender {
                tx: Some(to_server),
            }),
            receiver: Box::new(MemoryReceiver { rx: from_server }),
        })
    }

    fn name(&self) -> &'static str {
        "memory"
    }
}

impl MemoryServer {
    /// Wait for the next accepted connection.
    pub async fn accept(&mut self) -> Option<MemoryPeer> {
        self.accepted.recv().await
    }

    /// Return an already accepted connection, if any.
    pub fn try_accept(&mut self) -> Option<MemoryPeer> {
        self.accepted.try_recv().ok()
    }

    /// Fail the next connection attempt.
    pub fn refuse_next(&self, refusal: Refusal) {
        lock(&self.shared).refusals.push_back(refusal);
    }

    /// Fail every connection attempt until cleared with `None`.
    pub fn refuse_all(&self, refusal: Option<Refusal>) {
        lock(&self.shared).refuse_all = refusal;
    }

    /// Number of connection attempts seen so far, refused ones included.
    #[must_use]
    pub fn attempts(&self) -> usize {
        lock(&self.shared).urls.len()
    }

    /// URLs of every connection attempt, in order.
    #[must_use]
    pub fn urls(&self) -> Vec<String> {
        lock(&self.shared).urls.clone()
    }
}

/// Server end of one in-memory connection.
pub struct MemoryPeer {
    url: String,
    to_client: mpsc::UnboundedSender<PeerEvent>,
    from_client: mpsc::UnboundedReceiver<String>,
}

impl MemoryPeer {
    /// URL the client dialed.
    #[must_use]
    pub fn url(&self) -> &str {
        &self.url
    }

    /// Push a raw text frame to the client.
    pub fn send_text(&self, text: impl Into<String>) -> bool {
        self.to_client.send(PeerEvent::Text(text.into())).is_ok()
    }

    /// Encode and push a server frame to the client.
    pub fn send_frame(&self, frame: &ServerFrame) -> bool {
        match codec::encode_server(frame) {
            Ok(text) => self.send_text(text),
            Err(_) => false,
        }
    }

    /// Fail the client's read side with a transport error.
    pub fn fail(&self, message: impl Into<String>) -> bool {
        self.to_client.send(PeerEvent::Error(message.into())).is_ok()
    }

    /// Close the connection from the server side.
    pub fn close(&self) -> bool {
        self.to_client.send(PeerEvent::Close).is_ok()
    }

    /// Next raw text frame sent by the client. `None` once the client closed.
    pub async fn recv_text(&mut self) -> Option<String> {
        self.from_client.recv().await
    }

    /// Next raw text frame already sent by the client, without waiting.
    pub fn try_recv_text(&mut self) -> Option<String> {
        self.from_client.try_recv().ok()
    }

    /// Next decoded client frame.
    pub async fn recv_frame(&mut self) -> Option<ClientFrame> {
        let text = self.recv_text().await?;
        codec::decode_client(&text).ok()
    }
}

struct MemorySender {
    tx: Option<mpsc::UnboundedSender<String>>,
}

#[async_trait]
impl FrameSender for MemorySender {
    async fn send_text(&mut self, text: String) -> Result<(), TransportError> {
        let tx = self.tx.as_ref().ok_or(TransportError::ConnectionClosed)?;
        tx.send(text).map_err(|_| TransportError::ConnectionClosed)
    }

    async fn close(&mut self) -> Result<(), TransportError> {
        self.tx = None;
        Ok(())
    }
}

struct MemoryReceiver {
    rx: mpsc::UnboundedReceiver<PeerEvent>,
}

#[async_trait]
impl FrameReceiver for MemoryReceiver {
    async fn recv(&mut self) -> Result<Option<String>, TransportError> {
        match self.rx.recv().await {
            Some(PeerEvent::Text(text)) => Ok(Some(text)),
            Some(PeerEvent::Error(message)) => Err(TransportError::ReceiveFailed(message)),
            Some(PeerEvent::Close) | None => Ok(None),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use murmur_protocol::UserId;

    #[tokio::test]
    async fn test_connect_and_exchange() {
        let (connector, mut server) = MemoryConnector::new();
        let TransportPair {
            mut sender,
            mut receiver,
        } = connector.connect("memory://chat?token=t").await.unwrap();
        let mut peer = server.accept().await.unwrap();
        assert_eq!(peer.url(), "memory://chat?token=t");

        assert!(peer.send_frame(&ServerFrame::user_online("2", "bob")));
        let text = receiver.recv().await.unwrap().unwrap();
        assert!(matches!(
            codec::decode(&text).unwrap(),
            ServerFrame::UserOnline(user) if user.user_id == UserId::from("2")
        ));

        let frame = ClientFrame::test("hello");
        sender.send_text(codec::encode(&frame).unwrap()).await.unwrap();
        assert_eq!(peer.recv_frame().await, Some(frame));

        peer.close();
        assert_eq!(receiver.recv().await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_refusals() {
        let (connector, mut server) = MemoryConnector::new();
        server.refuse_next(Refusal::Unauthorized);

        let err = connector.connect("memory://a").await.err().unwrap();
        assert!(err.is_auth_rejection());

        server.refuse_all(Some(Refusal::Unreachable));
        let err = connector.connect("memory://b").await.err().unwrap();
        assert!(!err.is_auth_rejection());

        server.refuse_all(None);
        assert!(connector.connect("memory://c").await.is_ok());
        assert!(server.try_accept().is_some());
        assert_eq!(server.attempts(), 3);
        assert_eq!(server.urls()[2], "memory://c");
    }

    #[tokio::test]
    async fn test_client_close_ends_peer_stream() {
        let (connector, mut server) = MemoryConnector::new();
        let mut pair = connector.connect("memory://x").await.unwrap();
        let mut peer = server.accept().await.unwrap();

        pair.sender.close().await.unwrap();
        assert!(matches!(
            pair.sender.send_text("late".into()).await,
            Err(TransportError::ConnectionClosed)
        ));
        assert_eq!(peer.recv_text().await, None);
    }
}
