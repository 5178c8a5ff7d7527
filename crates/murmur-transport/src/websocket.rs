//! WebSocket transport implementation.
//!
//! This module provides a WebSocket client connector using tokio-tungstenite.

use async_trait::async_trait;
use futures_util::stream::{SplitSink, SplitStream};
use futures_util::{SinkExt, StreamExt};
use tokio::net::TcpStream;
use tokio_tungstenite::{
    connect_async,
    tungstenite::{Error as WsError, Message},
    MaybeTlsStream, WebSocketStream,
};
use tracing::{debug, warn};

use crate::traits::{Connector, FrameReceiver, FrameSender, TransportError, TransportPair};

type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;

/// WebSocket connector configuration.
#[derive(Debug, Clone)]
pub struct WebSocketConfig {
    /// Maximum inbound message size in bytes.
    pub max_message_size: usize,
}

impl Default for WebSocketConfig {
    fn default() -> Self {
        Self {
            max_message_size: murmur_protocol::codec::MAX_FRAME_SIZE,
        }
    }
}

/// WebSocket connector.
#[derive(Debug, Clone, Default)]
pub struct WebSocketConnector {
    config: WebSocketConfig,
}

impl WebSocketConnector {
    /// Create a new WebSocket connector.
    #[must_use]
    pub fn new(config: WebSocketConfig) -> Self {
        Self { config }
    }
}

fn handshake_error(err: WsError) -> TransportError {
    match err {
        WsError::Http(response) => {
            let status = response.status().as_u16();
            if status == 401 || status == 403 {
                TransportError::Unauthorized(status)
            } else {
                TransportError::Handshake(format!("HTTP {status}"))
            }
        }
        WsError::Io(e) => TransportError::Io(e),
        other => TransportError::Handshake(other.to_string()),
    }
}

#[async_trait]
impl Connector for WebSocketConnector {
    async fn connect(&self, url: &str) -> Result<TransportPair, TransportError> {
        let (stream, response) = connect_async(url).await.map_err(handshake_error)?;

        debug!(status = %response.status(), "WebSocket handshake completed");

        let (sink, stream) = stream.split();
        Ok(TransportPair {
            sender: Box::new(WebSocketSender {
                sink,
                is_open: true,
            }),
            receiver: Box::new(WebSocketReceiver {
                stream,
                max_message_size: self.config.max_message_size,
            }),
        })
    }

    fn name(&self) -> &'static str {
        "websocket"
    }
}

/// Outbound half of a WebSocket connection.
pub struct WebSocketSender {
    sink: SplitSink<WsStream, Message>,
    is_open: bool,
}

#[async_trait]
impl FrameSender for WebSocketSender {
    async fn send_text(&mut self, text: String) -> Result<(), TransportError> {
        if !self.is_open {
            return Err(TransportError::ConnectionClosed);
        }

        self.sink
            .send(Message::Text(text))
            .await
            .map_err(|e| TransportError::SendFailed(e.to_string()))
    }

    async fn close(&mut self) -> Result<(), TransportError> {
        if !std::mem::replace(&mut self.is_open, false) {
            return Ok(()); // Already closed
        }

        match self.sink.close().await {
            Ok(()) | Err(WsError::ConnectionClosed) | Err(WsError::AlreadyClosed) => Ok(()),
            Err(e) => Err(TransportError::SendFailed(format!("Failed to close: {e}"))),
        }
    }
}

/// Inbound half of a WebSocket connection.
pub struct WebSocketReceiver {
    stream: SplitStream<WsStream>,
    max_message_size: usize,
}

impl WebSocketReceiver {
    fn check_size(&self, len: usize) -> Result<(), TransportError> {
        if len > self.max_message_size {
            warn!(
                "Message too large: {} bytes (max: {})",
                len, self.max_message_size
            );
            return Err(TransportError::MessageTooLarge(len));
        }
        Ok(())
    }
}

#[async_trait]
impl FrameReceiver for WebSocketReceiver {
    async fn recv(&mut self) -> Result<Option<String>, TransportError> {
        loop {
            match self.stream.next().await {
                Some(Ok(Message::Text(text))) => {
                    self.check_size(text.len())?;
                    return Ok(Some(text));
                }
                Some(Ok(Message::Binary(data))) => {
                    self.check_size(data.len())?;
                    match String::from_utf8(data) {
                        Ok(text) => return Ok(Some(text)),
                        Err(_) => warn!("Dropping non-UTF-8 binary message"),
                    }
                }
                // Pongs for inbound pings are queued by tungstenite and
                // flushed on the next read or write.
                Some(Ok(Message::Ping(_))) | Some(Ok(Message::Pong(_))) => {}
                Some(Ok(Message::Frame(_))) => {}
                Some(Ok(Message::Close(frame))) => {
                    debug!(?frame, "Received close frame");
                    return Ok(None);
                }
                Some(Err(WsError::ConnectionClosed)) | Some(Err(WsError::AlreadyClosed)) => {
                    debug!("Connection closed");
                    return Ok(None);
                }
                Some(Err(e)) => {
                    return Err(TransportError::ReceiveFailed(e.to_string()));
                }
                None => {
                    debug!("WebSocket stream ended");
                    return Ok(None);
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::io::{AsyncReadExt, AsyncWriteExt};
    use tokio::net::TcpListener;

    #[test]
    fn test_websocket_config_default() {
        let config = WebSocketConfig::default();
        assert_eq!(config.max_message_size, 1024 * 1024);
    }

    #[tokio::test]
    async fn test_round_trip_against_local_server() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();

        let server = tokio::spawn(async move {
            let (stream, _) = listener.accept().await.unwrap();
            let mut ws = tokio_tungstenite::accept_async(stream).await.unwrap();
            ws.send(Message::Text(r#"{"type":"welcome"}"#.into()))
                .await
                .unwrap();
            let echoed = ws.next().await.unwrap().unwrap();
            ws.close(None).await.unwrap();
            echoed
        });

        let connector = WebSocketConnector::default();
        let url = format!("ws://{addr}/ws/chat?token=abc");
        let TransportPair {
            mut sender,
            mut receiver,
        } = connector.connect(&url).await.unwrap();

        let first = receiver.recv().await.unwrap();
        assert_eq!(first.as_deref(), Some(r#"{"type":"welcome"}"#));

        sender.send_text("ping".into()).await.unwrap();
        assert_eq!(receiver.recv().await.unwrap(), None);

        let echoed = server.await.unwrap();
        assert_eq!(echoed, Message::Text("ping".into()));
    }

    #[tokio::test]
    async fn test_unauthorized_handshake() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();

        tokio::spawn(async move {
            let (mut stream, _) = listener.accept().await.unwrap();
            let mut buf = [0u8; 1024];
            let _ = stream.read(&mut buf).await;
            stream
                .write_all(b"HTTP/1.1 401 Unauthorized\r\nContent-Length: 0\r\n\r\n")
                .await
                .unwrap();
        });

        let connector = WebSocketConnector::default();
        let result = connector.connect(&format!("ws://{addr}/ws/chat")).await;
        assert!(matches!(result, Err(TransportError::Unauthorized(401))));
    }

    #[tokio::test]
    async fn test_unreachable_server() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        drop(listener);

        let connector = WebSocketConnector::default();
        let result = connector.connect(&format!("ws://{addr}/ws/chat")).await;
        assert!(result.is_err());
        assert!(!result.err().unwrap().is_auth_rejection());
    }
}
