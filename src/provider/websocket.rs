//! WebSocket duplex transport
//!
//! Connects with `tokio-tungstenite`, splits the stream, and runs a reader
//! task that forwards inbound frames as `TransportEvent`s. The write half
//! stays with the handle.

use crate::error::{ChatError, Result};
use crate::provider::{Transport, TransportEvent, TransportHandle};
use async_trait::async_trait;
use futures::stream::SplitSink;
use futures::{SinkExt, StreamExt};
use tokio::net::TcpStream;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_tungstenite::tungstenite::protocol::Message;
use tokio_tungstenite::{connect_async, MaybeTlsStream, WebSocketStream};

type WsSink = SplitSink<WebSocketStream<MaybeTlsStream<TcpStream>>, Message>;

/// Transport that opens WebSocket connections
#[derive(Debug, Clone, Default)]
pub struct WebSocketTransport;

impl WebSocketTransport {
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl Transport for WebSocketTransport {
    async fn open(
        &self,
        url: &str,
        events: mpsc::UnboundedSender<TransportEvent>,
    ) -> Result<Box<dyn TransportHandle>> {
        tracing::debug!("Opening WebSocket transport");

        let (ws, _) = connect_async(url)
            .await
            .map_err(|e| ChatError::Transport(format!("WebSocket connect failed: {}", e)))?;
        let (sink, mut stream) = ws.split();

        let reader = tokio::spawn(async move {
            while let Some(msg) = stream.next().await {
                let event = match msg {
                    Ok(Message::Text(text)) => TransportEvent::Frame(text),
                    Ok(Message::Binary(data)) => match String::from_utf8(data) {
                        Ok(text) => TransportEvent::Frame(text),
                        Err(_) => continue,
                    },
                    Ok(Message::Close(_)) => break,
                    // Ping/pong is answered by tungstenite
                    Ok(_) => continue,
                    Err(e) => {
                        let _ = events.send(TransportEvent::Error(e.to_string()));
                        break;
                    }
                };
                if events.send(event).is_err() {
                    // Receiver gone: the session dropped this connection
                    return;
                }
            }
            let _ = events.send(TransportEvent::Closed);
        });

        tracing::debug!("WebSocket transport open");
        Ok(Box::new(WebSocketHandle {
            sink,
            reader: Some(reader),
        }))
    }
}

/// Write half of an open WebSocket plus its reader task
pub struct WebSocketHandle {
    sink: WsSink,
    reader: Option<JoinHandle<()>>,
}

#[async_trait]
impl TransportHandle for WebSocketHandle {
    async fn send_text(&mut self, text: String) -> Result<()> {
        self.sink
            .send(Message::Text(text))
            .await
            .map_err(|e| ChatError::Transport(format!("Failed to send frame: {}", e)))
    }

    async fn close(&mut self) -> Result<()> {
        if let Some(reader) = self.reader.take() {
            reader.abort();
        }
        self.sink
            .close()
            .await
            .map_err(|e| ChatError::Transport(format!("Failed to close WebSocket: {}", e)))
    }
}

impl Drop for WebSocketHandle {
    fn drop(&mut self) {
        if let Some(reader) = self.reader.take() {
            reader.abort();
        }
    }
}
