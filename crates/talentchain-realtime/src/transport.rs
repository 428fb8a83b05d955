//! Duplex message transport used by the connection manager.
//!
//! The connection manager never touches a socket directly. It asks a
//! [`Connector`] for a [`TransportLink`]: a pair of channels carrying text
//! frames out and [`TransportEvent`]s in. [`WebSocketConnector`] backs the
//! link with a `tokio-tungstenite` client; tests back it with plain channels.

use crate::error::RealtimeError;
use async_trait::async_trait;
use futures_util::{SinkExt, StreamExt};
use tokio::sync::mpsc;
use tokio_tungstenite::{connect_async, tungstenite::Message};
use tracing::debug;
use url::Url;

/// Something observed on the inbound side of a transport.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TransportEvent {
    /// A text frame.
    Message(String),
    /// A transport-level error. A `Closed` usually follows.
    Error(String),
    /// The remote side closed or the stream ended.
    Closed,
}

/// An open transport.
///
/// Dropping the link closes the underlying connection.
#[derive(Debug)]
pub struct TransportLink {
    /// Frames to send.
    pub outbound: mpsc::UnboundedSender<String>,
    /// Frames and lifecycle notifications received.
    pub inbound: mpsc::UnboundedReceiver<TransportEvent>,
}

impl TransportLink {
    /// Whether the transport still accepts outbound frames.
    pub fn is_open(&self) -> bool {
        !self.outbound.is_closed()
    }

    /// Queue a text frame for sending.
    pub fn send(&self, frame: String) -> Result<(), RealtimeError> {
        self.outbound
            .send(frame)
            .map_err(|_| RealtimeError::ChannelClosed)
    }
}

/// Opens transports to an endpoint.
#[async_trait]
pub trait Connector: Send + Sync + 'static {
    /// Open a transport to `url`.
    async fn open(&self, url: &Url) -> Result<TransportLink, RealtimeError>;
}

/// WebSocket transport backed by `tokio-tungstenite`.
#[derive(Debug, Clone, Copy, Default)]
pub struct WebSocketConnector;

#[async_trait]
impl Connector for WebSocketConnector {
    async fn open(&self, url: &Url) -> Result<TransportLink, RealtimeError> {
        let (ws_stream, _) = connect_async(url.as_str())
            .await
            .map_err(|e| RealtimeError::Transport(e.to_string()))?;

        let (mut ws_sender, mut ws_receiver) = ws_stream.split();
        let (outbound_tx, mut outbound_rx) = mpsc::unbounded_channel::<String>();
        let (inbound_tx, inbound_rx) = mpsc::unbounded_channel();

        // Forward outbound frames until the link is dropped, then close.
        tokio::spawn(async move {
            while let Some(frame) = outbound_rx.recv().await {
                if ws_sender.send(Message::Text(frame)).await.is_err() {
                    break;
                }
            }
            let _ = ws_sender.close().await;
            debug!("WebSocket writer ended");
        });

        tokio::spawn(async move {
            while let Some(message) = ws_receiver.next().await {
                let event = match message {
                    Ok(Message::Text(text)) => TransportEvent::Message(text),
                    Ok(Message::Binary(bytes)) => match String::from_utf8(bytes) {
                        Ok(text) => TransportEvent::Message(text),
                        Err(_) => {
                            debug!("Non UTF-8 binary frame ignored");
                            continue;
                        }
                    },
                    Ok(Message::Close(_)) => break,
                    Ok(_) => continue,
                    Err(e) => {
                        let _ = inbound_tx.send(TransportEvent::Error(e.to_string()));
                        break;
                    }
                };
                if inbound_tx.send(event).is_err() {
                    // Link dropped by the owner.
                    return;
                }
            }
            let _ = inbound_tx.send(TransportEvent::Closed);
            debug!("WebSocket reader ended");
        });

        Ok(TransportLink {
            outbound: outbound_tx,
            inbound: inbound_rx,
        })
    }
}
