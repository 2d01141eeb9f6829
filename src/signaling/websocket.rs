//! WebSocket relay socket backed by tokio-tungstenite.

use super::transport::{Connector, SignalingSocket};
use crate::errors::LinkError;
use async_trait::async_trait;
use futures_util::{SinkExt, StreamExt};
use tokio::net::TcpStream;
use tokio_tungstenite::tungstenite::{self, Message};
use tokio_tungstenite::{connect_async, MaybeTlsStream, WebSocketStream};

/// Connects to `ws://` relays.
#[derive(Debug, Clone, Copy, Default)]
pub struct WsConnector;

pub struct WsSocket {
    stream: WebSocketStream<MaybeTlsStream<TcpStream>>,
}

#[async_trait]
impl Connector for WsConnector {
    type Socket = WsSocket;

    async fn connect(&self, endpoint: &str) -> Result<WsSocket, LinkError> {
        let (stream, response) = connect_async(endpoint)
            .await
            .map_err(|e| LinkError::Connect(format!("{}: {}", endpoint, e)))?;
        log::debug!("WebSocket handshake with {} returned {}", endpoint, response.status());
        Ok(WsSocket { stream })
    }
}

#[async_trait]
impl SignalingSocket for WsSocket {
    async fn send_text(&mut self, text: String) -> Result<(), LinkError> {
        self.stream
            .send(Message::Text(text))
            .await
            .map_err(|e| LinkError::Send(e.to_string()))
    }

    async fn recv_text(&mut self) -> Result<Option<String>, LinkError> {
        while let Some(msg) = self.stream.next().await {
            match msg {
                Ok(Message::Text(text)) => return Ok(Some(text)),
                Ok(Message::Binary(data)) => {
                    let text = String::from_utf8(data).map_err(|e| {
                        LinkError::MalformedPayload(format!("Binary signaling frame is not UTF-8: {}", e))
                    })?;
                    return Ok(Some(text));
                }
                Ok(Message::Close(frame)) => {
                    log::debug!("Relay sent close frame: {:?}", frame);
                    return Ok(None);
                }
                // Ping/pong replies are queued by tungstenite itself.
                Ok(_) => continue,
                Err(tungstenite::Error::ConnectionClosed)
                | Err(tungstenite::Error::AlreadyClosed)
                | Err(tungstenite::Error::Protocol(
                    tungstenite::error::ProtocolError::ResetWithoutClosingHandshake,
                )) => return Ok(None),
                Err(e) => return Err(LinkError::Peer(format!("Signaling socket error: {}", e))),
            }
        }
        Ok(None)
    }

    async fn close(&mut self) -> Result<(), LinkError> {
        match self.stream.close(None).await {
            Ok(()) | Err(tungstenite::Error::ConnectionClosed) | Err(tungstenite::Error::AlreadyClosed) => Ok(()),
            Err(e) => Err(LinkError::Send(e.to_string())),
        }
    }
}
