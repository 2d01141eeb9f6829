//! Signaling transport.
//!
//! Owns a single relay socket, frames messages through the codec and turns a
//! clean remote close into [`Received::Closed`] instead of an error.

use super::codec::{self, CallOptions, SignalingMessage};
use crate::errors::LinkError;
use async_trait::async_trait;
use std::sync::Arc;

/// A message-oriented, ordered, reliable text socket to the relay.
#[async_trait]
pub trait SignalingSocket: Send {
    async fn send_text(&mut self, text: String) -> Result<(), LinkError>;

    /// Next text message, or `None` once the remote closed cleanly.
    async fn recv_text(&mut self) -> Result<Option<String>, LinkError>;

    async fn close(&mut self) -> Result<(), LinkError>;
}

/// Opens relay sockets.
#[async_trait]
pub trait Connector: Send + Sync {
    type Socket: SignalingSocket + 'static;

    async fn connect(&self, endpoint: &str) -> Result<Self::Socket, LinkError>;
}

#[async_trait]
impl<T: Connector + ?Sized> Connector for Arc<T> {
    type Socket = T::Socket;

    async fn connect(&self, endpoint: &str) -> Result<Self::Socket, LinkError> {
        self.as_ref().connect(endpoint).await
    }
}

/// Result of one receive.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Received {
    Message(SignalingMessage),
    /// The relay closed the connection cleanly.
    Closed,
}

/// One persistent relay connection.
pub struct Transport<S: SignalingSocket> {
    endpoint: String,
    socket: Option<S>,
}

impl<S: SignalingSocket> Transport<S> {
    /// Open the relay connection and announce the call.
    pub async fn connect<C>(connector: &C, endpoint: &str, options: &CallOptions) -> Result<Self, LinkError>
    where
        C: Connector<Socket = S>,
    {
        log::info!("Connecting to signaling relay at {}", endpoint);
        let socket = connector.connect(endpoint).await.map_err(|e| match e {
            LinkError::Connect(_) => e,
            other => LinkError::Connect(other.to_string()),
        })?;

        let mut transport = Self {
            endpoint: endpoint.to_string(),
            socket: Some(socket),
        };

        let request = codec::call_request(options)?;
        log::debug!("Sending call request: {}", request);
        if let Err(e) = transport.send_raw(request).await {
            transport.shutdown().await;
            return Err(LinkError::Connect(e.to_string()));
        }

        Ok(transport)
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }

    pub fn is_open(&self) -> bool {
        self.socket.is_some()
    }

    /// Wait for the next message.
    pub async fn receive(&mut self) -> Result<Received, LinkError> {
        let Some(socket) = self.socket.as_mut() else {
            return Ok(Received::Closed);
        };

        match socket.recv_text().await? {
            Some(text) => {
                log::debug!("Signaling <- {}", text);
                Ok(Received::Message(codec::decode(&text)?))
            }
            None => {
                log::info!("Signaling relay {} closed the connection", self.endpoint);
                self.socket = None;
                Ok(Received::Closed)
            }
        }
    }

    /// Encode and write one message.
    pub async fn send(&mut self, msg: &SignalingMessage) -> Result<(), LinkError> {
        let text = codec::encode(msg)?;
        self.send_raw(text).await
    }

    async fn send_raw(&mut self, text: String) -> Result<(), LinkError> {
        let socket = self
            .socket
            .as_mut()
            .ok_or_else(|| LinkError::Send("signaling socket is closed".to_string()))?;
        log::debug!("Signaling -> {}", text);
        socket.send_text(text).await.map_err(|e| match e {
            LinkError::Send(_) => e,
            other => LinkError::Send(other.to_string()),
        })
    }

    /// Say goodbye and shut the socket. Safe to call more than once.
    pub async fn close(&mut self) {
        if self.socket.is_none() {
            return;
        }
        if let Err(e) = self.send(&SignalingMessage::Hangup).await {
            log::debug!("Hangup not delivered to {}: {}", self.endpoint, e);
        }
        self.shutdown().await;
    }

    /// Shut the socket without sending anything.
    pub async fn shutdown(&mut self) {
        if let Some(mut socket) = self.socket.take() {
            if let Err(e) = socket.close().await {
                log::debug!("Ignoring error while closing signaling socket: {}", e);
            }
            log::info!("Signaling connection to {} closed", self.endpoint);
        }
    }
}
