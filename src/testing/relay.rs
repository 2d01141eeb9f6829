//! Scripted signaling relay.
//!
//! [`MockRelay::pair`] returns the relay end a test drives and the
//! [`MockSocket`] end the link talks through. [`MockConnector`] hands out
//! prepared sockets in order.

use crate::errors::LinkError;
use crate::signaling::{Connector, SignalingSocket};
use async_trait::async_trait;
use serde_json::{json, Value};
use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use tokio::sync::mpsc;

#[derive(Debug)]
enum RelayFrame {
    Text(String),
    Close,
}

/// Test-side end of a relay connection.
pub struct MockRelay {
    to_client: mpsc::UnboundedSender<RelayFrame>,
    from_client: mpsc::UnboundedReceiver<String>,
    client_closed: Arc<AtomicBool>,
}

/// Link-side end of a relay connection.
pub struct MockSocket {
    incoming: mpsc::UnboundedReceiver<RelayFrame>,
    outgoing: mpsc::UnboundedSender<String>,
    closed: Arc<AtomicBool>,
}

impl MockRelay {
    pub fn pair() -> (MockRelay, MockSocket) {
        let (to_client, incoming) = mpsc::unbounded_channel();
        let (outgoing, from_client) = mpsc::unbounded_channel();
        let closed = Arc::new(AtomicBool::new(false));
        (
            MockRelay {
                to_client,
                from_client,
                client_closed: Arc::clone(&closed),
            },
            MockSocket {
                incoming,
                outgoing,
                closed,
            },
        )
    }

    pub fn send_text(&self, text: impl Into<String>) {
        let _ = self.to_client.send(RelayFrame::Text(text.into()));
    }

    fn send_json(&self, value: Value) {
        self.send_text(value.to_string());
    }

    /// Push a remote offer the way the relay frames it: a JSON string under `data`.
    pub fn send_offer(&self, sdp: &str) {
        let data = json!({ "type": "offer", "sdp": sdp }).to_string();
        self.send_json(json!({ "what": "offer", "data": data }));
    }

    pub fn send_answer(&self, sdp: &str) {
        let data = json!({ "type": "answer", "sdp": sdp }).to_string();
        self.send_json(json!({ "what": "answer", "data": data }));
    }

    /// Push a trickled candidate. `line` keeps its `candidate:` prefix.
    pub fn send_candidate(&self, line: &str, sdp_mid: &str, sdp_mline_index: u16) {
        let data = json!({
            "candidate": line,
            "sdpMid": sdp_mid,
            "sdpMLineIndex": sdp_mline_index,
        })
        .to_string();
        self.send_json(json!({ "what": "iceCandidate", "data": data }));
    }

    pub fn send_ice_done(&self) {
        self.send_json(json!({ "what": "iceCandidate", "data": "" }));
    }

    pub fn hangup(&self) {
        self.send_json(json!({ "what": "hangup" }));
    }

    /// Close the connection cleanly from the relay side.
    pub fn close(&self) {
        let _ = self.to_client.send(RelayFrame::Close);
    }

    /// Next text the link sent, or `None` once its socket is gone.
    pub async fn recv(&mut self) -> Option<String> {
        self.from_client.recv().await
    }

    pub async fn recv_json(&mut self) -> Option<Value> {
        let text = self.recv().await?;
        serde_json::from_str(&text).ok()
    }

    /// The `what` of the next message the link sent.
    pub async fn recv_what(&mut self) -> Option<String> {
        let value = self.recv_json().await?;
        value.get("what").and_then(Value::as_str).map(str::to_string)
    }

    pub fn client_closed(&self) -> bool {
        self.client_closed.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl SignalingSocket for MockSocket {
    async fn send_text(&mut self, text: String) -> Result<(), LinkError> {
        if self.closed.load(Ordering::SeqCst) {
            return Err(LinkError::Send("socket closed".to_string()));
        }
        self.outgoing
            .send(text)
            .map_err(|_| LinkError::Send("relay went away".to_string()))
    }

    async fn recv_text(&mut self) -> Result<Option<String>, LinkError> {
        match self.incoming.recv().await {
            Some(RelayFrame::Text(text)) => Ok(Some(text)),
            Some(RelayFrame::Close) | None => Ok(None),
        }
    }

    async fn close(&mut self) -> Result<(), LinkError> {
        self.closed.store(true, Ordering::SeqCst);
        Ok(())
    }
}

/// Hands out queued sockets; connecting with none left is refused.
#[derive(Default)]
pub struct MockConnector {
    sockets: Mutex<VecDeque<MockSocket>>,
    endpoints: Mutex<Vec<String>>,
}

impl MockConnector {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_socket(socket: MockSocket) -> Self {
        let connector = Self::new();
        connector.push(socket);
        connector
    }

    pub fn push(&self, socket: MockSocket) {
        lock(&self.sockets).push_back(socket);
    }

    /// Endpoints passed to `connect`, in order.
    pub fn endpoints(&self) -> Vec<String> {
        lock(&self.endpoints).clone()
    }
}

#[async_trait]
impl Connector for MockConnector {
    type Socket = MockSocket;

    async fn connect(&self, endpoint: &str) -> Result<MockSocket, LinkError> {
        lock(&self.endpoints).push(endpoint.to_string());
        lock(&self.sockets)
            .pop_front()
            .ok_or_else(|| LinkError::Connect(format!("connection refused: {}", endpoint)))
    }
}

pub(crate) fn lock<T>(mutex: &Mutex<T>) -> std::sync::MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}
