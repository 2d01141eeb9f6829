//! Recording peer engine.
//!
//! [`MockPeer`] stands in for a real peer connection: it records every call
//! the orchestrator makes and lets a test raise engine events (track opened,
//! data channel opened or closed) by hand.

use super::relay::lock;
use crate::config::PeerConfig;
use crate::errors::LinkError;
use crate::media::VideoTrack;
use crate::peer::{DataChannel, PeerEvent, PeerEventSender, PeerFactory, PeerSession};
use crate::signaling::{IceCandidate, SessionDescription};
use async_trait::async_trait;
use bytes::Bytes;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

/// SDP returned by [`MockPeer`] from `create_answer`.
pub const MOCK_ANSWER_SDP: &str = "v=0\r\no=- 0 0 IN IP4 127.0.0.1\r\ns=mock-answer\r\n";

/// One call made on a [`MockPeer`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PeerCall {
    SetRemote(SessionDescription),
    CreateAnswer,
    SetLocal(SessionDescription),
    AddCandidate(IceCandidate),
    WatchDataChannels,
    Close,
}

pub struct MockPeer {
    events: PeerEventSender,
    video_capacity: usize,
    calls: Mutex<Vec<PeerCall>>,
    local: Mutex<Option<SessionDescription>>,
    closed: AtomicBool,
    reject_candidates: AtomicBool,
}

impl MockPeer {
    fn new(events: PeerEventSender, video_capacity: usize) -> Self {
        Self {
            events,
            video_capacity,
            calls: Mutex::new(Vec::new()),
            local: Mutex::new(None),
            closed: AtomicBool::new(false),
            reject_candidates: AtomicBool::new(false),
        }
    }

    fn record(&self, call: PeerCall) {
        lock(&self.calls).push(call);
    }

    pub fn calls(&self) -> Vec<PeerCall> {
        lock(&self.calls).clone()
    }

    pub fn candidates(&self) -> Vec<IceCandidate> {
        lock(&self.calls)
            .iter()
            .filter_map(|call| match call {
                PeerCall::AddCandidate(candidate) => Some(candidate.clone()),
                _ => None,
            })
            .collect()
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }

    pub fn reject_candidates(&self, reject: bool) {
        self.reject_candidates.store(reject, Ordering::SeqCst);
    }

    /// Start a remote video track and return the engine's end of it.
    pub fn open_track(&self) -> VideoTrack {
        let track = VideoTrack::new("video0", self.video_capacity);
        self.emit(PeerEvent::VideoTrack(track.clone()));
        track
    }

    /// Report that `track` stopped, as the engine's reader does when it exits.
    pub fn end_track(&self, track: &VideoTrack) {
        self.emit(PeerEvent::TrackEnded(track.clone()));
    }

    /// Open a data channel as the remote party would.
    pub fn open_data_channel(&self, label: &str) -> Arc<MockDataChannel> {
        let channel = Arc::new(MockDataChannel::new(label));
        self.emit(PeerEvent::DataChannel(channel.clone()));
        channel
    }

    pub fn close_data_channel(&self, label: &str) {
        self.emit(PeerEvent::DataChannelClosed(label.to_string()));
    }

    pub fn deliver_message(&self, data: &[u8]) {
        self.emit(PeerEvent::ChannelMessage(Bytes::copy_from_slice(data)));
    }

    fn emit(&self, event: PeerEvent) {
        if self.events.send(event).is_err() {
            log::debug!("Mock peer event dropped; orchestrator is gone");
        }
    }

    /// Wait until the recorded calls satisfy `done`.
    pub async fn wait_until<F>(&self, done: F)
    where
        F: Fn(&[PeerCall]) -> bool,
    {
        loop {
            let finished = done(lock(&self.calls).as_slice());
            if finished {
                return;
            }
            tokio::time::sleep(Duration::from_millis(1)).await;
        }
    }
}

struct SharedPeer(Arc<MockPeer>);

#[async_trait]
impl PeerSession for SharedPeer {
    async fn set_remote_description(&self, desc: SessionDescription) -> Result<(), LinkError> {
        self.0.record(PeerCall::SetRemote(desc));
        Ok(())
    }

    async fn create_answer(&self) -> Result<SessionDescription, LinkError> {
        self.0.record(PeerCall::CreateAnswer);
        Ok(SessionDescription::answer(MOCK_ANSWER_SDP))
    }

    async fn set_local_description(&self, desc: SessionDescription) -> Result<(), LinkError> {
        self.0.record(PeerCall::SetLocal(desc.clone()));
        *lock(&self.0.local) = Some(desc);
        Ok(())
    }

    async fn local_description(&self) -> Option<SessionDescription> {
        lock(&self.0.local).clone()
    }

    async fn add_ice_candidate(&self, candidate: IceCandidate) -> Result<(), LinkError> {
        self.0.record(PeerCall::AddCandidate(candidate));
        if self.0.reject_candidates.load(Ordering::SeqCst) {
            return Err(LinkError::Peer("candidate rejected".to_string()));
        }
        Ok(())
    }

    async fn watch_data_channels(&self) {
        self.0.record(PeerCall::WatchDataChannels);
    }

    async fn close(&self) -> Result<(), LinkError> {
        self.0.record(PeerCall::Close);
        self.0.closed.store(true, Ordering::SeqCst);
        Ok(())
    }
}

/// Creates [`MockPeer`]s and keeps them for inspection.
#[derive(Default)]
pub struct MockPeerFactory {
    sessions: Mutex<Vec<Arc<MockPeer>>>,
    fail: AtomicBool,
}

impl MockPeerFactory {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make every following `create` fail.
    pub fn fail_creation(&self, fail: bool) {
        self.fail.store(fail, Ordering::SeqCst);
    }

    pub fn sessions(&self) -> Vec<Arc<MockPeer>> {
        lock(&self.sessions).clone()
    }

    pub fn last_session(&self) -> Option<Arc<MockPeer>> {
        lock(&self.sessions).last().cloned()
    }

    /// Wait for the `index`-th session (0-based) to be created.
    pub async fn session(&self, index: usize) -> Arc<MockPeer> {
        loop {
            let created = lock(&self.sessions).get(index).cloned();
            if let Some(peer) = created {
                return peer;
            }
            tokio::time::sleep(Duration::from_millis(1)).await;
        }
    }
}

#[async_trait]
impl PeerFactory for MockPeerFactory {
    async fn create(
        &self,
        _config: &PeerConfig,
        video_queue_capacity: usize,
        events: PeerEventSender,
    ) -> Result<Box<dyn PeerSession>, LinkError> {
        if self.fail.load(Ordering::SeqCst) {
            return Err(LinkError::Peer("peer engine unavailable".to_string()));
        }
        let peer = Arc::new(MockPeer::new(events, video_queue_capacity));
        lock(&self.sessions).push(Arc::clone(&peer));
        Ok(Box::new(SharedPeer(peer)))
    }
}

/// Data channel that records what was sent on it.
pub struct MockDataChannel {
    label: String,
    sent: Mutex<Vec<Bytes>>,
    fail: AtomicBool,
}

impl MockDataChannel {
    pub fn new(label: &str) -> Self {
        Self {
            label: label.to_string(),
            sent: Mutex::new(Vec::new()),
            fail: AtomicBool::new(false),
        }
    }

    pub fn sent(&self) -> Vec<Bytes> {
        lock(&self.sent).clone()
    }

    pub fn fail_sends(&self, fail: bool) {
        self.fail.store(fail, Ordering::SeqCst);
    }
}

#[async_trait]
impl DataChannel for MockDataChannel {
    fn label(&self) -> &str {
        &self.label
    }

    async fn send(&self, data: Bytes) -> Result<(), LinkError> {
        if self.fail.load(Ordering::SeqCst) {
            return Err(LinkError::Send("data channel closed".to_string()));
        }
        lock(&self.sent).push(data);
        Ok(())
    }
}
