//! Peer session seam.
//!
//! The peer-connection engine (ICE, DTLS, SRTP, codecs) is a black box behind
//! these traits. Engine callbacks never touch link state directly; they post
//! [`PeerEvent`]s onto the orchestrator's queue.

#[cfg(feature = "webrtc")]
pub mod rtc;

use crate::config::PeerConfig;
use crate::errors::LinkError;
use crate::media::VideoTrack;
use crate::signaling::{IceCandidate, SessionDescription};
use async_trait::async_trait;
use bytes::Bytes;
use std::sync::Arc;
use tokio::sync::mpsc;

#[cfg(feature = "webrtc")]
pub use rtc::{RtcPeerFactory, RtcPeerSession};

/// Events raised by the peer engine.
pub enum PeerEvent {
    /// A remote video track started; frames land in its queue.
    VideoTrack(VideoTrack),
    /// The remote party opened a data channel.
    DataChannel(Arc<dyn DataChannel>),
    /// The data channel with this label closed.
    DataChannelClosed(String),
    /// This video track stopped delivering frames.
    TrackEnded(VideoTrack),
    /// Inbound data-channel payload.
    ChannelMessage(Bytes),
}

impl std::fmt::Debug for PeerEvent {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            PeerEvent::VideoTrack(track) => f.debug_tuple("VideoTrack").field(&track.id()).finish(),
            PeerEvent::DataChannel(channel) => f.debug_tuple("DataChannel").field(&channel.label()).finish(),
            PeerEvent::DataChannelClosed(label) => f.debug_tuple("DataChannelClosed").field(label).finish(),
            PeerEvent::TrackEnded(track) => f.debug_tuple("TrackEnded").field(&track.id()).finish(),
            PeerEvent::ChannelMessage(data) => f.debug_tuple("ChannelMessage").field(&data.len()).finish(),
        }
    }
}

pub type PeerEventSender = mpsc::UnboundedSender<PeerEvent>;
pub type PeerEventReceiver = mpsc::UnboundedReceiver<PeerEvent>;

/// Bidirectional message channel inside the peer session.
#[async_trait]
pub trait DataChannel: Send + Sync {
    fn label(&self) -> &str;

    /// Queue one binary message. Returns once the engine accepted it.
    async fn send(&self, data: Bytes) -> Result<(), LinkError>;
}

/// A negotiated peer connection.
#[async_trait]
pub trait PeerSession: Send + Sync {
    async fn set_remote_description(&self, desc: SessionDescription) -> Result<(), LinkError>;

    async fn create_answer(&self) -> Result<SessionDescription, LinkError>;

    async fn set_local_description(&self, desc: SessionDescription) -> Result<(), LinkError>;

    async fn local_description(&self) -> Option<SessionDescription>;

    async fn add_ice_candidate(&self, candidate: IceCandidate) -> Result<(), LinkError>;

    /// Start reporting remotely opened data channels as [`PeerEvent::DataChannel`].
    /// Calling it again must not register a second handler.
    async fn watch_data_channels(&self);

    async fn close(&self) -> Result<(), LinkError>;
}

/// Creates one peer session per orchestrator run.
#[async_trait]
pub trait PeerFactory: Send + Sync {
    /// Build a session whose track events are already wired to `events`.
    async fn create(
        &self,
        config: &PeerConfig,
        video_queue_capacity: usize,
        events: PeerEventSender,
    ) -> Result<Box<dyn PeerSession>, LinkError>;
}
