use crate::media::VideoTrack;
use crate::peer::DataChannel;
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use uuid::Uuid;

/// Combined readiness of the link.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum ConnectionState {
    #[default]
    NotConnected,
    Connecting,
    /// Video track and data channel are both available.
    Connected,
}

impl ConnectionState {
    pub fn as_str(&self) -> &'static str {
        match self {
            ConnectionState::NotConnected => "not-connected",
            ConnectionState::Connecting => "connecting",
            ConnectionState::Connected => "connected",
        }
    }
}

impl std::fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// What the orchestrator publishes after every transition.
///
/// `state` is derived from the two handles while a session is active, so
/// `Connected` holds exactly when both are present.
#[derive(Clone, Default)]
pub struct LinkSnapshot {
    state: ConnectionState,
    data_channel: Option<Arc<dyn DataChannel>>,
    video_track: Option<VideoTrack>,
    session_id: Option<Uuid>,
}

impl LinkSnapshot {
    pub fn state(&self) -> ConnectionState {
        self.state
    }

    pub fn data_channel(&self) -> Option<&Arc<dyn DataChannel>> {
        self.data_channel.as_ref()
    }

    pub fn video_track(&self) -> Option<&VideoTrack> {
        self.video_track.as_ref()
    }

    pub fn session_id(&self) -> Option<Uuid> {
        self.session_id
    }

    pub fn is_connected(&self) -> bool {
        self.state == ConnectionState::Connected
    }

    pub(crate) fn detached_track(track: VideoTrack) -> Self {
        Self {
            state: ConnectionState::Connecting,
            video_track: Some(track),
            ..Self::default()
        }
    }

    pub(crate) fn detached_channel(channel: Arc<dyn DataChannel>) -> Self {
        Self {
            state: ConnectionState::Connecting,
            data_channel: Some(channel),
            ..Self::default()
        }
    }

    pub(crate) fn begin(&mut self, session_id: Uuid) {
        self.data_channel = None;
        self.video_track = None;
        self.session_id = Some(session_id);
        self.state = ConnectionState::Connecting;
    }

    /// Install the video track. Ignored (and the track closed) when no session is active.
    pub(crate) fn attach_track(&mut self, track: VideoTrack) {
        if self.state == ConnectionState::NotConnected {
            track.close();
            return;
        }
        if let Some(previous) = self.video_track.replace(track) {
            previous.close();
        }
        self.settle();
    }

    pub(crate) fn attach_channel(&mut self, channel: Arc<dyn DataChannel>) {
        if self.state == ConnectionState::NotConnected {
            return;
        }
        self.data_channel = Some(channel);
        self.settle();
    }

    /// Drop the data channel if it carries `label`. Returns whether it did.
    pub(crate) fn detach_channel(&mut self, label: &str) -> bool {
        let matches = self
            .data_channel
            .as_ref()
            .map(|channel| channel.label() == label)
            .unwrap_or(false);
        if matches {
            self.data_channel = None;
            self.settle();
        }
        matches
    }

    /// Drop the video track if it is `ended`. A track that was already
    /// replaced leaves the current one alone. Returns whether it dropped.
    pub(crate) fn detach_track(&mut self, ended: &VideoTrack) -> bool {
        let matches = self
            .video_track
            .as_ref()
            .map(|track| track.same_track(ended))
            .unwrap_or(false);
        if matches {
            if let Some(track) = self.video_track.take() {
                track.close();
            }
            self.settle();
        }
        matches
    }

    /// Back to `NotConnected` with both handles gone.
    pub(crate) fn reset(&mut self) {
        if let Some(track) = self.video_track.take() {
            track.close();
        }
        self.data_channel = None;
        self.session_id = None;
        self.state = ConnectionState::NotConnected;
    }

    fn settle(&mut self) {
        self.state = if self.data_channel.is_some() && self.video_track.is_some() {
            ConnectionState::Connected
        } else {
            ConnectionState::Connecting
        };
    }
}

impl std::fmt::Debug for LinkSnapshot {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LinkSnapshot")
            .field("state", &self.state)
            .field("data_channel", &self.data_channel.as_ref().map(|c| c.label().to_string()))
            .field("video_track", &self.video_track)
            .field("session_id", &self.session_id)
            .finish()
    }
}

/// Running counters for one orchestrator.
#[derive(Debug, Default)]
pub struct LinkStats {
    sessions_started: AtomicU64,
    messages_received: AtomicU64,
    candidates_applied: AtomicU64,
    candidates_deferred: AtomicU64,
    answers_sent: AtomicU64,
}

impl LinkStats {
    pub(crate) fn session_started(&self) {
        self.sessions_started.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn message_received(&self) {
        self.messages_received.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn candidate_applied(&self) {
        self.candidates_applied.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn candidate_deferred(&self) {
        self.candidates_deferred.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn answer_sent(&self) {
        self.answers_sent.fetch_add(1, Ordering::Relaxed);
    }

    pub fn snapshot(&self) -> LinkStatsSnapshot {
        LinkStatsSnapshot {
            sessions_started: self.sessions_started.load(Ordering::Relaxed),
            messages_received: self.messages_received.load(Ordering::Relaxed),
            candidates_applied: self.candidates_applied.load(Ordering::Relaxed),
            candidates_deferred: self.candidates_deferred.load(Ordering::Relaxed),
            answers_sent: self.answers_sent.load(Ordering::Relaxed),
        }
    }
}

/// Point-in-time copy of [`LinkStats`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct LinkStatsSnapshot {
    pub sessions_started: u64,
    pub messages_received: u64,
    pub candidates_applied: u64,
    /// Candidates that arrived before the remote description
    pub candidates_deferred: u64,
    pub answers_sent: u64,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::MockDataChannel;

    fn channel(label: &str) -> Arc<dyn DataChannel> {
        Arc::new(MockDataChannel::new(label))
    }

    fn active() -> LinkSnapshot {
        let mut snapshot = LinkSnapshot::default();
        snapshot.begin(Uuid::new_v4());
        snapshot
    }

    #[test]
    fn test_default_is_not_connected() {
        let snapshot = LinkSnapshot::default();
        assert_eq!(snapshot.state(), ConnectionState::NotConnected);
        assert!(snapshot.data_channel().is_none());
        assert!(snapshot.video_track().is_none());
    }

    #[test]
    fn test_track_then_channel_connects() {
        let mut snapshot = active();
        snapshot.attach_track(VideoTrack::new("video", 4));
        assert_eq!(snapshot.state(), ConnectionState::Connecting);
        snapshot.attach_channel(channel("control"));
        assert_eq!(snapshot.state(), ConnectionState::Connected);
    }

    #[test]
    fn test_channel_then_track_connects() {
        let mut snapshot = active();
        snapshot.attach_channel(channel("control"));
        assert_eq!(snapshot.state(), ConnectionState::Connecting);
        snapshot.attach_track(VideoTrack::new("video", 4));
        assert_eq!(snapshot.state(), ConnectionState::Connected);
    }

    #[test]
    fn test_handles_ignored_while_not_connected() {
        let mut snapshot = LinkSnapshot::default();
        let track = VideoTrack::new("video", 4);
        snapshot.attach_channel(channel("control"));
        snapshot.attach_track(track.clone());
        assert_eq!(snapshot.state(), ConnectionState::NotConnected);
        assert!(snapshot.data_channel().is_none());
        assert!(snapshot.video_track().is_none());
        assert!(track.is_closed());
    }

    #[test]
    fn test_detach_channel_demotes() {
        let mut snapshot = active();
        snapshot.attach_channel(channel("control"));
        snapshot.attach_track(VideoTrack::new("video", 4));

        assert!(!snapshot.detach_channel("other"));
        assert!(snapshot.is_connected());

        assert!(snapshot.detach_channel("control"));
        assert_eq!(snapshot.state(), ConnectionState::Connecting);
    }

    #[test]
    fn test_detach_track_closes_queue() {
        let mut snapshot = active();
        let track = VideoTrack::new("video", 4);
        snapshot.attach_track(track.clone());
        assert!(snapshot.detach_track(&track));
        assert!(track.is_closed());
        assert!(!snapshot.detach_track(&track));
    }

    #[test]
    fn test_replaced_track_end_is_ignored() {
        let mut snapshot = active();
        let old = VideoTrack::new("video", 4);
        let new = VideoTrack::new("video", 4);
        snapshot.attach_track(old.clone());
        snapshot.attach_track(new.clone());
        snapshot.attach_channel(channel("control"));
        assert!(old.is_closed());

        assert!(!snapshot.detach_track(&old));
        assert!(snapshot.is_connected());
        assert!(!new.is_closed());
        assert!(snapshot.video_track().unwrap().same_track(&new));
    }

    #[test]
    fn test_reset_clears_handles() {
        let mut snapshot = active();
        let track = VideoTrack::new("video", 4);
        snapshot.attach_channel(channel("control"));
        snapshot.attach_track(track.clone());

        snapshot.reset();
        assert_eq!(snapshot.state(), ConnectionState::NotConnected);
        assert!(snapshot.data_channel().is_none());
        assert!(snapshot.video_track().is_none());
        assert!(snapshot.session_id().is_none());
        assert!(track.is_closed());
    }
}
