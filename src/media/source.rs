//! Caller-facing frame source.

use super::{Frame, VideoTrack};
use crate::errors::LinkError;
use crate::link::{ConnectionState, LinkSnapshot};
use tokio::sync::watch;

/// Hands out the freshest decoded frame of the link's current video track.
///
/// Frames decoded while the caller was busy are discarded; a call returns the
/// newest one, or waits for the next if none is buffered.
pub struct FrameSource {
    link: watch::Receiver<LinkSnapshot>,
}

impl FrameSource {
    pub(crate) fn new(link: watch::Receiver<LinkSnapshot>) -> Self {
        Self { link }
    }

    /// A source reading one fixed track, detached from any orchestrator.
    pub fn for_track(track: VideoTrack) -> Self {
        let (_tx, rx) = watch::channel(LinkSnapshot::detached_track(track));
        Self { link: rx }
    }

    /// The most recent frame, discarding any older backlog.
    pub async fn get_next_frame(&mut self) -> Result<Frame, LinkError> {
        let track = self.current_track().await?;
        track.queue().next_latest().await
    }

    /// Frames skipped so far on the current track.
    pub fn discarded(&self) -> u64 {
        self.link
            .borrow()
            .video_track()
            .map(|track| track.queue().discarded())
            .unwrap_or(0)
    }

    async fn current_track(&mut self) -> Result<VideoTrack, LinkError> {
        loop {
            {
                let snapshot = self.link.borrow_and_update();
                if let Some(track) = snapshot.video_track() {
                    return Ok(track.clone());
                }
                if snapshot.state() == ConnectionState::NotConnected {
                    return Err(LinkError::NotConnecting);
                }
            }
            // Still negotiating; wait for the track to arrive.
            self.link.changed().await.map_err(|_| LinkError::NotConnecting)?;
        }
    }
}
