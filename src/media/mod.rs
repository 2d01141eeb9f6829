//! Inbound video: decoded frames, the freshness queue and the caller-facing source.

pub mod frame;
pub mod queue;
pub mod source;

pub use frame::Frame;
pub use queue::FrameQueue;
pub use source::FrameSource;

use image::RgbImage;
use std::sync::Arc;

/// Handle to a remote video track's decoded-frame queue.
///
/// Cloning shares the queue. The peer engine pushes, the frame source reads,
/// and only the orchestrator closes it.
#[derive(Clone)]
pub struct VideoTrack {
    id: String,
    queue: Arc<FrameQueue>,
}

impl VideoTrack {
    pub fn new(id: impl Into<String>, capacity: usize) -> Self {
        Self {
            id: id.into(),
            queue: Arc::new(FrameQueue::new(capacity)),
        }
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn queue(&self) -> &FrameQueue {
        &self.queue
    }

    /// Deliver a decoded image. Returns `false` once the track is closed.
    pub fn push_image(&self, image: RgbImage) -> bool {
        self.queue.push_image(image).is_some()
    }

    pub fn is_closed(&self) -> bool {
        self.queue.is_closed()
    }

    pub(crate) fn close(&self) {
        self.queue.close();
    }

    /// Whether both handles refer to the same underlying queue.
    pub fn same_track(&self, other: &VideoTrack) -> bool {
        Arc::ptr_eq(&self.queue, &other.queue)
    }
}

impl std::fmt::Debug for VideoTrack {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("VideoTrack")
            .field("id", &self.id)
            .field("queued", &self.queue.len())
            .field("closed", &self.queue.is_closed())
            .finish()
    }
}
