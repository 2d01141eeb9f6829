//! Bounded frame queue with a "latest wins" read.
//!
//! The engine pushes decoded frames as they arrive; when full the oldest is
//! dropped. Readers never consume the backlog in order: [`FrameQueue::take_latest`]
//! drains everything and hands back only the newest frame.

use super::frame::Frame;
use crate::errors::LinkError;
use image::RgbImage;
use std::collections::VecDeque;
use std::sync::{Mutex, MutexGuard};
use tokio::sync::Notify;

pub struct FrameQueue {
    inner: Mutex<QueueInner>,
    notify: Notify,
}

struct QueueInner {
    items: VecDeque<Frame>,
    capacity: usize,
    next_sequence: u64,
    /// Dropped on push because the queue was full
    dropped: u64,
    /// Skipped by `take_latest` in favour of a newer frame
    discarded: u64,
    closed: bool,
}

impl FrameQueue {
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            inner: Mutex::new(QueueInner {
                items: VecDeque::with_capacity(capacity.min(1024)),
                capacity,
                next_sequence: 0,
                dropped: 0,
                discarded: 0,
                closed: false,
            }),
            notify: Notify::new(),
        }
    }

    fn lock(&self) -> MutexGuard<'_, QueueInner> {
        self.inner.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Queue a decoded image, stamping the next sequence number.
    pub fn push_image(&self, image: RgbImage) -> Option<u64> {
        let mut g = self.lock();
        if g.closed {
            return None;
        }
        let sequence = g.next_sequence;
        g.next_sequence = g.next_sequence.saturating_add(1);
        Self::push_locked(&mut g, Frame::new(image, sequence));
        drop(g);
        self.notify.notify_one();
        Some(sequence)
    }

    /// Queue a ready frame as-is. Ignored once closed.
    pub fn push(&self, frame: Frame) {
        let mut g = self.lock();
        if g.closed {
            return;
        }
        g.next_sequence = g.next_sequence.max(frame.sequence.saturating_add(1));
        Self::push_locked(&mut g, frame);
        drop(g);
        self.notify.notify_one();
    }

    fn push_locked(g: &mut QueueInner, frame: Frame) {
        if g.items.len() >= g.capacity {
            g.items.pop_front();
            g.dropped = g.dropped.saturating_add(1);
        }
        g.items.push_back(frame);
    }

    /// Drain the queue, returning only the most recent frame.
    pub fn take_latest(&self) -> Option<Frame> {
        let mut g = self.lock();
        let latest = g.items.pop_back()?;
        let stale = g.items.len() as u64;
        g.items.clear();
        g.discarded = g.discarded.saturating_add(stale);
        if stale > 0 {
            log::debug!("Discarded {} stale frames before frame {}", stale, latest.sequence);
        }
        Some(latest)
    }

    /// The newest frame, waiting for one if the queue is empty.
    pub async fn next_latest(&self) -> Result<Frame, LinkError> {
        loop {
            if let Some(frame) = self.take_latest() {
                return Ok(frame);
            }
            if self.is_closed() {
                return Err(LinkError::TrackEnded);
            }
            self.notify.notified().await;
        }
    }

    /// Stop accepting frames and wake any reader.
    pub fn close(&self) {
        let mut g = self.lock();
        g.closed = true;
        drop(g);
        self.notify.notify_waiters();
        self.notify.notify_one();
    }

    pub fn is_closed(&self) -> bool {
        self.lock().closed
    }

    pub fn len(&self) -> usize {
        self.lock().items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn dropped(&self) -> u64 {
        self.lock().dropped
    }

    pub fn discarded(&self) -> u64 {
        self.lock().discarded
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::time::Duration;

    fn image(shade: u8) -> RgbImage {
        RgbImage::from_pixel(4, 4, image::Rgb([shade, shade, shade]))
    }

    #[test]
    fn test_take_latest_drains() {
        let queue = FrameQueue::new(8);
        queue.push_image(image(1));
        queue.push_image(image(2));
        queue.push_image(image(3));

        let frame = queue.take_latest().unwrap();
        assert_eq!(frame.sequence, 2);
        assert_eq!(frame.image.get_pixel(0, 0).0, [3, 3, 3]);
        assert!(queue.is_empty());
        assert_eq!(queue.discarded(), 2);
        assert!(queue.take_latest().is_none());
    }

    #[test]
    fn test_drop_oldest_when_full() {
        let queue = FrameQueue::new(2);
        for shade in 0..5 {
            queue.push_image(image(shade));
        }
        assert_eq!(queue.len(), 2);
        assert_eq!(queue.dropped(), 3);
    }

    #[test]
    fn test_push_at_max_sequence() {
        let queue = FrameQueue::new(2);
        queue.push(Frame::new(image(1), u64::MAX));
        assert_eq!(queue.take_latest().unwrap().sequence, u64::MAX);
        assert_eq!(queue.push_image(image(2)), Some(u64::MAX));
    }

    #[test]
    fn test_closed_queue_ignores_push() {
        let queue = FrameQueue::new(2);
        queue.close();
        assert_eq!(queue.push_image(image(0)), None);
        assert!(queue.is_empty());
    }

    #[tokio::test]
    async fn test_next_latest_waits_for_push() {
        let queue = Arc::new(FrameQueue::new(4));
        let producer = Arc::clone(&queue);
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(20)).await;
            producer.push_image(image(9));
        });

        let frame = queue.next_latest().await.unwrap();
        assert_eq!(frame.image.get_pixel(1, 1).0, [9, 9, 9]);
    }

    #[tokio::test]
    async fn test_next_latest_fails_when_closed() {
        let queue = Arc::new(FrameQueue::new(4));
        let closer = Arc::clone(&queue);
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(10)).await;
            closer.close();
        });

        assert!(matches!(queue.next_latest().await, Err(LinkError::TrackEnded)));
    }
}
