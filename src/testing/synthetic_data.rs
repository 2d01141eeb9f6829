//! Synthetic video for offline tests.

use crate::media::Frame;
use image::{Rgb, RgbImage};

/// Gradient image whose content shifts with `frame_number`, so consecutive
/// frames are distinguishable.
pub fn synthetic_image(frame_number: u64, width: u32, height: u32) -> RgbImage {
    let base = (frame_number % 256) as u8;
    RgbImage::from_fn(width, height, |x, y| {
        Rgb([
            base.wrapping_add((x % 256) as u8),
            base.wrapping_add((y % 256) as u8),
            base.wrapping_add(((x + y) % 256) as u8),
        ])
    })
}

pub fn synthetic_frame(frame_number: u64, width: u32, height: u32) -> Frame {
    Frame::new(synthetic_image(frame_number, width, height), frame_number)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_synthetic_frame_correct_size() {
        let frame = synthetic_frame(0, 320, 240);
        assert_eq!(frame.width(), 320);
        assert_eq!(frame.height(), 240);
        assert_eq!(frame.image.as_raw().len(), 320 * 240 * 3);
    }

    #[test]
    fn test_synthetic_frames_differ() {
        let frame0 = synthetic_frame(0, 16, 16);
        let frame1 = synthetic_frame(1, 16, 16);
        assert_ne!(frame0.image.get_pixel(0, 0), frame1.image.get_pixel(0, 0));
        assert_eq!(frame1.sequence, 1);
    }
}
