use chrono::{DateTime, Utc};
use image::{imageops, RgbImage};

/// A decoded video frame in RGB channel order.
#[derive(Debug, Clone, PartialEq)]
pub struct Frame {
    pub image: RgbImage,
    /// Position in the track, starting at 0
    pub sequence: u64,
    pub received_at: DateTime<Utc>,
}

impl Frame {
    pub fn new(image: RgbImage, sequence: u64) -> Self {
        Self {
            image,
            sequence,
            received_at: Utc::now(),
        }
    }

    /// Build from packed RGB24 bytes; `None` if the length does not match.
    pub fn from_rgb(width: u32, height: u32, data: Vec<u8>, sequence: u64) -> Option<Self> {
        RgbImage::from_raw(width, height, data).map(|image| Self::new(image, sequence))
    }

    pub fn width(&self) -> u32 {
        self.image.width()
    }

    pub fn height(&self) -> u32 {
        self.image.height()
    }

    /// Copy scaled to an observation size.
    pub fn resized(&self, width: u32, height: u32) -> RgbImage {
        if self.image.dimensions() == (width, height) {
            return self.image.clone();
        }
        imageops::resize(&self.image, width, height, imageops::FilterType::Triangle)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_from_rgb_checks_length() {
        assert!(Frame::from_rgb(2, 2, vec![0; 12], 0).is_some());
        assert!(Frame::from_rgb(2, 2, vec![0; 11], 0).is_none());
    }

    #[test]
    fn test_resized_dimensions() {
        let frame = Frame::new(RgbImage::new(640, 480), 3);
        let small = frame.resized(320, 240);
        assert_eq!(small.dimensions(), (320, 240));
        assert_eq!(frame.width(), 640);
        assert_eq!(frame.sequence, 3);
    }
}
