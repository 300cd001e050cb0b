use anyhow::{anyhow, Result};
use image::codecs::jpeg::JpegEncoder;

mod session;

pub use session::{CaptureSession, RetryPolicy};

/// One captured screen frame, RGBA8, row-major.
#[derive(Debug, Clone)]
pub struct Frame {
    pub width: u32,
    pub height: u32,
    pub data: Vec<u8>,
}

impl Frame {
    pub fn new(width: u32, height: u32, data: Vec<u8>) -> Self {
        Self {
            width,
            height,
            data,
        }
    }

    /// Lossy-encode the frame for the vision request. The quality factor is
    /// attempt-dependent: small UI text smears badly below ~85.
    pub fn to_jpeg(&self, quality: u8) -> Result<Vec<u8>> {
        let rgba = image::RgbaImage::from_raw(self.width, self.height, self.data.clone())
            .ok_or_else(|| {
                anyhow!(
                    "frame buffer does not match {}x{} RGBA dimensions",
                    self.width,
                    self.height
                )
            })?;
        let rgb = image::DynamicImage::ImageRgba8(rgba).to_rgb8();

        let mut jpeg = Vec::new();
        let encoder = JpegEncoder::new_with_quality(&mut jpeg, quality);
        encoder.encode(
            rgb.as_raw(),
            self.width,
            self.height,
            image::ExtendedColorType::Rgb8,
        )?;
        Ok(jpeg)
    }
}

/// Exclusive, one-shot source of screen frames. The platform hands one over
/// after the user authorizes a capture; it is released as soon as a frame is
/// obtained, never kept alive across later pipeline stages.
pub trait FrameSource: Send {
    /// Poll for a frame. `Ok(None)` means the source is not ready yet and the
    /// caller should retry after a delay.
    fn try_acquire(&mut self) -> Result<Option<Frame>>;

    /// Release the underlying capture resource. Must be safe to call more
    /// than once.
    fn release(&mut self);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn frame_encodes_to_jpeg() {
        let frame = Frame::new(2, 2, vec![200u8; 2 * 2 * 4]);
        let jpeg = frame.to_jpeg(85).unwrap();
        // JPEG SOI marker
        assert_eq!(&jpeg[..2], &[0xFF, 0xD8]);
    }

    #[test]
    fn mismatched_buffer_is_rejected() {
        let frame = Frame::new(4, 4, vec![0u8; 3]);
        assert!(frame.to_jpeg(85).is_err());
    }
}
