//! Captured frames.
//!
//! - `Frame`: one RGB image produced by a frame source, plus its capture index and time.
//! - JPEG encoding for the upload path.
//!
//! Frames are never mutated after capture. The renderer works on a copy, so the
//! uploaded image is always the clean capture, not the annotated preview.

use anyhow::{anyhow, Context, Result};
use chrono::{DateTime, Local};
use image::{DynamicImage, ImageFormat, RgbImage};
use std::io::Cursor;

/// One captured RGB frame.
#[derive(Clone, Debug)]
pub struct Frame {
    image: RgbImage,

    /// Monotonic capture counter assigned by the source (1-based).
    pub index: u64,

    /// Wall-clock capture time.
    pub captured_at: DateTime<Local>,
}

impl Frame {
    pub fn new(image: RgbImage, index: u64) -> Self {
        Self {
            image,
            index,
            captured_at: Local::now(),
        }
    }

    /// Build a frame from packed RGB24 bytes.
    pub fn from_rgb(pixels: Vec<u8>, width: u32, height: u32, index: u64) -> Result<Self> {
        let expected = rgb_len(width, height)?;
        if pixels.len() != expected {
            return Err(anyhow!(
                "RGB frame length mismatch: expected {}, got {}",
                expected,
                pixels.len()
            ));
        }
        let image = RgbImage::from_raw(width, height, pixels)
            .ok_or_else(|| anyhow!("RGB buffer does not fit {}x{}", width, height))?;
        Ok(Self::new(image, index))
    }

    pub fn width(&self) -> u32 {
        self.image.width()
    }

    pub fn height(&self) -> u32 {
        self.image.height()
    }

    pub fn image(&self) -> &RgbImage {
        &self.image
    }

    /// Copy of the pixels for drawing overlays.
    pub fn to_canvas(&self) -> RgbImage {
        self.image.clone()
    }

    /// Encode the frame as a JPEG byte buffer.
    pub fn encode_jpeg(&self) -> Result<Vec<u8>> {
        encode_jpeg(&self.image)
    }
}

pub(crate) fn encode_jpeg(image: &RgbImage) -> Result<Vec<u8>> {
    if image.width() == 0 || image.height() == 0 {
        return Err(anyhow!("cannot encode an empty frame"));
    }
    let mut bytes = Vec::new();
    DynamicImage::ImageRgb8(image.clone())
        .write_to(&mut Cursor::new(&mut bytes), ImageFormat::Jpeg)
        .context("encode frame as jpeg")?;
    Ok(bytes)
}

pub(crate) fn rgb_len(width: u32, height: u32) -> Result<usize> {
    width
        .checked_mul(height)
        .and_then(|v| v.checked_mul(3))
        .map(|v| v as usize)
        .ok_or_else(|| anyhow!("frame dimensions overflow"))
}
