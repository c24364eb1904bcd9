//! Converted images and capture outcomes.
//!
//! - `Image`: interleaved 3-channel BGR bytes, rows top to bottom.
//! - `Capture`: what a single bounded-wait acquisition produced.
//!
//! A zero-sized `Image` is the soft-miss sentinel: no frame arrived in time,
//! or the device reported a failed grab. Callers treat it as "try again".

use anyhow::{anyhow, Result};

/// Channels per pixel in every converted image.
pub const CHANNELS: usize = 3;

/// Interleaved BGR image, 8 bits per channel.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Image {
    width: u32,
    height: u32,
    data: Vec<u8>,
}

impl Image {
    /// The zero-sized soft-miss image.
    pub fn empty() -> Self {
        Self::default()
    }

    /// Wrap BGR bytes. `data` must hold exactly `width * height * 3` bytes.
    pub fn from_bgr(width: u32, height: u32, data: Vec<u8>) -> Result<Self> {
        let expected = (width as usize)
            .checked_mul(height as usize)
            .and_then(|v| v.checked_mul(CHANNELS))
            .ok_or_else(|| anyhow!("BGR image dimensions overflow"))?;
        if data.len() != expected {
            return Err(anyhow!(
                "BGR image length mismatch: expected {}, got {}",
                expected,
                data.len()
            ));
        }
        Ok(Self {
            width,
            height,
            data,
        })
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    /// `[rows, cols, channels]`; all zero for the empty image.
    pub fn shape(&self) -> [usize; 3] {
        if self.is_empty() {
            return [0, 0, 0];
        }
        [self.height as usize, self.width as usize, CHANNELS]
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.data
    }

    pub fn into_bytes(self) -> Vec<u8> {
        self.data
    }

    /// BGR triple at column `x`, row `y`.
    pub fn pixel(&self, x: u32, y: u32) -> Option<[u8; 3]> {
        if x >= self.width || y >= self.height {
            return None;
        }
        let offset = ((y as usize) * (self.width as usize) + x as usize) * CHANNELS;
        let px = self.data.get(offset..offset + CHANNELS)?;
        Some([px[0], px[1], px[2]])
    }

    /// Copy into an RGB `image::RgbImage`. Returns `None` for the empty image.
    #[cfg(feature = "export-image")]
    pub fn to_rgb_image(&self) -> Option<image::RgbImage> {
        if self.is_empty() {
            return None;
        }
        let rgb = self
            .data
            .chunks_exact(CHANNELS)
            .flat_map(|px| [px[2], px[1], px[0]])
            .collect();
        image::RgbImage::from_raw(self.width, self.height, rgb)
    }
}

/// Outcome of one acquisition.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Capture {
    Frame(Image),
    /// No frame arrived within the timeout.
    Timeout,
    /// The device reported a failed grab, or the buffer could not be converted.
    Failed { reason: String },
}

impl Capture {
    pub fn is_frame(&self) -> bool {
        matches!(self, Capture::Frame(_))
    }

    /// Collapse to the soft-miss contract: misses become the empty image.
    pub fn into_image(self) -> Image {
        match self {
            Capture::Frame(image) => image,
            Capture::Timeout | Capture::Failed { .. } => Image::empty(),
        }
    }
}
