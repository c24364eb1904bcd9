use anyhow::{anyhow, Result};

use crate::device::{NativeFrame, PixelFormat};
use crate::frame::{Image, CHANNELS};

/// Where the significant bits of a wide sample land when it is narrowed to
/// 8 bits.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum BitAlignment {
    /// Keep the most significant bits.
    MsbAligned,
    /// Keep the least significant bits.
    LsbAligned,
}

/// Converts native device buffers into interleaved BGR8 images.
#[derive(Clone, Debug)]
pub struct PixelConverter {
    alignment: BitAlignment,
}

impl Default for PixelConverter {
    fn default() -> Self {
        Self::new(BitAlignment::MsbAligned)
    }
}

impl PixelConverter {
    pub fn new(alignment: BitAlignment) -> Self {
        Self { alignment }
    }

    pub fn alignment(&self) -> BitAlignment {
        self.alignment
    }

    pub fn convert(&self, frame: &NativeFrame) -> Result<Image> {
        let expected = frame
            .pixel_format
            .buffer_len(frame.width, frame.height)
            .ok_or_else(|| anyhow!("{:?} frame dimensions overflow", frame.pixel_format))?;
        if frame.data.len() != expected {
            return Err(anyhow!(
                "{:?} frame length mismatch: expected {}, got {}",
                frame.pixel_format,
                expected,
                frame.data.len()
            ));
        }

        let pixels = &frame.data;
        let bgr = match frame.pixel_format {
            PixelFormat::Bgr8 => pixels.clone(),
            PixelFormat::Rgb8 => pixels
                .chunks_exact(CHANNELS)
                .flat_map(|px| [px[2], px[1], px[0]])
                .collect(),
            PixelFormat::Mono8 => pixels.iter().flat_map(|&v| [v, v, v]).collect(),
            PixelFormat::Mono12 => pixels
                .chunks_exact(2)
                .map(|pair| self.narrow_12bit(u16::from_le_bytes([pair[0], pair[1]])))
                .flat_map(|v| [v, v, v])
                .collect(),
            PixelFormat::BayerRg8 => bayer_rg_to_bgr(pixels, frame.width, frame.height),
            PixelFormat::Yuv422Packed => yuyv_to_bgr(pixels, frame.width)?,
        };
        Image::from_bgr(frame.width, frame.height, bgr)
    }

    fn narrow_12bit(&self, sample: u16) -> u8 {
        match self.alignment {
            BitAlignment::MsbAligned => ((sample & 0x0fff) >> 4) as u8,
            BitAlignment::LsbAligned => (sample & 0x00ff) as u8,
        }
    }
}

/// Nearest-neighbour demosaic over 2x2 RGGB cells. Edge cells on odd
/// dimensions reuse the last row/column.
fn bayer_rg_to_bgr(pixels: &[u8], width: u32, height: u32) -> Vec<u8> {
    let w = width as usize;
    let h = height as usize;
    let at = |x: usize, y: usize| pixels[y.min(h - 1) * w + x.min(w - 1)];

    let mut bgr = vec![0u8; w * h * CHANNELS];
    for y in 0..h {
        let y0 = y & !1;
        for x in 0..w {
            let x0 = x & !1;
            let r = at(x0, y0);
            let g = ((at(x0 + 1, y0) as u16 + at(x0, y0 + 1) as u16) / 2) as u8;
            let b = at(x0 + 1, y0 + 1);

            let offset = (y * w + x) * CHANNELS;
            bgr[offset] = b;
            bgr[offset + 1] = g;
            bgr[offset + 2] = r;
        }
    }
    bgr
}

/// YUYV 4:2:2 to BGR using BT.601 coefficients.
fn yuyv_to_bgr(pixels: &[u8], width: u32) -> Result<Vec<u8>> {
    if width % 2 != 0 {
        return Err(anyhow!("YUV422 frame width must be even, got {}", width));
    }

    let mut bgr = Vec::with_capacity(pixels.len() / 2 * CHANNELS);
    for chunk in pixels.chunks_exact(4) {
        let u = chunk[1] as f32 - 128.0;
        let v = chunk[3] as f32 - 128.0;
        for y in [chunk[0] as f32, chunk[2] as f32] {
            let r = y + 1.402_f32 * v;
            let g = y - 0.344_136_f32 * u - 0.714_136_f32 * v;
            let b = y + 1.772_f32 * u;
            bgr.extend_from_slice(&[clamp_to_u8(b), clamp_to_u8(g), clamp_to_u8(r)]);
        }
    }
    Ok(bgr)
}

fn clamp_to_u8(value: f32) -> u8 {
    value.round().clamp(0.0, 255.0) as u8
}
