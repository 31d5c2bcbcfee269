//! Conversion of platform image buffers into the common frame layout.

use crate::error::CaptureError;
use crate::{CaptureResult, FRAME_BYTES_PER_PIXEL};

/// Channel order of a raw platform buffer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PixelLayout {
    /// 32-bit BGRA with meaningful alpha.
    Bgra,

    /// 32-bit BGR with an unused fourth byte (GDI DIBs).
    Bgrx,

    /// 32-bit RGBA.
    Rgba,

    /// 24-bit RGB.
    Rgb,
}

impl PixelLayout {
    pub fn bytes_per_pixel(self) -> usize {
        match self {
            Self::Bgra | Self::Bgrx | Self::Rgba => 4,
            Self::Rgb => 3,
        }
    }
}

/// Row order of a raw platform buffer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RowOrder {
    TopDown,
    BottomUp,
}

/// An image as the platform handed it over.
#[derive(Debug, Clone)]
pub struct RawImage {
    pub data: Vec<u8>,
    pub width: u32,
    pub height: u32,
    /// Bytes from the start of one row to the next; may include padding.
    pub stride: usize,
    pub layout: PixelLayout,
    pub row_order: RowOrder,
}

impl RawImage {
    /// A tightly packed top-down image.
    pub fn packed(data: Vec<u8>, width: u32, height: u32, layout: PixelLayout) -> Self {
        Self {
            data,
            width,
            height,
            stride: width as usize * layout.bytes_per_pixel(),
            layout,
            row_order: RowOrder::TopDown,
        }
    }
}

/// Convert a raw image into tightly packed, top-down, opaque-alpha BGRA.
pub fn to_bgra(raw: &RawImage) -> CaptureResult<Vec<u8>> {
    let width = raw.width as usize;
    let height = raw.height as usize;
    if width == 0 || height == 0 {
        return Err(CaptureError::FrameConversion(format!(
            "empty image {}x{}",
            raw.width, raw.height
        )));
    }

    let bpp = raw.layout.bytes_per_pixel();
    let row_bytes = width * bpp;
    if raw.stride < row_bytes {
        return Err(CaptureError::FrameConversion(format!(
            "stride {} shorter than row of {} bytes",
            raw.stride, row_bytes
        )));
    }

    let required = raw.stride * (height - 1) + row_bytes;
    if raw.data.len() < required {
        return Err(CaptureError::FrameConversion(format!(
            "buffer holds {} bytes, {}x{} needs {}",
            raw.data.len(),
            raw.width,
            raw.height,
            required
        )));
    }

    let mut out = Vec::with_capacity(width * height * FRAME_BYTES_PER_PIXEL);
    for y in 0..height {
        let src_y = match raw.row_order {
            RowOrder::TopDown => y,
            RowOrder::BottomUp => height - 1 - y,
        };
        let start = src_y * raw.stride;
        let row = &raw.data[start..start + row_bytes];

        match raw.layout {
            PixelLayout::Bgra => out.extend_from_slice(row),
            PixelLayout::Bgrx => {
                for px in row.chunks_exact(4) {
                    out.extend_from_slice(&[px[0], px[1], px[2], 0xFF]);
                }
            }
            PixelLayout::Rgba => {
                for px in row.chunks_exact(4) {
                    out.extend_from_slice(&[px[2], px[1], px[0], px[3]]);
                }
            }
            PixelLayout::Rgb => {
                for px in row.chunks_exact(3) {
                    out.extend_from_slice(&[px[2], px[1], px[0], 0xFF]);
                }
            }
        }
    }

    Ok(out)
}
