//! Captured frame types.

use bytes::Bytes;
use std::time::Instant;

use crate::FRAME_BYTES_PER_PIXEL;

/// Timestamp for a captured frame.
#[derive(Debug, Clone, Copy)]
pub struct CaptureTimestamp {
    /// Monotonic timestamp when the frame was captured.
    pub capture_time: Instant,

    /// Milliseconds since the capturer produced its first frame.
    pub elapsed_ms: u64,
}

impl CaptureTimestamp {
    /// Create a new capture timestamp.
    pub fn now(start_time: Instant) -> Self {
        let capture_time = Instant::now();
        let elapsed_ms = capture_time.duration_since(start_time).as_millis() as u64;

        Self {
            capture_time,
            elapsed_ms,
        }
    }
}

/// Window rectangle in screen coordinates.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Bounds {
    pub x: i32,
    pub y: i32,
    pub width: i32,
    pub height: i32,
}

impl Bounds {
    /// Create bounds from position and size.
    pub fn new(x: i32, y: i32, width: i32, height: i32) -> Self {
        Self {
            x,
            y,
            width,
            height,
        }
    }

    /// Size in pixels, or `None` when either side is zero or negative.
    pub fn drawable_size(&self) -> Option<(u32, u32)> {
        if self.width <= 0 || self.height <= 0 {
            return None;
        }
        Some((self.width as u32, self.height as u32))
    }
}

/// A captured window frame.
///
/// Pixels are BGRA8, rows top-down, alpha forced to 0xFF. Rows are tightly
/// packed, so `row_stride == width * 4`.
#[derive(Debug, Clone)]
pub struct Frame {
    /// BGRA pixel data.
    pub pixels: Bytes,

    /// Frame width in pixels.
    pub width: u32,

    /// Frame height in pixels.
    pub height: u32,

    /// Bytes per row.
    pub row_stride: usize,

    /// Capture timestamp.
    pub timestamp: CaptureTimestamp,

    /// Monotonically increasing sequence number.
    pub sequence: u64,
}

impl Frame {
    /// Create a new frame from tightly packed BGRA rows.
    pub fn new(
        pixels: Bytes,
        width: u32,
        height: u32,
        timestamp: CaptureTimestamp,
        sequence: u64,
    ) -> Self {
        Self {
            pixels,
            width,
            height,
            row_stride: width as usize * FRAME_BYTES_PER_PIXEL,
            timestamp,
            sequence,
        }
    }

    /// Calculate expected BGRA buffer size for given dimensions.
    pub fn bgra_buffer_size(width: u32, height: u32) -> usize {
        width as usize * height as usize * FRAME_BYTES_PER_PIXEL
    }

    /// Validate that the frame data matches expected dimensions.
    pub fn is_valid(&self) -> bool {
        self.width > 0
            && self.height > 0
            && self.row_stride == self.width as usize * FRAME_BYTES_PER_PIXEL
            && self.pixels.len() == Self::bgra_buffer_size(self.width, self.height)
    }

    /// BGRA bytes of row `y`, top row first.
    pub fn row(&self, y: u32) -> Option<&[u8]> {
        if y >= self.height {
            return None;
        }
        let start = y as usize * self.row_stride;
        self.pixels.get(start..start + self.row_stride)
    }

    /// Convert to RGBA8, the layout most image and texture APIs take.
    pub fn to_rgba(&self) -> Vec<u8> {
        let mut rgba = Vec::with_capacity(self.pixels.len());
        for px in self.pixels.chunks_exact(FRAME_BYTES_PER_PIXEL) {
            rgba.extend_from_slice(&[px[2], px[1], px[0], px[3]]);
        }
        rgba
    }
}
