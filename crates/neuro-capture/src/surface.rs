//! Scoped surface acquisition shared by every capture backend.
//!
//! A backend supplies four primitives: query bounds, acquire a surface,
//! read pixels from it, release it. [`SurfaceCapturer`] sequences them so
//! that geometry is checked before anything is acquired and every acquired
//! surface is released exactly once, whatever happens in between.

use std::time::Instant;

use bytes::Bytes;
use tracing::{instrument, trace};

use crate::decode::{to_bgra, RawImage};
use crate::error::CaptureError;
use crate::frame::{Bounds, CaptureTimestamp, Frame};
use crate::window::WindowHandle;
use crate::{BackendCapabilities, CaptureResult, FrameCapturer};

/// Platform primitives behind a [`SurfaceCapturer`].
pub trait SurfaceBackend: Send {
    /// OS resources held for the duration of one capture.
    type Surface;

    /// Short backend name for logs.
    fn name(&self) -> &'static str;

    /// Capability gaps of this backend.
    fn capabilities(&self) -> BackendCapabilities;

    /// Current window rectangle.
    fn window_bounds(&mut self, window: &WindowHandle) -> CaptureResult<Bounds>;

    /// Acquire resources for a `bounds`-sized copy.
    fn acquire(&mut self, window: &WindowHandle, bounds: Bounds) -> CaptureResult<Self::Surface>;

    /// Copy the window into `surface` and read the result back.
    fn read(
        &mut self,
        window: &WindowHandle,
        surface: &mut Self::Surface,
        bounds: Bounds,
    ) -> CaptureResult<RawImage>;

    /// Free everything `acquire` produced.
    fn release(&mut self, surface: Self::Surface);
}

/// Releases its surface when dropped.
struct SurfaceGuard<'a, B: SurfaceBackend> {
    backend: &'a mut B,
    surface: Option<B::Surface>,
}

impl<B: SurfaceBackend> SurfaceGuard<'_, B> {
    fn read(&mut self, window: &WindowHandle, bounds: Bounds) -> CaptureResult<RawImage> {
        match self.surface.as_mut() {
            Some(surface) => self.backend.read(window, surface, bounds),
            None => Err(CaptureError::FrameConversion(
                "surface already released".to_string(),
            )),
        }
    }
}

impl<B: SurfaceBackend> Drop for SurfaceGuard<'_, B> {
    fn drop(&mut self) {
        if let Some(surface) = self.surface.take() {
            self.backend.release(surface);
        }
    }
}

/// [`FrameCapturer`] built from a [`SurfaceBackend`].
pub struct SurfaceCapturer<B> {
    backend: B,
    start_time: Instant,
    sequence: u64,
}

impl<B: SurfaceBackend> SurfaceCapturer<B> {
    /// Wrap a backend.
    pub fn new(backend: B) -> Self {
        Self {
            backend,
            start_time: Instant::now(),
            sequence: 0,
        }
    }

    /// The wrapped backend.
    pub fn backend(&self) -> &B {
        &self.backend
    }
}

impl<B: SurfaceBackend> FrameCapturer for SurfaceCapturer<B> {
    #[instrument(name = "capture_frame", level = "trace", skip(self), fields(backend = self.backend.name()))]
    fn capture(&mut self, window: &WindowHandle) -> CaptureResult<Frame> {
        // Windows resize independently of us; never reuse an old size.
        let bounds = self.backend.window_bounds(window)?;
        if bounds.drawable_size().is_none() {
            return Err(CaptureError::InvalidGeometry {
                width: bounds.width,
                height: bounds.height,
            });
        }

        let surface = self.backend.acquire(window, bounds)?;
        let mut guard = SurfaceGuard {
            backend: &mut self.backend,
            surface: Some(surface),
        };
        let raw = guard.read(window, bounds);
        drop(guard);
        let raw = raw?;

        let pixels = to_bgra(&raw)?;
        let sequence = self.sequence;
        self.sequence += 1;

        trace!(sequence, width = raw.width, height = raw.height, "Captured frame");

        Ok(Frame::new(
            Bytes::from(pixels),
            raw.width,
            raw.height,
            CaptureTimestamp::now(self.start_time),
            sequence,
        ))
    }

    fn backend_name(&self) -> &'static str {
        self.backend.name()
    }

    fn capabilities(&self) -> BackendCapabilities {
        self.backend.capabilities()
    }
}
