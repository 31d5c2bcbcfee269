//! Foreign-window location and frame capture for the Neuro-OS shell.
//!
//! A launched application's top-level window is found through a
//! [`WindowRegistry`] and copied into a [`Frame`] on every tick by a
//! [`FrameCapturer`]. Two backends implement the capture contract:
//!
//! - GDI (Windows): in-memory copy of the window's drawing surface.
//! - `import` (Linux/X11): ImageMagick screenshot through a temporary PNG.
//!
//! Callers depend only on the traits; [`platform`] picks the backend for the
//! host at startup.

mod decode;
mod error;
mod frame;
mod locator;
mod surface;
mod window;

#[cfg(windows)]
mod gdi;
mod x11;

pub mod platform;

pub use decode::{to_bgra, PixelLayout, RawImage, RowOrder};
pub use error::{CaptureError, LocateError};
pub use frame::{Bounds, CaptureTimestamp, Frame};
pub use locator::{SearchStatus, WindowLocator, WindowSearch};
pub use surface::{SurfaceBackend, SurfaceCapturer};
pub use window::{WindowHandle, WindowInfo, WindowRegistry};

#[cfg(windows)]
pub use gdi::{GdiBackend, Win32Registry};
pub use x11::{ImportBackend, XdotoolRegistry};

/// Result type for capture operations.
pub type CaptureResult<T> = Result<T, CaptureError>;

/// Bytes per pixel of every [`Frame`] (BGRA8).
pub const FRAME_BYTES_PER_PIXEL: usize = 4;

/// What a capture backend can and cannot do.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BackendCapabilities {
    /// Whether windows covered by other windows still capture correctly.
    pub captures_obscured: bool,

    /// Whether each frame goes through a file on disk.
    pub filesystem_round_trip: bool,
}

/// Produces one frame of a window per call.
pub trait FrameCapturer: Send {
    /// Capture the window's current contents at its current size.
    ///
    /// Failures are per call; the next call starts from scratch.
    fn capture(&mut self, window: &WindowHandle) -> CaptureResult<Frame>;

    /// Short backend name for logs.
    fn backend_name(&self) -> &'static str;

    /// Capability gaps of this backend.
    fn capabilities(&self) -> BackendCapabilities;
}
