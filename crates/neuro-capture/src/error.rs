//! Error types for the capture module.

use std::io;
use std::time::Duration;

use thiserror::Error;

/// Errors that can occur during a single capture or registry query.
#[derive(Debug, Error)]
pub enum CaptureError {
    /// Windows API error.
    #[error("Windows API error: {message}")]
    WindowsApi {
        message: String,
        #[cfg(windows)]
        #[source]
        source: Option<windows::core::Error>,
    },

    /// The window is minimized, off-screen or has collapsed to nothing.
    #[error("Invalid window geometry: {width}x{height}")]
    InvalidGeometry { width: i32, height: i32 },

    /// The window handle no longer refers to a window.
    #[error("Window no longer exists: {0}")]
    WindowGone(String),

    /// The handle was produced by a different platform's registry.
    #[error("Window handle {0} is not usable by this backend")]
    UnsupportedHandle(String),

    /// A required command-line tool is not installed.
    #[error("{tool} is not installed or not on PATH")]
    ToolMissing { tool: &'static str },

    /// A command-line tool ran but reported failure.
    #[error("{tool} failed ({status}): {stderr}")]
    ToolFailed {
        tool: &'static str,
        status: String,
        stderr: String,
    },

    /// I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    /// The captured image could not be decoded.
    #[error("Image decode error: {0}")]
    Image(#[from] image::ImageError),

    /// Frame conversion error.
    #[error("Frame conversion error: {0}")]
    FrameConversion(String),

    /// Window capture not supported on this system.
    #[error("Window capture not supported on this platform")]
    NotSupported,
}

impl CaptureError {
    /// Whether the window handle has become invalid.
    pub fn is_window_gone(&self) -> bool {
        matches!(self, Self::WindowGone(_))
    }

    /// Whether the failure came from degenerate window geometry.
    pub fn is_invalid_geometry(&self) -> bool {
        matches!(self, Self::InvalidGeometry { .. })
    }
}

#[cfg(windows)]
impl From<windows::core::Error> for CaptureError {
    fn from(err: windows::core::Error) -> Self {
        Self::WindowsApi {
            message: err.message().to_string(),
            source: Some(err),
        }
    }
}

/// Errors that end a window search.
#[derive(Debug, Error)]
pub enum LocateError {
    /// No matching window appeared before the timeout.
    #[error("No window for process {pid} appeared within {timeout:?}")]
    NotFound { pid: u32, timeout: Duration },

    /// The process exited before showing a window.
    #[error("Process {pid} exited before showing a window (exit code {exit_code:?})")]
    ProcessExited { pid: u32, exit_code: Option<i32> },

    /// Window enumeration itself failed.
    #[error("Window enumeration failed: {0}")]
    Registry(#[from] CaptureError),
}
