//! Win32 window registry and GDI capture backend.

mod registry;
mod surface;

pub use registry::Win32Registry;
pub use surface::GdiBackend;

use windows::Win32::Foundation::HWND;

use crate::error::CaptureError;
use crate::window::WindowHandle;
use crate::CaptureResult;

/// Convert a handle from the Win32 registry back into an `HWND`.
fn hwnd_of(window: &WindowHandle) -> CaptureResult<HWND> {
    match window {
        WindowHandle::Native(handle) => Ok(HWND(*handle as *mut _)),
        other => Err(CaptureError::UnsupportedHandle(other.to_string())),
    }
}

/// A `WindowsApi` error carrying the calling thread's last error.
fn last_error(call: &str) -> CaptureError {
    let err = windows::core::Error::from_win32();
    CaptureError::WindowsApi {
        message: format!("{} failed: {}", call, err.message()),
        source: Some(err),
    }
}
