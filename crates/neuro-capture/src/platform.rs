//! Backend selection for the host platform.

use std::sync::Arc;

use tracing::info;

use crate::window::WindowRegistry;
use crate::{CaptureResult, FrameCapturer};

#[cfg(windows)]
pub fn native_registry() -> CaptureResult<Arc<dyn WindowRegistry>> {
    Ok(Arc::new(crate::gdi::Win32Registry))
}

#[cfg(windows)]
pub fn native_capturer() -> CaptureResult<Box<dyn FrameCapturer>> {
    info!("Using GDI capture backend");
    Ok(Box::new(crate::surface::SurfaceCapturer::new(
        crate::gdi::GdiBackend::new(),
    )))
}

#[cfg(all(unix, not(target_os = "macos")))]
pub fn native_registry() -> CaptureResult<Arc<dyn WindowRegistry>> {
    Ok(Arc::new(crate::x11::XdotoolRegistry::new()?))
}

#[cfg(all(unix, not(target_os = "macos")))]
pub fn native_capturer() -> CaptureResult<Box<dyn FrameCapturer>> {
    info!("Using import screenshot backend");
    Ok(Box::new(crate::surface::SurfaceCapturer::new(
        crate::x11::ImportBackend::new()?,
    )))
}

#[cfg(not(any(windows, all(unix, not(target_os = "macos")))))]
pub fn native_registry() -> CaptureResult<Arc<dyn WindowRegistry>> {
    Err(crate::error::CaptureError::NotSupported)
}

#[cfg(not(any(windows, all(unix, not(target_os = "macos")))))]
pub fn native_capturer() -> CaptureResult<Box<dyn FrameCapturer>> {
    info!("No capture backend for this platform");
    Err(crate::error::CaptureError::NotSupported)
}
