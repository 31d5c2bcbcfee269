//! GDI window copy.
//!
//! Renders the window into a compatible bitmap with `PrintWindow`, which
//! works for windows hidden behind others, and falls back to `BitBlt` from
//! the window DC for applications that do not handle `WM_PRINT`.

use std::mem::size_of;

use tracing::{debug, warn};
use windows::Win32::Foundation::{HWND, RECT};
use windows::Win32::Graphics::Gdi::{
    BitBlt, CreateCompatibleBitmap, CreateCompatibleDC, DeleteDC, DeleteObject, GetDIBits,
    GetWindowDC, ReleaseDC, SelectObject, BITMAPINFO, BITMAPINFOHEADER, BI_RGB, DIB_RGB_COLORS,
    HBITMAP, HDC, HGDIOBJ, SRCCOPY,
};
use windows::Win32::Storage::Xps::{PrintWindow, PRINT_WINDOW_FLAGS};
use windows::Win32::UI::WindowsAndMessaging::{GetWindowRect, IsWindow};

use super::{hwnd_of, last_error};
use crate::decode::{PixelLayout, RawImage, RowOrder};
use crate::error::CaptureError;
use crate::frame::Bounds;
use crate::surface::SurfaceBackend;
use crate::window::WindowHandle;
use crate::{BackendCapabilities, CaptureResult};

/// `PW_RENDERFULLCONTENT`: include DirectComposition content.
const PW_RENDERFULLCONTENT: PRINT_WINDOW_FLAGS = PRINT_WINDOW_FLAGS(2);

/// GDI handles held for one capture.
pub struct GdiSurface {
    hwnd: HWND,
    window_dc: HDC,
    memory_dc: HDC,
    bitmap: HBITMAP,
    previous: HGDIOBJ,
    selected: bool,
}

/// In-memory copy of a window's drawing surface.
#[derive(Debug, Default)]
pub struct GdiBackend;

impl GdiBackend {
    /// Create the backend. GDI needs no per-process setup.
    pub fn new() -> Self {
        Self
    }
}

impl SurfaceBackend for GdiBackend {
    type Surface = GdiSurface;

    fn name(&self) -> &'static str {
        "gdi"
    }

    fn capabilities(&self) -> BackendCapabilities {
        BackendCapabilities {
            captures_obscured: true,
            filesystem_round_trip: false,
        }
    }

    fn window_bounds(&mut self, window: &WindowHandle) -> CaptureResult<Bounds> {
        let hwnd = hwnd_of(window)?;

        if !unsafe { IsWindow(hwnd) }.as_bool() {
            return Err(CaptureError::WindowGone(window.to_string()));
        }

        let mut rect = RECT::default();
        unsafe { GetWindowRect(hwnd, &mut rect) }
            .map_err(|_| CaptureError::WindowGone(window.to_string()))?;

        Ok(Bounds::new(
            rect.left,
            rect.top,
            rect.right - rect.left,
            rect.bottom - rect.top,
        ))
    }

    fn acquire(&mut self, window: &WindowHandle, bounds: Bounds) -> CaptureResult<GdiSurface> {
        let hwnd = hwnd_of(window)?;

        unsafe {
            let window_dc = GetWindowDC(hwnd);
            if window_dc.is_invalid() {
                return Err(last_error("GetWindowDC"));
            }

            let memory_dc = CreateCompatibleDC(window_dc);
            if memory_dc.is_invalid() {
                let err = last_error("CreateCompatibleDC");
                ReleaseDC(hwnd, window_dc);
                return Err(err);
            }

            let bitmap = CreateCompatibleBitmap(window_dc, bounds.width, bounds.height);
            if bitmap.is_invalid() {
                let err = last_error("CreateCompatibleBitmap");
                let _ = DeleteDC(memory_dc);
                ReleaseDC(hwnd, window_dc);
                return Err(err);
            }

            let previous = SelectObject(memory_dc, bitmap);

            Ok(GdiSurface {
                hwnd,
                window_dc,
                memory_dc,
                bitmap,
                previous,
                selected: true,
            })
        }
    }

    fn read(
        &mut self,
        _window: &WindowHandle,
        surface: &mut GdiSurface,
        bounds: Bounds,
    ) -> CaptureResult<RawImage> {
        let (width, height) = bounds
            .drawable_size()
            .ok_or(CaptureError::InvalidGeometry {
                width: bounds.width,
                height: bounds.height,
            })?;

        unsafe {
            let printed =
                PrintWindow(surface.hwnd, surface.memory_dc, PW_RENDERFULLCONTENT).as_bool();

            if !printed {
                debug!("PrintWindow failed, falling back to BitBlt");
                BitBlt(
                    surface.memory_dc,
                    0,
                    0,
                    bounds.width,
                    bounds.height,
                    surface.window_dc,
                    0,
                    0,
                    SRCCOPY,
                )?;
            }

            // GetDIBits requires the bitmap to be deselected.
            SelectObject(surface.memory_dc, surface.previous);
            surface.selected = false;

            let mut info = BITMAPINFO {
                bmiHeader: BITMAPINFOHEADER {
                    biSize: size_of::<BITMAPINFOHEADER>() as u32,
                    biWidth: bounds.width,
                    // Negative height asks for top-down rows.
                    biHeight: -bounds.height,
                    biPlanes: 1,
                    biBitCount: 32,
                    biCompression: BI_RGB.0,
                    ..Default::default()
                },
                ..Default::default()
            };

            let stride = width as usize * 4;
            let mut data = vec![0u8; stride * height as usize];
            let lines = GetDIBits(
                surface.memory_dc,
                surface.bitmap,
                0,
                height,
                Some(data.as_mut_ptr().cast()),
                &mut info,
                DIB_RGB_COLORS,
            );
            if lines == 0 {
                return Err(last_error("GetDIBits"));
            }

            Ok(RawImage {
                data,
                width,
                height,
                stride,
                layout: PixelLayout::Bgrx,
                row_order: RowOrder::TopDown,
            })
        }
    }

    fn release(&mut self, surface: GdiSurface) {
        unsafe {
            if surface.selected {
                SelectObject(surface.memory_dc, surface.previous);
            }
            if !DeleteObject(surface.bitmap).as_bool() {
                warn!("DeleteObject failed for capture bitmap");
            }
            if !DeleteDC(surface.memory_dc).as_bool() {
                warn!("DeleteDC failed for capture DC");
            }
            if ReleaseDC(surface.hwnd, surface.window_dc) == 0 {
                warn!("ReleaseDC failed for window DC");
            }
        }
    }
}
