//! Window handles and the window registry port.

use std::fmt;
use std::ops::ControlFlow;

use crate::CaptureResult;

/// Opaque reference to an on-screen top-level window.
///
/// Handles are discovered through a [`WindowRegistry`], never created. A
/// handle outlives the window it names; capture through a stale handle fails
/// with [`CaptureError::WindowGone`](crate::CaptureError::WindowGone).
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum WindowHandle {
    /// Win32 `HWND` value.
    Native(isize),

    /// X11 window id as printed by `xdotool`.
    X11(String),
}

impl fmt::Display for WindowHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Native(hwnd) => write!(f, "hwnd:{:#x}", hwnd),
            Self::X11(id) => write!(f, "x11:{}", id),
        }
    }
}

/// Window metadata reported by a registry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WindowInfo {
    /// Window handle.
    pub handle: WindowHandle,

    /// Window title.
    pub title: String,

    /// Owning process id.
    pub process_id: u32,

    /// Whether the window is currently visible.
    pub visible: bool,
}

impl WindowInfo {
    /// Whether this looks like the main window of process `pid`.
    ///
    /// Untitled windows are skipped; they are usually splash screens or
    /// helper windows rather than the application's UI.
    pub fn is_main_window_of(&self, pid: u32) -> bool {
        self.process_id == pid && self.visible && !self.title.trim().is_empty()
    }
}

/// Read-only query port over the OS window manager.
pub trait WindowRegistry: Send + Sync {
    /// Visit top-level windows until `visit` breaks or the list is exhausted.
    ///
    /// `owner` is a hint: implementations whose OS can filter by owning
    /// process may only report that process's windows. Visit order is
    /// whatever the OS enumeration order is.
    fn visit_windows(
        &self,
        owner: u32,
        visit: &mut dyn FnMut(&WindowInfo) -> ControlFlow<()>,
    ) -> CaptureResult<()>;
}
