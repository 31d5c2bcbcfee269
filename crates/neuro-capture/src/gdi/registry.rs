//! Top-level window enumeration through `EnumWindows`.

use std::ops::ControlFlow;

use tracing::{instrument, trace};
use windows::Win32::Foundation::{BOOL, HWND, LPARAM};
use windows::Win32::UI::WindowsAndMessaging::{
    EnumWindows, GetWindowTextLengthW, GetWindowTextW, GetWindowThreadProcessId, IsWindowVisible,
};

use crate::error::CaptureError;
use crate::window::{WindowHandle, WindowInfo, WindowRegistry};
use crate::CaptureResult;

/// Window registry backed by the Win32 window manager.
#[derive(Debug, Clone, Copy, Default)]
pub struct Win32Registry;

struct EnumContext<'a> {
    owner: u32,
    visit: &'a mut dyn FnMut(&WindowInfo) -> ControlFlow<()>,
    stopped: bool,
}

impl WindowRegistry for Win32Registry {
    #[instrument(name = "enumerate_windows", level = "trace", skip(self, visit))]
    fn visit_windows(
        &self,
        owner: u32,
        visit: &mut dyn FnMut(&WindowInfo) -> ControlFlow<()>,
    ) -> CaptureResult<()> {
        let mut context = EnumContext {
            owner,
            visit,
            stopped: false,
        };

        let result = unsafe {
            EnumWindows(
                Some(enum_window_callback),
                LPARAM(&mut context as *mut EnumContext<'_> as isize),
            )
        };

        // EnumWindows reports failure when the callback stops it early.
        match result {
            Err(_) if context.stopped => Ok(()),
            Err(err) => Err(CaptureError::from(err)),
            Ok(()) => Ok(()),
        }
    }
}

unsafe extern "system" fn enum_window_callback(hwnd: HWND, lparam: LPARAM) -> BOOL {
    let context = &mut *(lparam.0 as *mut EnumContext<'_>);

    let mut process_id: u32 = 0;
    GetWindowThreadProcessId(hwnd, Some(&mut process_id as *mut u32));

    // Only the owner's windows are interesting; skip the title lookup for the rest.
    if process_id != context.owner {
        return BOOL::from(true);
    }

    let info = WindowInfo {
        handle: WindowHandle::Native(hwnd.0 as isize),
        title: window_title(hwnd),
        process_id,
        visible: IsWindowVisible(hwnd).as_bool(),
    };
    trace!(window = %info.handle, title = %info.title, visible = info.visible, "Visiting window");

    match (context.visit)(&info) {
        ControlFlow::Continue(()) => BOOL::from(true),
        ControlFlow::Break(()) => {
            context.stopped = true;
            BOOL::from(false)
        }
    }
}

unsafe fn window_title(hwnd: HWND) -> String {
    let title_length = GetWindowTextLengthW(hwnd);
    if title_length <= 0 {
        return String::new();
    }

    let mut title_buffer: Vec<u16> = vec![0; (title_length + 1) as usize];
    let actual_length = GetWindowTextW(hwnd, &mut title_buffer);
    if actual_length <= 0 {
        return String::new();
    }

    String::from_utf16_lossy(&title_buffer[..actual_length as usize])
}
