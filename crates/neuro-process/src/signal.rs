//! Platform-specific graceful exit requests.
//!
//! `request_exit` returns `Ok(true)` when a request was delivered and
//! `Ok(false)` when the platform has no polite way to reach the process.

use crate::error::ProcessError;

#[cfg(unix)]
pub(crate) fn request_exit(pid: u32) -> Result<bool, ProcessError> {
    use nix::errno::Errno;
    use nix::sys::signal::{kill, Signal};
    use nix::unistd::Pid;

    let raw = i32::try_from(pid).map_err(|_| ProcessError::Signal {
        pid,
        message: "pid out of range".to_string(),
    })?;

    match kill(Pid::from_raw(raw), Signal::SIGTERM) {
        Ok(()) => Ok(true),
        // Already gone; the caller's exit check will observe it.
        Err(Errno::ESRCH) => Ok(true),
        Err(errno) => Err(ProcessError::Signal {
            pid,
            message: errno.desc().to_string(),
        }),
    }
}

#[cfg(windows)]
pub(crate) fn request_exit(pid: u32) -> Result<bool, ProcessError> {
    use windows::Win32::Foundation::{BOOL, HWND, LPARAM, WPARAM};
    use windows::Win32::UI::WindowsAndMessaging::{
        EnumWindows, GetWindowThreadProcessId, PostMessageW, WM_CLOSE,
    };

    struct CloseContext {
        pid: u32,
        posted: u32,
    }

    unsafe extern "system" fn close_callback(hwnd: HWND, lparam: LPARAM) -> BOOL {
        let context = &mut *(lparam.0 as *mut CloseContext);

        let mut owner: u32 = 0;
        GetWindowThreadProcessId(hwnd, Some(&mut owner as *mut u32));

        if owner == context.pid && PostMessageW(hwnd, WM_CLOSE, WPARAM(0), LPARAM(0)).is_ok() {
            context.posted += 1;
        }

        BOOL::from(true)
    }

    let mut context = CloseContext { pid, posted: 0 };
    unsafe {
        EnumWindows(
            Some(close_callback),
            LPARAM(&mut context as *mut CloseContext as isize),
        )
        .map_err(|err| ProcessError::Signal {
            pid,
            message: err.message().to_string(),
        })?;
    }

    tracing::debug!(pid, posted = context.posted, "Posted WM_CLOSE");
    Ok(context.posted > 0)
}

#[cfg(not(any(unix, windows)))]
pub(crate) fn request_exit(_pid: u32) -> Result<bool, ProcessError> {
    Ok(false)
}
