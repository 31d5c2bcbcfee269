//! X11 window registry and screenshot backend built on command-line tools.
//!
//! Both pieces shell out: `xdotool` for window lookup and geometry,
//! ImageMagick's `import` for pixels. No X11 client library is linked.

mod import;
mod xdotool;

pub use import::ImportBackend;
pub use xdotool::XdotoolRegistry;

use std::ffi::OsStr;
use std::io;
use std::path::{Path, PathBuf};
use std::process::{Command, Output, Stdio};

use crate::error::CaptureError;
use crate::CaptureResult;

/// Resolve `tool` on PATH, reporting a missing install distinctly.
fn resolve_tool(tool: &'static str) -> CaptureResult<PathBuf> {
    which::which(tool).map_err(|_| CaptureError::ToolMissing { tool })
}

/// Run a resolved tool to completion and collect its output.
fn run_tool<I, S>(program: &Path, tool: &'static str, args: I) -> CaptureResult<Output>
where
    I: IntoIterator<Item = S>,
    S: AsRef<OsStr>,
{
    Command::new(program)
        .args(args)
        .stdin(Stdio::null())
        .output()
        .map_err(|err| match err.kind() {
            io::ErrorKind::NotFound => CaptureError::ToolMissing { tool },
            _ => CaptureError::Io(err),
        })
}

/// Whether a tool's stderr says the X window no longer exists.
fn reports_bad_window(stderr: &str) -> bool {
    stderr.contains("BadWindow") || stderr.contains("unable to read X window")
}

/// Turn a failed tool run into the matching capture error.
fn tool_failure(tool: &'static str, window: &str, output: &Output) -> CaptureError {
    let stderr = String::from_utf8_lossy(&output.stderr).trim().to_string();
    if reports_bad_window(&stderr) {
        return CaptureError::WindowGone(window.to_string());
    }
    CaptureError::ToolFailed {
        tool,
        status: output.status.to_string(),
        stderr,
    }
}

/// Write an executable `sh` script standing in for a tool.
#[cfg(all(test, unix))]
pub(crate) fn write_script(dir: &Path, name: &str, body: &str) -> PathBuf {
    use std::os::unix::fs::PermissionsExt;

    let path = dir.join(name);
    std::fs::write(&path, format!("#!/bin/sh\n{body}\n")).unwrap();
    std::fs::set_permissions(&path, std::fs::Permissions::from_mode(0o755)).unwrap();
    path
}
