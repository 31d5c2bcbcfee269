//! Window lookup through `xdotool`.
//!
//! `xdotool search --pid` relies on the `_NET_WM_PID` property, which most
//! toolkits set. Windows of applications that do not set it are invisible
//! to this registry.

use std::ops::ControlFlow;
use std::path::PathBuf;
use std::process::Output;

use tracing::{debug, instrument, trace};

use super::{resolve_tool, run_tool, tool_failure};
use crate::frame::Bounds;
use crate::window::{WindowHandle, WindowInfo, WindowRegistry};
use crate::CaptureResult;

pub(super) const XDOTOOL: &str = "xdotool";

/// Window registry that asks `xdotool` for a process's visible windows.
#[derive(Debug, Clone)]
pub struct XdotoolRegistry {
    xdotool: PathBuf,
}

impl XdotoolRegistry {
    /// Locate `xdotool` on PATH.
    pub fn new() -> CaptureResult<Self> {
        Ok(Self {
            xdotool: resolve_tool(XDOTOOL)?,
        })
    }

    fn window_name(&self, id: &str) -> Option<String> {
        let output = run_tool(&self.xdotool, XDOTOOL, ["getwindowname", id]).ok()?;
        if !output.status.success() {
            return None;
        }
        Some(String::from_utf8_lossy(&output.stdout).trim().to_string())
    }
}

impl WindowRegistry for XdotoolRegistry {
    #[instrument(name = "xdotool_search", level = "trace", skip(self, visit))]
    fn visit_windows(
        &self,
        owner: u32,
        visit: &mut dyn FnMut(&WindowInfo) -> ControlFlow<()>,
    ) -> CaptureResult<()> {
        let pid = owner.to_string();
        let output = run_tool(
            &self.xdotool,
            XDOTOOL,
            ["search", "--onlyvisible", "--pid", pid.as_str()],
        )?;

        // xdotool exits 1 with empty output when nothing matches; anything
        // else on stderr (no display, bad auth) is a real failure.
        if !output.status.success() && !is_empty_match(&output) {
            return Err(tool_failure(XDOTOOL, &pid, &output));
        }

        let ids = parse_window_ids(&String::from_utf8_lossy(&output.stdout));
        if ids.is_empty() {
            trace!(owner, "No visible windows yet");
            return Ok(());
        }
        debug!(owner, count = ids.len(), "xdotool reported windows");

        for id in ids {
            // The window may vanish between search and name lookup.
            let Some(title) = self.window_name(&id) else {
                continue;
            };

            let info = WindowInfo {
                handle: WindowHandle::X11(id),
                title,
                process_id: owner,
                visible: true,
            };
            if visit(&info).is_break() {
                break;
            }
        }

        Ok(())
    }
}

/// Whether a failed `xdotool search` only means "no matching window".
fn is_empty_match(output: &Output) -> bool {
    output.status.code() == Some(1) && output.stderr.iter().all(u8::is_ascii_whitespace)
}

/// Window ids from `xdotool search` output, one decimal id per line.
pub(super) fn parse_window_ids(stdout: &str) -> Vec<String> {
    stdout
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty() && line.bytes().all(|b| b.is_ascii_digit()))
        .map(str::to_string)
        .collect()
}

/// Bounds from `xdotool getwindowgeometry --shell` output.
pub(super) fn parse_geometry(stdout: &str) -> Option<Bounds> {
    let mut x = None;
    let mut y = None;
    let mut width = None;
    let mut height = None;

    for line in stdout.lines() {
        let Some((key, value)) = line.trim().split_once('=') else {
            continue;
        };
        let value = value.trim().parse::<i32>().ok();
        match key {
            "X" => x = value,
            "Y" => y = value,
            "WIDTH" => width = value,
            "HEIGHT" => height = value,
            _ => {}
        }
    }

    Some(Bounds::new(x.unwrap_or(0), y.unwrap_or(0), width?, height?))
}
