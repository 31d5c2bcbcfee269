//! Locating a launched process's main window.

use std::ops::ControlFlow;
use std::sync::Arc;
use std::time::{Duration, Instant};

use neuro_process::{Clock, ProcessProbe};
use tracing::{debug, info, instrument, trace};

use crate::error::LocateError;
use crate::window::{WindowHandle, WindowInfo, WindowRegistry};
use crate::CaptureResult;

/// Default interval between search attempts.
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_millis(500);

/// Finds the main window of a process through a [`WindowRegistry`].
#[derive(Clone)]
pub struct WindowLocator {
    registry: Arc<dyn WindowRegistry>,
    poll_interval: Duration,
}

impl WindowLocator {
    /// Create a locator polling `registry` every `poll_interval`.
    pub fn new(registry: Arc<dyn WindowRegistry>, poll_interval: Duration) -> Self {
        Self {
            registry,
            poll_interval,
        }
    }

    /// Interval between search attempts.
    pub fn poll_interval(&self) -> Duration {
        self.poll_interval
    }

    /// One pass over the registry. The first visible, titled window owned by
    /// `pid` wins; enumeration stops there.
    pub fn locate_once(&self, pid: u32) -> CaptureResult<Option<WindowInfo>> {
        let mut found = None;
        self.registry.visit_windows(pid, &mut |window: &WindowInfo| {
            if window.is_main_window_of(pid) {
                found = Some(window.clone());
                ControlFlow::Break(())
            } else {
                ControlFlow::Continue(())
            }
        })?;
        Ok(found)
    }

    /// Start a non-blocking search for `process`'s window.
    pub fn begin(&self, process: &dyn ProcessProbe, timeout: Duration, now: Instant) -> WindowSearch {
        WindowSearch {
            pid: process.pid(),
            started: now,
            timeout,
            attempts: 0,
        }
    }

    /// Poll until `process` shows a window, exits, or `timeout` elapses.
    #[instrument(name = "find_window", skip(self, process, clock), fields(pid = process.pid()))]
    pub fn find_window(
        &self,
        process: &dyn ProcessProbe,
        timeout: Duration,
        clock: &dyn Clock,
    ) -> Result<WindowHandle, LocateError> {
        let mut search = self.begin(process, timeout, clock.now());
        loop {
            match search.poll(self, process, clock.now())? {
                SearchStatus::Found(window) => return Ok(window.handle),
                SearchStatus::Pending => clock.sleep(self.poll_interval),
            }
        }
    }
}

/// Outcome of one search attempt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SearchStatus {
    /// The window was found.
    Found(WindowInfo),

    /// Not found yet; try again on the next tick.
    Pending,
}

/// An in-progress window search, advanced one attempt per tick.
#[derive(Debug, Clone)]
pub struct WindowSearch {
    pid: u32,
    started: Instant,
    timeout: Duration,
    attempts: u64,
}

impl WindowSearch {
    /// Process being searched for.
    pub fn pid(&self) -> u32 {
        self.pid
    }

    /// Attempts made so far.
    pub fn attempts(&self) -> u64 {
        self.attempts
    }

    /// Make one attempt.
    ///
    /// A dead process ends the search with [`LocateError::ProcessExited`], so
    /// callers can tell a crash apart from a window that never showed up.
    pub fn poll(
        &mut self,
        locator: &WindowLocator,
        process: &dyn ProcessProbe,
        now: Instant,
    ) -> Result<SearchStatus, LocateError> {
        self.attempts += 1;

        if let Some(exit) = process.poll_exit() {
            debug!(pid = self.pid, code = ?exit.code, "Process exited during window search");
            return Err(LocateError::ProcessExited {
                pid: self.pid,
                exit_code: exit.code,
            });
        }

        if let Some(window) = locator.locate_once(self.pid)? {
            info!(
                pid = self.pid,
                window = %window.handle,
                title = %window.title,
                attempts = self.attempts,
                "Found window"
            );
            return Ok(SearchStatus::Found(window));
        }

        let elapsed = now.saturating_duration_since(self.started);
        if elapsed >= self.timeout {
            return Err(LocateError::NotFound {
                pid: self.pid,
                timeout: self.timeout,
            });
        }

        trace!(pid = self.pid, attempts = self.attempts, "Window not found yet");
        Ok(SearchStatus::Pending)
    }
}
