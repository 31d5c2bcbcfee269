//! Capture session state machine types.

use serde::{Deserialize, Serialize};

/// The current state of a capture session.
///
/// Sessions only move forward: `Launching → WindowSearching → Capturing →
/// Terminated`. The one backward edge is `Capturing → WindowSearching`, taken
/// when the captured window disappears while its process keeps running.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum SessionState {
    /// The executable is being spawned.
    #[default]
    Launching,

    /// The process is running; waiting for its top-level window.
    WindowSearching {
        /// Process id of the launched executable.
        pid: u32,
    },

    /// The window was found and frames are being captured each tick.
    Capturing {
        /// Process id of the launched executable.
        pid: u32,

        /// Printable window identifier.
        window: String,
    },

    /// The session is over. No further ticks do any work.
    Terminated {
        /// Why the session ended.
        reason: TerminationReason,
    },
}

impl SessionState {
    /// Returns true while the executable is being spawned.
    pub fn is_launching(&self) -> bool {
        matches!(self, Self::Launching)
    }

    /// Returns true while waiting for the target window.
    pub fn is_searching(&self) -> bool {
        matches!(self, Self::WindowSearching { .. })
    }

    /// Returns true while frames are being captured.
    pub fn is_capturing(&self) -> bool {
        matches!(self, Self::Capturing { .. })
    }

    /// Returns true once the session has ended.
    pub fn is_terminated(&self) -> bool {
        matches!(self, Self::Terminated { .. })
    }

    /// Returns the termination reason, if the session has ended.
    pub fn termination_reason(&self) -> Option<&TerminationReason> {
        match self {
            Self::Terminated { reason } => Some(reason),
            _ => None,
        }
    }

    /// Returns a simple string representation of the state.
    pub fn name(&self) -> &'static str {
        match self {
            Self::Launching => "Launching",
            Self::WindowSearching { .. } => "WindowSearching",
            Self::Capturing { .. } => "Capturing",
            Self::Terminated { .. } => "Terminated",
        }
    }
}

/// Why a session reached `Terminated`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum TerminationReason {
    /// The host closed the session.
    Closed,

    /// The executable could not be spawned.
    LaunchFailed {
        /// Underlying OS error message.
        message: String,
    },

    /// No matching window appeared before the search timeout.
    WindowNotFound {
        /// Search timeout in milliseconds.
        timeout_ms: u64,
    },

    /// The process exited on its own.
    ProcessExited {
        /// Exit code, when the OS reports one.
        exit_code: Option<i32>,
    },

    /// Too many consecutive capture failures.
    CaptureFailed {
        /// Number of consecutive failures that triggered termination.
        failures: u32,

        /// Message of the last failure.
        message: String,
    },

    /// The window registry itself could not be queried.
    LocatorFailed {
        /// Underlying error message.
        message: String,
    },
}

impl TerminationReason {
    /// Whether the session ended because of a fault rather than a request.
    pub fn is_failure(&self) -> bool {
        !matches!(self, Self::Closed)
    }

    /// Get status message for the host surface.
    pub fn message(&self) -> String {
        match self {
            Self::Closed => "Closed".to_string(),
            Self::LaunchFailed { message } => format!("Launch failed: {}", message),
            Self::WindowNotFound { timeout_ms } => {
                format!("No window appeared within {} ms", timeout_ms)
            }
            Self::ProcessExited {
                exit_code: Some(code),
            } => format!("Process exited with code {}", code),
            Self::ProcessExited { exit_code: None } => "Process exited".to_string(),
            Self::CaptureFailed { failures, message } => {
                format!("Capture failed {} times in a row: {}", failures, message)
            }
            Self::LocatorFailed { message } => format!("Window search failed: {}", message),
        }
    }
}
