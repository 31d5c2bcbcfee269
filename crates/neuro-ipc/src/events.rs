//! Events sent from the engine to the host.

use serde::{Deserialize, Serialize};

use crate::state::SessionState;
use crate::types::CaptureStats;

/// Events that the engine can send to the host.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum SessionEvent {
    /// Session state has changed.
    StateChanged {
        /// Previous state.
        previous: Box<SessionState>,

        /// Current state.
        current: Box<SessionState>,
    },

    /// Periodic capture statistics.
    Stats(CaptureStats),

    /// Error occurred.
    Error {
        /// Whether the session keeps running after this error.
        recoverable: bool,

        /// Error message.
        message: String,
    },

    /// Engine is ready to accept commands.
    Ready,

    /// Engine has shut down.
    Shutdown,
}
