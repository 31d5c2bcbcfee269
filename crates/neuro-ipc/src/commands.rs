//! Commands sent from the host to the engine.

use serde::{Deserialize, Serialize};

use crate::types::SessionConfig;

/// Commands that the host can send to the engine.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum SessionCommand {
    /// Launch the configured executable and start capturing its window.
    Start { config: SessionConfig },

    /// Close the current session: stop ticking and terminate the process.
    Close,

    /// Request the current session state.
    GetState,

    /// Close any session and stop the engine loop.
    Shutdown,
}
