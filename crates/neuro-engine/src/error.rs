//! Error types for the engine.

use neuro_capture::CaptureError;
use neuro_ipc::ConfigError;
use thiserror::Error;

/// Errors that prevent a session from being created.
#[derive(Debug, Error)]
pub enum EngineError {
    /// The session configuration is unusable.
    #[error("Invalid session config: {0}")]
    Config(#[from] ConfigError),

    /// No capture backend could be set up on this host.
    #[error("Capture backend unavailable: {0}")]
    Backend(#[from] CaptureError),
}
