//! Common types used across IPC messages.

use std::path::PathBuf;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Default interval between window search attempts.
pub const DEFAULT_SEARCH_INTERVAL_MS: u64 = 500;

/// Default time allowed for the target window to appear.
pub const DEFAULT_SEARCH_TIMEOUT_MS: u64 = 15_000;

/// Default interval between capture ticks (~30 fps).
pub const DEFAULT_CAPTURE_INTERVAL_MS: u64 = 33;

/// Default number of consecutive capture failures tolerated.
pub const DEFAULT_MAX_CONSECUTIVE_FAILURES: u32 = 10;

/// Default wait after a graceful termination request.
pub const DEFAULT_TERMINATE_GRACE_MS: u64 = 3_000;

/// Configuration for one capture session.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SessionConfig {
    /// Executable to launch.
    pub executable_path: PathBuf,

    /// Name shown by the host surface. Cosmetic only.
    pub display_name: String,

    /// Interval between window search attempts in milliseconds.
    pub search_interval_ms: u64,

    /// How long to wait for the window in milliseconds.
    pub search_timeout_ms: u64,

    /// Interval between capture ticks in milliseconds.
    pub capture_interval_ms: u64,

    /// Consecutive capture failures that end the session.
    pub max_consecutive_failures: u32,

    /// How long to wait for a graceful exit before killing, in milliseconds.
    pub terminate_grace_ms: u64,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            executable_path: PathBuf::new(),
            display_name: String::new(),
            search_interval_ms: DEFAULT_SEARCH_INTERVAL_MS,
            search_timeout_ms: DEFAULT_SEARCH_TIMEOUT_MS,
            capture_interval_ms: DEFAULT_CAPTURE_INTERVAL_MS,
            max_consecutive_failures: DEFAULT_MAX_CONSECUTIVE_FAILURES,
            terminate_grace_ms: DEFAULT_TERMINATE_GRACE_MS,
        }
    }
}

impl SessionConfig {
    /// Create a configuration for the given executable with default tuning.
    pub fn new(executable_path: impl Into<PathBuf>) -> Self {
        Self {
            executable_path: executable_path.into(),
            ..Default::default()
        }
    }

    /// Name for the host surface, falling back to the executable's file stem.
    pub fn label(&self) -> String {
        if !self.display_name.trim().is_empty() {
            return self.display_name.clone();
        }

        self.executable_path
            .file_stem()
            .map(|stem| stem.to_string_lossy().into_owned())
            .unwrap_or_else(|| "Application".to_string())
    }

    pub fn search_interval(&self) -> Duration {
        Duration::from_millis(self.search_interval_ms)
    }

    pub fn search_timeout(&self) -> Duration {
        Duration::from_millis(self.search_timeout_ms)
    }

    pub fn capture_interval(&self) -> Duration {
        Duration::from_millis(self.capture_interval_ms)
    }

    pub fn terminate_grace(&self) -> Duration {
        Duration::from_millis(self.terminate_grace_ms)
    }

    /// Check the configuration for values the engine cannot run with.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.executable_path.as_os_str().is_empty() {
            return Err(ConfigError::MissingExecutable);
        }
        if self.search_interval_ms == 0 {
            return Err(ConfigError::ZeroInterval("search_interval_ms"));
        }
        if self.capture_interval_ms == 0 {
            return Err(ConfigError::ZeroInterval("capture_interval_ms"));
        }
        if self.max_consecutive_failures == 0 {
            return Err(ConfigError::ZeroFailureBudget);
        }
        Ok(())
    }
}

/// Invalid session configuration.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ConfigError {
    /// No executable was given.
    #[error("executable_path must not be empty")]
    MissingExecutable,

    /// A tick interval was zero.
    #[error("{0} must be greater than zero")]
    ZeroInterval(&'static str),

    /// The failure budget was zero.
    #[error("max_consecutive_failures must be at least 1")]
    ZeroFailureBudget,
}

/// Capture statistics for a running session.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CaptureStats {
    /// Frames handed to the display sink.
    pub frames_delivered: u64,

    /// Total failed capture attempts.
    pub capture_failures: u64,

    /// Current run of consecutive failures.
    pub consecutive_failures: u32,

    /// Ticks dropped because the previous tick was still running.
    pub ticks_skipped: u64,

    /// Window search attempts made.
    pub search_attempts: u64,

    /// Frames per second over the last reporting window.
    pub fps: f32,

    /// Width of the last delivered frame.
    pub last_width: u32,

    /// Height of the last delivered frame.
    pub last_height: u32,

    /// Seconds since capture started.
    pub uptime_seconds: u64,
}
