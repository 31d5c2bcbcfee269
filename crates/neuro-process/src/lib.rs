//! Process launching and lifetime control for captured applications.
//!
//! [`ProcessLauncher`] spawns the target executable and hands back a
//! [`ProcessHandle`], the only owner of process-control calls. Other
//! components see the process through the read-only [`ProcessProbe`] port.

mod child;
mod clock;
mod error;
mod launcher;
mod signal;

pub use child::{ChildProcess, ExitInfo, OsSpawner, Spawner};
pub use clock::{Clock, ManualClock, SystemClock};
pub use error::ProcessError;
pub use launcher::{ProcessHandle, ProcessLauncher, ProcessProbe, TerminateOutcome};

/// Result type for process operations.
pub type ProcessResult<T> = Result<T, ProcessError>;

/// Interval between exit checks while waiting for a process to terminate.
pub const EXIT_POLL_INTERVAL_MS: u64 = 50;
