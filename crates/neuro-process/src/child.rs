//! Spawn port and the OS-backed child process.

use std::io;
use std::path::Path;
use std::process::{Child, Command, ExitStatus, Stdio};

use tracing::debug;

use crate::error::ProcessError;
use crate::signal;

/// How a process ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ExitInfo {
    /// Exit code; `None` when the process was ended by a signal.
    pub code: Option<i32>,
}

impl From<ExitStatus> for ExitInfo {
    fn from(status: ExitStatus) -> Self {
        Self {
            code: status.code(),
        }
    }
}

/// A spawned process, as seen by [`ProcessHandle`](crate::ProcessHandle).
pub trait ChildProcess: Send {
    /// OS process id.
    fn id(&self) -> u32;

    /// Non-blocking exit check.
    fn try_wait(&mut self) -> io::Result<Option<ExitInfo>>;

    /// Ask the process to exit on its own.
    fn request_exit(&mut self) -> Result<(), ProcessError>;

    /// Force the process to exit.
    fn kill(&mut self) -> io::Result<()>;
}

/// Something that can turn an executable path into a running process.
pub trait Spawner: Send + Sync {
    fn spawn(&self, executable: &Path) -> io::Result<Box<dyn ChildProcess>>;
}

/// Spawns real OS processes through `std::process::Command`.
#[derive(Debug, Clone, Copy, Default)]
pub struct OsSpawner;

impl Spawner for OsSpawner {
    fn spawn(&self, executable: &Path) -> io::Result<Box<dyn ChildProcess>> {
        let child = Command::new(executable).stdin(Stdio::null()).spawn()?;
        debug!(pid = child.id(), "Spawned child process");
        Ok(Box::new(OsChild { child }))
    }
}

struct OsChild {
    child: Child,
}

impl ChildProcess for OsChild {
    fn id(&self) -> u32 {
        self.child.id()
    }

    fn try_wait(&mut self) -> io::Result<Option<ExitInfo>> {
        Ok(self.child.try_wait()?.map(ExitInfo::from))
    }

    fn request_exit(&mut self) -> Result<(), ProcessError> {
        let pid = self.child.id();
        if signal::request_exit(pid)? {
            return Ok(());
        }

        // Nothing accepted a polite request; force it.
        debug!(pid, "Graceful exit unavailable, killing process");
        self.child
            .kill()
            .map_err(|source| ProcessError::Kill { pid, source })
    }

    fn kill(&mut self) -> io::Result<()> {
        self.child.kill()
    }
}
