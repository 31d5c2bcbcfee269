//! Process launcher and the owned process handle.

use std::io;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use tracing::{debug, info, instrument, warn};

use crate::child::{ChildProcess, ExitInfo, OsSpawner, Spawner};
use crate::clock::Clock;
use crate::error::ProcessError;
use crate::{ProcessResult, EXIT_POLL_INTERVAL_MS};

/// Read-only view of a running process.
///
/// This is everything components other than the launcher may ask about a
/// process. It never issues process-control calls.
pub trait ProcessProbe: Send + Sync {
    /// OS process id.
    fn pid(&self) -> u32;

    /// Exit information if the process has ended, `None` while it runs.
    fn poll_exit(&self) -> Option<ExitInfo>;

    /// Whether the process is still running.
    fn is_alive(&self) -> bool {
        self.poll_exit().is_none()
    }
}

/// Result of a graceful termination request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TerminateOutcome {
    /// The process exited within the grace period.
    Exited(ExitInfo),

    /// The process had already exited; nothing was signalled.
    AlreadyExited(ExitInfo),

    /// The process is still running after the grace period. Escalate with
    /// [`ProcessHandle::kill`].
    StillRunning,

    /// Termination was already requested earlier; nothing was signalled.
    AlreadyTerminated,
}

/// Launches executables.
#[derive(Clone)]
pub struct ProcessLauncher {
    spawner: Arc<dyn Spawner>,
}

impl ProcessLauncher {
    /// Create a launcher that spawns real OS processes.
    pub fn new() -> Self {
        Self::with_spawner(Arc::new(OsSpawner))
    }

    /// Create a launcher backed by the given spawner.
    pub fn with_spawner(spawner: Arc<dyn Spawner>) -> Self {
        Self { spawner }
    }

    /// Spawn `executable` and take ownership of the resulting process.
    ///
    /// The path is passed to the OS as-is. Whether it is safe to run is the
    /// caller's concern.
    #[instrument(name = "process_launch", skip(self), fields(executable = %executable.display()))]
    pub fn launch(&self, executable: &Path) -> ProcessResult<ProcessHandle> {
        let child = self
            .spawner
            .spawn(executable)
            .map_err(|source| ProcessError::Launch {
                path: executable.to_path_buf(),
                source,
            })?;

        let handle = ProcessHandle::new(executable.to_path_buf(), child);
        info!(pid = handle.pid(), "Launched process");
        Ok(handle)
    }
}

impl Default for ProcessLauncher {
    fn default() -> Self {
        Self::new()
    }
}

/// Exclusive owner of a launched process.
pub struct ProcessHandle {
    pid: u32,
    executable: PathBuf,
    child: Mutex<Box<dyn ChildProcess>>,
    exit: Mutex<Option<ExitInfo>>,
    terminate_requested: AtomicBool,
}

impl ProcessHandle {
    fn new(executable: PathBuf, child: Box<dyn ChildProcess>) -> Self {
        Self {
            pid: child.id(),
            executable,
            child: Mutex::new(child),
            exit: Mutex::new(None),
            terminate_requested: AtomicBool::new(false),
        }
    }

    /// Path the process was launched from.
    pub fn executable(&self) -> &Path {
        &self.executable
    }

    /// Non-blocking exit check that reports query failures.
    pub fn try_poll_exit(&self) -> ProcessResult<Option<ExitInfo>> {
        let mut exit = self.exit.lock();
        if exit.is_some() {
            return Ok(*exit);
        }

        let status = self
            .child
            .lock()
            .try_wait()
            .map_err(|source| ProcessError::Wait {
                pid: self.pid,
                source,
            })?;

        if let Some(info) = status {
            debug!(pid = self.pid, code = ?info.code, "Process exited");
            *exit = Some(info);
        }
        Ok(status)
    }

    /// Whether termination has been requested through this handle.
    pub fn termination_requested(&self) -> bool {
        self.terminate_requested.load(Ordering::SeqCst)
    }

    /// Ask the process to exit and wait up to `grace` for it to do so.
    ///
    /// Only the first call signals the process. Never waits longer than
    /// `grace`; a process that ignores the request is reported as
    /// [`TerminateOutcome::StillRunning`].
    #[instrument(name = "process_terminate", skip(self, clock), fields(pid = self.pid))]
    pub fn terminate(&self, grace: Duration, clock: &dyn Clock) -> ProcessResult<TerminateOutcome> {
        if self.terminate_requested.swap(true, Ordering::SeqCst) {
            debug!("Termination already requested, ignoring");
            return Ok(TerminateOutcome::AlreadyTerminated);
        }

        if let Some(info) = self.try_poll_exit()? {
            return Ok(TerminateOutcome::AlreadyExited(info));
        }

        info!("Requesting process exit");
        self.child.lock().request_exit()?;

        let poll = Duration::from_millis(EXIT_POLL_INTERVAL_MS);
        let deadline = clock.now() + grace;
        loop {
            if let Some(info) = self.try_poll_exit()? {
                return Ok(TerminateOutcome::Exited(info));
            }

            let now = clock.now();
            if now >= deadline {
                warn!(grace_ms = grace.as_millis() as u64, "Process still running after grace period");
                return Ok(TerminateOutcome::StillRunning);
            }

            clock.sleep(poll.min(deadline - now));
        }
    }

    /// Force the process to exit. A process that already exited is not an error.
    #[instrument(name = "process_kill", skip(self), fields(pid = self.pid))]
    pub fn kill(&self) -> ProcessResult<()> {
        if self.try_poll_exit()?.is_some() {
            return Ok(());
        }

        self.terminate_requested.store(true, Ordering::SeqCst);
        match self.child.lock().kill() {
            Ok(()) => {}
            // Reaped between the exit check and the kill.
            Err(err) if err.kind() == io::ErrorKind::InvalidInput => {}
            Err(source) => {
                return Err(ProcessError::Kill {
                    pid: self.pid,
                    source,
                })
            }
        }

        info!("Killed process");
        // Reap so the exit is observable and no zombie is left behind.
        let _ = self.try_poll_exit();
        Ok(())
    }
}

impl ProcessProbe for ProcessHandle {
    fn pid(&self) -> u32 {
        self.pid
    }

    fn poll_exit(&self) -> Option<ExitInfo> {
        match self.try_poll_exit() {
            Ok(exit) => exit,
            Err(e) => {
                warn!("Exit check failed: {}", e);
                None
            }
        }
    }
}

impl std::fmt::Debug for ProcessHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ProcessHandle")
            .field("pid", &self.pid)
            .field("executable", &self.executable)
            .field("exit", &*self.exit.lock())
            .finish()
    }
}
