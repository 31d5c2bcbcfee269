//! The capture session state machine.
//!
//! A session launches one executable, waits for its main window, then
//! captures that window on every tick until it is closed or something
//! fatal happens. All work happens inside `start`, `on_tick` and `close`;
//! the session never spawns threads of its own.

use std::sync::Arc;

use crossbeam_channel::Sender;
use parking_lot::{Mutex, MutexGuard};
use tracing::{debug, error, info, instrument, trace, warn};

use neuro_capture::{
    platform, CaptureError, CaptureResult, FrameCapturer, LocateError, SearchStatus,
    WindowHandle, WindowLocator, WindowRegistry, WindowSearch,
};
use neuro_ipc::{CaptureStats, SessionConfig, SessionEvent, SessionState, TerminationReason};
use neuro_process::{
    Clock, OsSpawner, ProcessHandle, ProcessLauncher, ProcessProbe, Spawner, SystemClock,
    TerminateOutcome,
};

use crate::metrics::StatsCollector;
use crate::scheduler::Scheduler;
use crate::sink::FrameSink;

/// OS-facing ports a session runs against.
pub struct Backends {
    pub spawner: Arc<dyn Spawner>,
    pub registry: Arc<dyn WindowRegistry>,
    pub capturer: Box<dyn FrameCapturer>,
    pub clock: Arc<dyn Clock>,
}

impl Backends {
    /// Real process spawning plus the capture backend for this platform.
    pub fn native() -> CaptureResult<Self> {
        Ok(Self {
            spawner: Arc::new(OsSpawner),
            registry: platform::native_registry()?,
            capturer: platform::native_capturer()?,
            clock: Arc::new(SystemClock),
        })
    }
}

/// One launched application and the capture of its window.
pub struct CaptureSession {
    config: SessionConfig,
    launcher: ProcessLauncher,
    locator: WindowLocator,
    capturer: Box<dyn FrameCapturer>,
    clock: Arc<dyn Clock>,
    scheduler: Box<dyn Scheduler>,
    sink: Box<dyn FrameSink>,
    events: Option<Sender<SessionEvent>>,
    stats: Arc<StatsCollector>,
    state: SessionState,
    process: Option<ProcessHandle>,
    search: Option<WindowSearch>,
    window: Option<WindowHandle>,
    consecutive_failures: u32,
}

impl CaptureSession {
    /// Create a session in `Launching`. Nothing runs until [`start`](Self::start).
    pub fn new(
        config: SessionConfig,
        backends: Backends,
        scheduler: Box<dyn Scheduler>,
        sink: Box<dyn FrameSink>,
    ) -> Self {
        let locator = WindowLocator::new(backends.registry, config.search_interval());
        Self {
            launcher: ProcessLauncher::with_spawner(backends.spawner),
            locator,
            capturer: backends.capturer,
            clock: backends.clock,
            scheduler,
            sink,
            events: None,
            stats: Arc::new(StatsCollector::new()),
            state: SessionState::default(),
            process: None,
            search: None,
            window: None,
            consecutive_failures: 0,
            config,
        }
    }

    /// Report state changes and errors on `events`.
    pub fn with_events(mut self, events: Sender<SessionEvent>) -> Self {
        self.events = Some(events);
        self
    }

    pub fn state(&self) -> &SessionState {
        &self.state
    }

    pub fn config(&self) -> &SessionConfig {
        &self.config
    }

    /// Process id while the launched process is owned by this session.
    pub fn pid(&self) -> Option<u32> {
        self.process.as_ref().map(|process| process.pid())
    }

    /// The window being captured, if any.
    pub fn window(&self) -> Option<&WindowHandle> {
        self.window.as_ref()
    }

    pub fn consecutive_failures(&self) -> u32 {
        self.consecutive_failures
    }

    pub fn stats(&self) -> &Arc<StatsCollector> {
        &self.stats
    }

    /// Launch the executable and begin searching for its window.
    ///
    /// Only acts in `Launching`; later calls are ignored.
    #[instrument(name = "session_start", skip(self), fields(label = %self.config.label()))]
    pub fn start(&mut self) {
        if !self.state.is_launching() || self.process.is_some() {
            debug!(state = self.state.name(), "Session already started, ignoring start");
            return;
        }

        info!(
            executable = %self.config.executable_path.display(),
            backend = self.capturer.backend_name(),
            "Starting capture session"
        );

        match self.launcher.launch(&self.config.executable_path) {
            Ok(process) => {
                let pid = process.pid();
                self.search = Some(self.locator.begin(
                    &process,
                    self.config.search_timeout(),
                    self.clock.now(),
                ));
                self.process = Some(process);
                self.transition_to(SessionState::WindowSearching { pid });
                self.scheduler.start(self.config.search_interval());
            }
            Err(e) => {
                error!("Launch failed: {}", e);
                self.finish(TerminationReason::LaunchFailed {
                    message: e.to_string(),
                });
            }
        }
    }

    /// Do one tick of work for the current state.
    pub fn on_tick(&mut self) {
        match self.state {
            SessionState::WindowSearching { .. } => self.search_tick(),
            SessionState::Capturing { .. } => self.capture_tick(),
            _ => trace!(state = self.state.name(), "Tick ignored"),
        }
    }

    /// Stop ticking, terminate the process and drop the window.
    ///
    /// Safe to call any number of times; only the first call does anything.
    #[instrument(name = "session_close", skip(self))]
    pub fn close(&mut self) {
        if self.state.is_terminated() {
            debug!("Session already terminated, ignoring close");
            return;
        }

        info!("Closing session");
        self.finish(TerminationReason::Closed);
    }

    fn search_tick(&mut self) {
        let now = self.clock.now();
        let result = match (self.search.as_mut(), self.process.as_ref()) {
            (Some(search), Some(process)) => search.poll(&self.locator, process, now),
            _ => return,
        };
        self.stats.record_search_attempt();

        match result {
            Ok(SearchStatus::Pending) => {}
            Ok(SearchStatus::Found(window)) => self.begin_capture(window.handle),
            Err(LocateError::NotFound { timeout, .. }) => {
                warn!(timeout_ms = timeout.as_millis() as u64, "Window never appeared");
                self.finish(TerminationReason::WindowNotFound {
                    timeout_ms: timeout.as_millis() as u64,
                });
            }
            Err(LocateError::ProcessExited { exit_code, .. }) => {
                warn!(?exit_code, "Process exited before showing a window");
                self.finish(TerminationReason::ProcessExited { exit_code });
            }
            Err(LocateError::Registry(e)) => {
                error!("Window search failed: {}", e);
                self.finish(TerminationReason::LocatorFailed {
                    message: e.to_string(),
                });
            }
        }
    }

    fn begin_capture(&mut self, window: WindowHandle) {
        let Some(pid) = self.pid() else {
            return;
        };

        self.search = None;
        self.consecutive_failures = 0;
        self.stats.reset_failures();
        self.stats.start();

        let name = window.to_string();
        self.window = Some(window);
        self.transition_to(SessionState::Capturing { pid, window: name });
        self.scheduler.start(self.config.capture_interval());
    }

    fn capture_tick(&mut self) {
        let Some(process) = self.process.as_ref() else {
            return;
        };
        if let Some(exit) = process.poll_exit() {
            info!(code = ?exit.code, "Process exited while capturing");
            self.finish(TerminationReason::ProcessExited {
                exit_code: exit.code,
            });
            return;
        }

        let Some(window) = self.window.as_ref() else {
            return;
        };

        match self.capturer.capture(window) {
            Ok(frame) => {
                self.consecutive_failures = 0;
                self.stats.record_frame(frame.width, frame.height);
                self.sink.present(frame);
            }
            Err(e) if e.is_window_gone() => self.on_window_gone(e),
            Err(e) => self.on_capture_failure(e),
        }
    }

    fn on_window_gone(&mut self, err: CaptureError) {
        let Some(process) = self.process.as_ref() else {
            return;
        };

        if let Some(exit) = process.poll_exit() {
            info!(code = ?exit.code, "Window closed with its process");
            self.finish(TerminationReason::ProcessExited {
                exit_code: exit.code,
            });
            return;
        }

        // Splash screens and restarts replace the window under a live process.
        info!("{}, searching again", err);
        let pid = process.pid();
        self.search = Some(self.locator.begin(
            process,
            self.config.search_timeout(),
            self.clock.now(),
        ));
        self.window = None;
        self.consecutive_failures = 0;
        self.stats.reset_failures();
        self.transition_to(SessionState::WindowSearching { pid });
        self.scheduler.start(self.config.search_interval());
    }

    fn on_capture_failure(&mut self, err: CaptureError) {
        self.consecutive_failures += 1;
        self.stats.record_failure(self.consecutive_failures);

        let max = self.config.max_consecutive_failures;
        warn!(
            failures = self.consecutive_failures,
            max,
            "Capture failed: {}",
            err
        );

        if self.consecutive_failures >= max {
            error!(failures = self.consecutive_failures, "Too many consecutive capture failures");
            self.finish(TerminationReason::CaptureFailed {
                failures: self.consecutive_failures,
                message: err.to_string(),
            });
        } else if self.consecutive_failures == 1 {
            self.send_event(SessionEvent::Error {
                recoverable: true,
                message: err.to_string(),
            });
        }
    }

    /// Move to `Terminated`: scheduler first, then the process, then the window.
    fn finish(&mut self, reason: TerminationReason) {
        if self.state.is_terminated() {
            return;
        }

        self.scheduler.stop();
        self.shutdown_process();
        self.window = None;
        self.search = None;
        self.stats.stop();

        if reason.is_failure() {
            warn!(reason = %reason.message(), "Session terminated");
            self.send_event(SessionEvent::Error {
                recoverable: false,
                message: reason.message(),
            });
        } else {
            info!("Session closed");
        }

        self.transition_to(SessionState::Terminated { reason });
    }

    fn shutdown_process(&mut self) {
        let Some(process) = self.process.take() else {
            return;
        };

        match process.terminate(self.config.terminate_grace(), self.clock.as_ref()) {
            Ok(TerminateOutcome::StillRunning) => {
                warn!(pid = process.pid(), "Process ignored exit request, killing");
                if let Err(e) = process.kill() {
                    error!("Failed to kill process: {}", e);
                }
            }
            Ok(outcome) => debug!(?outcome, "Process terminated"),
            Err(e) => {
                warn!("Graceful termination failed: {}", e);
                if let Err(e) = process.kill() {
                    error!("Failed to kill process: {}", e);
                }
            }
        }
    }

    fn transition_to(&mut self, new_state: SessionState) {
        let previous = std::mem::replace(&mut self.state, new_state.clone());

        debug!(
            previous = %previous.name(),
            current = %new_state.name(),
            "State transition"
        );

        self.send_event(SessionEvent::StateChanged {
            previous: Box::new(previous),
            current: Box::new(new_state),
        });
    }

    fn send_event(&self, event: SessionEvent) {
        if let Some(events) = &self.events {
            if let Err(e) = events.try_send(event) {
                warn!("Failed to send event: {}", e);
            }
        }
    }
}

impl Drop for CaptureSession {
    fn drop(&mut self) {
        self.close();
    }
}

/// A session shared between the tick source and its controller.
///
/// Ticks never queue: a tick that finds the previous one still running is
/// counted as skipped and dropped.
#[derive(Clone)]
pub struct SharedSession {
    inner: Arc<Mutex<CaptureSession>>,
    stats: Arc<StatsCollector>,
}

impl SharedSession {
    pub fn new(session: CaptureSession) -> Self {
        let stats = Arc::clone(session.stats());
        Self {
            inner: Arc::new(Mutex::new(session)),
            stats,
        }
    }

    /// Run one tick unless another is in progress. Returns whether it ran.
    pub fn tick(&self) -> bool {
        match self.inner.try_lock() {
            Some(mut session) => {
                session.on_tick();
                true
            }
            None => {
                self.stats.record_tick_skipped();
                false
            }
        }
    }

    pub fn start(&self) {
        self.inner.lock().start();
    }

    pub fn close(&self) {
        self.inner.lock().close();
    }

    pub fn state(&self) -> SessionState {
        self.inner.lock().state().clone()
    }

    pub fn stats(&self) -> CaptureStats {
        self.stats.snapshot()
    }

    pub fn stats_collector(&self) -> &Arc<StatsCollector> {
        &self.stats
    }

    /// Exclusive access to the session. Ticks are skipped while held.
    pub fn lock(&self) -> MutexGuard<'_, CaptureSession> {
        self.inner.lock()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{CaptureBehavior, Harness, PID};
    use std::time::Duration;

    fn session(harness: &Harness) -> CaptureSession {
        CaptureSession::new(
            harness.config(),
            harness.backends(),
            harness.scheduler(),
            Box::new(harness.frames.clone()),
        )
    }

    fn capturing(harness: &Harness) -> CaptureSession {
        let mut session = session(harness);
        harness.registry.show_window(0x100, "Editor");
        session.start();
        session.on_tick();
        assert!(session.state().is_capturing());
        session
    }

    #[test]
    fn test_session_reaches_capturing_and_delivers_frames() {
        let harness = Harness::new();
        let mut session = session(&harness);

        session.start();
        assert_eq!(session.state(), &SessionState::WindowSearching { pid: PID });

        session.on_tick();
        assert!(session.state().is_searching());

        harness.registry.show_window(0x100, "Editor");
        session.on_tick();
        assert_eq!(
            session.state(),
            &SessionState::Capturing {
                pid: PID,
                window: "hwnd:0x100".to_string()
            }
        );

        session.on_tick();
        let frame = harness.frames.latest().unwrap();
        assert!(frame.is_valid());
        assert_eq!(session.stats().snapshot().frames_delivered, 1);
        assert_eq!(session.stats().snapshot().search_attempts, 2);
        assert_eq!(
            harness.log.entries(),
            vec!["spawn", "start:500", "start:33"]
        );
    }

    #[test]
    fn test_launch_failure_terminates_without_ticking() {
        let harness = Harness::new();
        *harness.process.spawn_fails.lock() = true;
        let mut session = session(&harness);

        session.start();

        match session.state().termination_reason() {
            Some(TerminationReason::LaunchFailed { message }) => {
                assert!(message.contains("no such file"))
            }
            other => panic!("unexpected reason: {:?}", other),
        }
        assert_eq!(harness.log.entries(), vec!["stop"]);
    }

    #[test]
    fn test_close_is_idempotent() {
        let harness = Harness::new();
        let mut session = capturing(&harness);

        session.close();
        session.close();
        drop(session);

        assert_eq!(harness.log.count("request_exit"), 1);
        assert_eq!(harness.log.count("kill"), 0);
    }

    #[test]
    fn test_close_stops_scheduler_before_terminating() {
        let harness = Harness::new();
        let mut session = capturing(&harness);

        session.close();

        assert_eq!(
            session.state().termination_reason(),
            Some(&TerminationReason::Closed)
        );
        let stop = harness.log.position("stop").unwrap();
        let exit = harness.log.position("request_exit").unwrap();
        assert!(stop < exit);
        assert!(session.window().is_none());
        assert!(session.pid().is_none());
    }

    #[test]
    fn test_close_escalates_to_kill() {
        let harness = Harness::new();
        *harness.process.ignores_exit_request.lock() = true;
        let mut session = capturing(&harness);

        session.close();

        assert_eq!(harness.log.count("request_exit"), 1);
        assert_eq!(harness.log.count("kill"), 1);
        assert!(harness.clock.elapsed() >= Duration::from_millis(3_000));
    }

    #[test]
    fn test_terminates_after_exactly_max_failures() {
        let harness = Harness::new();
        let mut session = capturing(&harness);
        harness.capturer.set(CaptureBehavior::Fail);

        session.on_tick();
        session.on_tick();
        assert!(session.state().is_capturing());
        assert_eq!(session.consecutive_failures(), 2);

        session.on_tick();
        match session.state().termination_reason() {
            Some(TerminationReason::CaptureFailed { failures, .. }) => assert_eq!(*failures, 3),
            other => panic!("unexpected reason: {:?}", other),
        }

        session.on_tick();
        assert_eq!(harness.capturer.calls(), 3);
        assert_eq!(harness.log.count("request_exit"), 1);
    }

    #[test]
    fn test_success_resets_failure_run() {
        let harness = Harness::new();
        let mut session = capturing(&harness);

        for behavior in [
            CaptureBehavior::Fail,
            CaptureBehavior::Fail,
            CaptureBehavior::Succeed,
            CaptureBehavior::Fail,
            CaptureBehavior::Fail,
        ] {
            harness.capturer.set(behavior);
            session.on_tick();
        }

        assert!(session.state().is_capturing());
        assert_eq!(session.consecutive_failures(), 2);
    }

    #[test]
    fn test_window_gone_with_live_process_searches_again() {
        let harness = Harness::new();
        let mut session = capturing(&harness);

        harness.registry.close_all();
        harness.capturer.set(CaptureBehavior::WindowGone);
        session.on_tick();
        assert_eq!(session.state(), &SessionState::WindowSearching { pid: PID });
        assert_eq!(session.consecutive_failures(), 0);

        harness.registry.show_window(0x200, "Editor - main");
        harness.capturer.set(CaptureBehavior::Succeed);
        session.on_tick();
        assert_eq!(
            session.state(),
            &SessionState::Capturing {
                pid: PID,
                window: "hwnd:0x200".to_string()
            }
        );
        assert_eq!(harness.log.count("request_exit"), 0);
    }

    #[test]
    fn test_window_gone_with_dead_process_terminates() {
        let harness = Harness::new();
        let mut session = capturing(&harness);

        harness.process.exit_with(3);
        session.on_tick();

        assert_eq!(
            session.state().termination_reason(),
            Some(&TerminationReason::ProcessExited { exit_code: Some(3) })
        );
        assert_eq!(harness.log.count("request_exit"), 0);
        assert_eq!(harness.log.count("kill"), 0);
    }

    #[test]
    fn test_search_timeout_terminates() {
        let harness = Harness::new();
        let mut session = session(&harness);

        session.start();
        session.on_tick();
        harness.clock.advance(Duration::from_secs(6));
        session.on_tick();

        assert_eq!(
            session.state().termination_reason(),
            Some(&TerminationReason::WindowNotFound { timeout_ms: 5_000 })
        );
        assert_eq!(harness.log.count("request_exit"), 1);
    }

    #[test]
    fn test_registry_failure_ends_search_with_its_message() {
        let harness = Harness::new();
        let mut session = session(&harness);

        session.start();
        harness.registry.fail_with("Error: Can't open display: (null)");
        session.on_tick();

        match session.state().termination_reason() {
            Some(TerminationReason::LocatorFailed { message }) => {
                assert!(message.contains("Can't open display"))
            }
            other => panic!("unexpected reason: {:?}", other),
        }
        assert_eq!(harness.log.count("request_exit"), 1);
    }

    #[test]
    fn test_process_exit_during_search_is_distinct() {
        let harness = Harness::new();
        let mut session = session(&harness);

        session.start();
        harness.process.exit_with(1);
        session.on_tick();

        assert_eq!(
            session.state().termination_reason(),
            Some(&TerminationReason::ProcessExited { exit_code: Some(1) })
        );
    }

    #[test]
    fn test_state_changes_are_reported() {
        let harness = Harness::new();
        let (tx, rx) = neuro_ipc::event_channel();
        let mut session = session(&harness).with_events(tx);

        session.start();
        session.close();

        let names: Vec<_> = rx
            .try_iter()
            .filter_map(|event| match event {
                SessionEvent::StateChanged { previous, current } => {
                    Some((previous.name(), current.name()))
                }
                _ => None,
            })
            .collect();
        assert_eq!(
            names,
            vec![
                ("Launching", "WindowSearching"),
                ("WindowSearching", "Terminated")
            ]
        );
    }

    #[test]
    fn test_overlapping_tick_is_skipped() {
        let harness = Harness::new();
        let shared = SharedSession::new(capturing(&harness));

        let guard = shared.lock();
        assert!(!shared.tick());
        drop(guard);
        assert!(shared.tick());

        let stats = shared.stats();
        assert_eq!(stats.ticks_skipped, 1);
        assert_eq!(stats.frames_delivered, 1);
    }
}
