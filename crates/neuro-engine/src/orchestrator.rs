//! Main engine loop.

use std::time::{Duration, Instant};

use crossbeam_channel::{select, Receiver, Sender};
use tracing::{debug, error, info, instrument, warn};

use neuro_ipc::{SessionCommand, SessionConfig, SessionEvent, SessionState, TerminationReason};

use crate::error::EngineError;
use crate::scheduler::TickerScheduler;
use crate::session::{Backends, CaptureSession, SharedSession};
use crate::sink::FrameSink;

/// How long the loop waits for a command or tick before housekeeping.
const IDLE_POLL_INTERVAL: Duration = Duration::from_millis(100);

/// Interval between `Stats` events while capturing.
const STATS_INTERVAL: Duration = Duration::from_secs(1);

type BackendFactory = Box<dyn FnMut() -> Result<Backends, EngineError> + Send>;
type SinkFactory = Box<dyn Fn() -> Box<dyn FrameSink> + Send>;

/// Runs capture sessions on behalf of a host.
///
/// Commands arrive on a channel; ticks come from a [`TickerScheduler`] the
/// current session starts and stops. At most one session exists at a time.
pub struct Engine {
    command_rx: Receiver<SessionCommand>,
    event_tx: Sender<SessionEvent>,
    scheduler: TickerScheduler,
    session: Option<SharedSession>,
    start_failure: Option<TerminationReason>,
    backends: BackendFactory,
    sink: SinkFactory,
    last_stats: Instant,
}

impl Engine {
    /// Create an engine that delivers frames to clones of `sink`.
    pub fn new<S>(
        command_rx: Receiver<SessionCommand>,
        event_tx: Sender<SessionEvent>,
        sink: S,
    ) -> Self
    where
        S: FrameSink + Clone + 'static,
    {
        Self {
            command_rx,
            event_tx,
            scheduler: TickerScheduler::new(),
            session: None,
            start_failure: None,
            backends: Box::new(|| Backends::native().map_err(EngineError::from)),
            sink: Box::new(move || Box::new(sink.clone()) as Box<dyn FrameSink>),
            last_stats: Instant::now(),
        }
    }

    /// Replace how each session's backends are built.
    pub fn with_backends<F>(mut self, factory: F) -> Self
    where
        F: FnMut() -> Backends + Send + 'static,
    {
        let mut factory = factory;
        self.backends = Box::new(move || Ok::<_, EngineError>(factory()));
        self
    }

    /// Current session state; `Launching` before any session was started.
    pub fn state(&self) -> SessionState {
        if let Some(reason) = &self.start_failure {
            return SessionState::Terminated {
                reason: reason.clone(),
            };
        }
        self.session
            .as_ref()
            .map(SharedSession::state)
            .unwrap_or_default()
    }

    /// Run the engine (blocking).
    #[instrument(name = "engine_run", skip(self))]
    pub fn run(&mut self) {
        info!("Engine starting");
        self.send_event(SessionEvent::Ready);

        loop {
            // Restarting the scheduler swaps its receiver; fetch it fresh.
            let commands = self.command_rx.clone();
            let ticks = self.scheduler.ticks();

            select! {
                recv(commands) -> command => match command {
                    Ok(command) => {
                        if !self.handle_command(command) {
                            break;
                        }
                    }
                    Err(_) => {
                        info!("Command channel disconnected, shutting down");
                        self.close_session();
                        break;
                    }
                },
                recv(ticks) -> _ => self.on_tick(),
                default(IDLE_POLL_INTERVAL) => {}
            }

            self.maybe_emit_stats();
        }

        info!("Engine stopped");
    }

    /// Handle a command. Returns false if the engine should stop.
    fn handle_command(&mut self, command: SessionCommand) -> bool {
        debug!(?command, "Handling command");

        match command {
            SessionCommand::Start { config } => self.start_session(config),
            SessionCommand::Close => self.close_session(),
            SessionCommand::GetState => self.send_state(),
            SessionCommand::Shutdown => {
                self.close_session();
                self.send_event(SessionEvent::Shutdown);
                return false;
            }
        }

        true
    }

    #[instrument(name = "start_session", skip(self, config), fields(label = %config.label()))]
    fn start_session(&mut self, config: SessionConfig) {
        // Idempotent: ignore while a session is still alive
        if let Some(session) = &self.session {
            if !session.state().is_terminated() {
                debug!("Session already running, ignoring start command");
                return;
            }
        }

        match self.create_session(config) {
            Ok(session) => {
                self.start_failure = None;
                session.start();
                self.last_stats = Instant::now();
                self.session = Some(session);
            }
            Err(e @ EngineError::Config(_)) => {
                error!("Session start rejected: {}", e);
                self.send_event(SessionEvent::Error {
                    recoverable: true,
                    message: e.to_string(),
                });
            }
            Err(e) => {
                // No session exists to report this; the engine does.
                error!("Session start failed: {}", e);
                let message = e.to_string();
                self.send_event(SessionEvent::Error {
                    recoverable: false,
                    message: message.clone(),
                });
                let previous = self.state();
                let reason = TerminationReason::LaunchFailed { message };
                self.start_failure = Some(reason.clone());
                self.send_event(SessionEvent::StateChanged {
                    previous: Box::new(previous),
                    current: Box::new(SessionState::Terminated { reason }),
                });
            }
        }
    }

    fn create_session(&mut self, config: SessionConfig) -> Result<SharedSession, EngineError> {
        config.validate()?;
        let backends = (self.backends)()?;

        let session = CaptureSession::new(
            config,
            backends,
            Box::new(self.scheduler.clone()),
            (self.sink)(),
        )
        .with_events(self.event_tx.clone());

        Ok(SharedSession::new(session))
    }

    fn close_session(&mut self) {
        if let Some(session) = &self.session {
            session.close();
        }
    }

    fn on_tick(&self) {
        if let Some(session) = &self.session {
            session.tick();
        }
    }

    fn send_state(&self) {
        let state = self.state();
        self.send_event(SessionEvent::StateChanged {
            previous: Box::new(state.clone()),
            current: Box::new(state),
        });
    }

    fn maybe_emit_stats(&mut self) {
        let Some(session) = &self.session else {
            return;
        };
        if self.last_stats.elapsed() < STATS_INTERVAL || !session.state().is_capturing() {
            return;
        }

        let collector = session.stats_collector();
        let stats = collector.snapshot();
        collector.mark_reported();
        self.last_stats = Instant::now();

        debug!(
            frames = stats.frames_delivered,
            fps = stats.fps,
            failures = stats.capture_failures,
            "Capture stats"
        );
        self.send_event(SessionEvent::Stats(stats));
    }

    fn send_event(&self, event: SessionEvent) {
        if let Err(e) = self.event_tx.try_send(event) {
            warn!("Failed to send event: {}", e);
        }
    }
}

impl Drop for Engine {
    fn drop(&mut self) {
        self.close_session();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sink::LatestFrame;
    use crate::testing::Harness;
    use neuro_capture::CaptureError;
    use neuro_ipc::{command_channel, event_channel};
    use std::sync::Arc;
    use std::thread;

    fn wait_for<F>(events: &Receiver<SessionEvent>, mut matches: F) -> SessionEvent
    where
        F: FnMut(&SessionEvent) -> bool,
    {
        let deadline = Instant::now() + Duration::from_secs(5);
        loop {
            let remaining = deadline.saturating_duration_since(Instant::now());
            let event = events
                .recv_timeout(remaining)
                .expect("timed out waiting for event");
            if matches(&event) {
                return event;
            }
        }
    }

    fn fast_config() -> SessionConfig {
        SessionConfig {
            search_interval_ms: 5,
            capture_interval_ms: 5,
            max_consecutive_failures: 3,
            ..SessionConfig::new("/opt/apps/editor")
        }
    }

    #[test]
    fn test_engine_runs_session_until_shutdown() {
        let harness = Arc::new(Harness::new());
        harness.registry.show_window(0x100, "Editor");

        let (command_tx, command_rx) = command_channel();
        let (event_tx, event_rx) = event_channel();
        let frames = LatestFrame::new();

        let factory_harness = Arc::clone(&harness);
        let mut engine = Engine::new(command_rx, event_tx, frames.clone())
            .with_backends(move || factory_harness.backends());
        let handle = thread::spawn(move || engine.run());

        wait_for(&event_rx, |e| matches!(e, SessionEvent::Ready));
        command_tx
            .send(SessionCommand::Start {
                config: fast_config(),
            })
            .unwrap();

        wait_for(&event_rx, |e| {
            matches!(e, SessionEvent::StateChanged { current, .. } if current.is_capturing())
        });
        let deadline = Instant::now() + Duration::from_secs(5);
        while frames.latest().is_none() && Instant::now() < deadline {
            thread::sleep(Duration::from_millis(5));
        }
        assert!(frames.latest().unwrap().is_valid());

        command_tx.send(SessionCommand::Shutdown).unwrap();
        let closed = wait_for(&event_rx, |e| {
            matches!(e, SessionEvent::StateChanged { current, .. } if current.is_terminated())
        });
        match closed {
            SessionEvent::StateChanged { current, .. } => assert_eq!(
                current.termination_reason(),
                Some(&TerminationReason::Closed)
            ),
            _ => unreachable!(),
        }
        wait_for(&event_rx, |e| matches!(e, SessionEvent::Shutdown));

        handle.join().unwrap();
        assert_eq!(harness.log.count("request_exit"), 1);
    }

    #[test]
    fn test_invalid_config_reports_recoverable_error() {
        let (command_tx, command_rx) = command_channel();
        let (event_tx, event_rx) = event_channel();
        let harness = Arc::new(Harness::new());

        let factory_harness = Arc::clone(&harness);
        let mut engine = Engine::new(command_rx, event_tx, LatestFrame::new())
            .with_backends(move || factory_harness.backends());

        command_tx
            .send(SessionCommand::Start {
                config: SessionConfig::default(),
            })
            .unwrap();
        command_tx.send(SessionCommand::GetState).unwrap();
        command_tx.send(SessionCommand::Shutdown).unwrap();
        engine.run();

        let events: Vec<_> = event_rx.try_iter().collect();
        assert!(events.iter().any(|e| matches!(
            e,
            SessionEvent::Error { recoverable: true, message } if message.contains("executable_path")
        )));
        assert!(events.iter().any(|e| matches!(
            e,
            SessionEvent::StateChanged { current, .. } if current.is_launching()
        )));
        assert!(harness.log.entries().is_empty());
    }

    #[test]
    fn test_missing_backend_terminates_start() {
        let (command_tx, command_rx) = command_channel();
        let (event_tx, event_rx) = event_channel();
        let mut engine = Engine::new(command_rx, event_tx, LatestFrame::new());
        engine.backends = Box::new(|| -> Result<Backends, EngineError> {
            Err(CaptureError::ToolMissing { tool: "xdotool" }.into())
        });

        command_tx
            .send(SessionCommand::Start {
                config: fast_config(),
            })
            .unwrap();
        command_tx.send(SessionCommand::GetState).unwrap();
        command_tx.send(SessionCommand::Shutdown).unwrap();
        engine.run();

        let terminated: Vec<_> = event_rx
            .try_iter()
            .filter_map(|e| match e {
                SessionEvent::StateChanged { current, .. } => {
                    current.termination_reason().cloned()
                }
                _ => None,
            })
            .collect();
        assert_eq!(terminated.len(), 2);
        for reason in terminated {
            match reason {
                TerminationReason::LaunchFailed { message } => {
                    assert!(message.contains("xdotool"))
                }
                other => panic!("unexpected reason: {:?}", other),
            }
        }
        assert!(engine.state().is_terminated());
    }

    #[test]
    fn test_second_start_is_ignored_while_running() {
        let harness = Arc::new(Harness::new());
        let (_command_tx, command_rx) = command_channel();
        let (event_tx, _event_rx) = event_channel();

        let factory_harness = Arc::clone(&harness);
        let mut engine = Engine::new(command_rx, event_tx, LatestFrame::new())
            .with_backends(move || factory_harness.backends());

        engine.handle_command(SessionCommand::Start {
            config: fast_config(),
        });
        engine.handle_command(SessionCommand::Start {
            config: fast_config(),
        });

        assert_eq!(harness.log.count("spawn"), 1);
        assert!(engine.state().is_searching());

        engine.handle_command(SessionCommand::Close);
        assert!(engine.state().is_terminated());
        assert!(engine.handle_command(SessionCommand::Start {
            config: fast_config(),
        }));
        assert_eq!(harness.log.count("spawn"), 2);
    }
}
