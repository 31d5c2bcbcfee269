//! Fakes for session and engine tests.

use std::io;
use std::ops::ControlFlow;
use std::path::Path;
use std::sync::Arc;
use std::time::{Duration, Instant};

use bytes::Bytes;
use parking_lot::Mutex;

use neuro_capture::{
    BackendCapabilities, CaptureError, CaptureResult, CaptureTimestamp, Frame, FrameCapturer,
    WindowHandle, WindowInfo, WindowRegistry,
};
use neuro_ipc::SessionConfig;
use neuro_process::{ChildProcess, Clock, ExitInfo, ManualClock, ProcessError, Spawner};

use crate::scheduler::Scheduler;
use crate::session::Backends;
use crate::sink::LatestFrame;

pub const PID: u32 = 4242;

pub fn frame(width: u32, height: u32, sequence: u64) -> Frame {
    Frame::new(
        Bytes::from(vec![0xFF; (width * height * 4) as usize]),
        width,
        height,
        CaptureTimestamp::now(Instant::now()),
        sequence,
    )
}

/// Ordered record of side effects across fakes.
#[derive(Clone, Default)]
pub struct CallLog(Arc<Mutex<Vec<String>>>);

impl CallLog {
    pub fn push(&self, entry: impl Into<String>) {
        self.0.lock().push(entry.into());
    }

    pub fn entries(&self) -> Vec<String> {
        self.0.lock().clone()
    }

    pub fn count(&self, entry: &str) -> usize {
        self.0.lock().iter().filter(|e| e.as_str() == entry).count()
    }

    pub fn position(&self, entry: &str) -> Option<usize> {
        self.0.lock().iter().position(|e| e == entry)
    }
}

#[derive(Default)]
pub struct ProcessControl {
    pub exit: Mutex<Option<ExitInfo>>,
    pub ignores_exit_request: Mutex<bool>,
    pub spawn_fails: Mutex<bool>,
}

impl ProcessControl {
    pub fn exit_with(&self, code: i32) {
        *self.exit.lock() = Some(ExitInfo { code: Some(code) });
    }
}

struct FakeChild {
    control: Arc<ProcessControl>,
    log: CallLog,
}

impl ChildProcess for FakeChild {
    fn id(&self) -> u32 {
        PID
    }

    fn try_wait(&mut self) -> io::Result<Option<ExitInfo>> {
        Ok(*self.control.exit.lock())
    }

    fn request_exit(&mut self) -> Result<(), ProcessError> {
        self.log.push("request_exit");
        if !*self.control.ignores_exit_request.lock() {
            self.control.exit_with(0);
        }
        Ok(())
    }

    fn kill(&mut self) -> io::Result<()> {
        self.log.push("kill");
        *self.control.exit.lock() = Some(ExitInfo { code: None });
        Ok(())
    }
}

pub struct FakeSpawner {
    control: Arc<ProcessControl>,
    log: CallLog,
}

impl Spawner for FakeSpawner {
    fn spawn(&self, _executable: &Path) -> io::Result<Box<dyn ChildProcess>> {
        if *self.control.spawn_fails.lock() {
            return Err(io::Error::new(io::ErrorKind::NotFound, "no such file"));
        }
        self.log.push("spawn");
        Ok(Box::new(FakeChild {
            control: Arc::clone(&self.control),
            log: self.log.clone(),
        }))
    }
}

/// Registry whose window list the test edits.
#[derive(Clone, Default)]
pub struct FakeRegistry {
    windows: Arc<Mutex<Vec<WindowInfo>>>,
    failure: Arc<Mutex<Option<String>>>,
}

impl FakeRegistry {
    pub fn show_window(&self, id: isize, title: &str) {
        self.windows.lock().push(WindowInfo {
            handle: WindowHandle::Native(id),
            title: title.to_string(),
            process_id: PID,
            visible: true,
        });
    }

    pub fn close_all(&self) {
        self.windows.lock().clear();
    }

    /// Make every query fail the way a broken `xdotool` does.
    pub fn fail_with(&self, stderr: &str) {
        *self.failure.lock() = Some(stderr.to_string());
    }
}

impl WindowRegistry for FakeRegistry {
    fn visit_windows(
        &self,
        owner: u32,
        visit: &mut dyn FnMut(&WindowInfo) -> ControlFlow<()>,
    ) -> CaptureResult<()> {
        if let Some(stderr) = self.failure.lock().clone() {
            return Err(CaptureError::ToolFailed {
                tool: "xdotool",
                status: "exit status: 1".to_string(),
                stderr,
            });
        }
        for window in self.windows.lock().iter() {
            if window.process_id == owner && visit(window).is_break() {
                break;
            }
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CaptureBehavior {
    Succeed,
    Fail,
    WindowGone,
}

/// Capturer whose result the test switches between ticks.
#[derive(Clone)]
pub struct ScriptedCapturer {
    behavior: Arc<Mutex<CaptureBehavior>>,
    calls: Arc<Mutex<u32>>,
    sequence: u64,
}

impl ScriptedCapturer {
    pub fn set(&self, behavior: CaptureBehavior) {
        *self.behavior.lock() = behavior;
    }

    pub fn calls(&self) -> u32 {
        *self.calls.lock()
    }
}

impl FrameCapturer for ScriptedCapturer {
    fn capture(&mut self, window: &WindowHandle) -> CaptureResult<Frame> {
        *self.calls.lock() += 1;
        match *self.behavior.lock() {
            CaptureBehavior::Succeed => {
                self.sequence += 1;
                Ok(frame(8, 6, self.sequence))
            }
            CaptureBehavior::Fail => Err(CaptureError::InvalidGeometry {
                width: 0,
                height: 0,
            }),
            CaptureBehavior::WindowGone => Err(CaptureError::WindowGone(window.to_string())),
        }
    }

    fn backend_name(&self) -> &'static str {
        "scripted"
    }

    fn capabilities(&self) -> BackendCapabilities {
        BackendCapabilities {
            captures_obscured: true,
            filesystem_round_trip: false,
        }
    }
}

/// Scheduler that only records calls; tests tick the session by hand.
pub struct RecordingScheduler {
    log: CallLog,
}

impl Scheduler for RecordingScheduler {
    fn start(&mut self, interval: Duration) {
        self.log.push(format!("start:{}", interval.as_millis()));
    }

    fn stop(&mut self) {
        self.log.push("stop");
    }
}

/// Every fake a session needs, plus handles to steer them.
pub struct Harness {
    pub log: CallLog,
    pub process: Arc<ProcessControl>,
    pub registry: FakeRegistry,
    pub capturer: ScriptedCapturer,
    pub clock: Arc<ManualClock>,
    pub frames: LatestFrame,
}

impl Harness {
    pub fn new() -> Self {
        Self {
            log: CallLog::default(),
            process: Arc::new(ProcessControl::default()),
            registry: FakeRegistry::default(),
            capturer: ScriptedCapturer {
                behavior: Arc::new(Mutex::new(CaptureBehavior::Succeed)),
                calls: Arc::new(Mutex::new(0)),
                sequence: 0,
            },
            clock: Arc::new(ManualClock::new()),
            frames: LatestFrame::new(),
        }
    }

    pub fn config(&self) -> SessionConfig {
        SessionConfig {
            max_consecutive_failures: 3,
            search_timeout_ms: 5_000,
            ..SessionConfig::new("/opt/apps/editor")
        }
    }

    pub fn backends(&self) -> Backends {
        Backends {
            spawner: Arc::new(FakeSpawner {
                control: Arc::clone(&self.process),
                log: self.log.clone(),
            }),
            registry: Arc::new(self.registry.clone()),
            capturer: Box::new(self.capturer.clone()),
            clock: Arc::clone(&self.clock) as Arc<dyn Clock>,
        }
    }

    pub fn scheduler(&self) -> Box<dyn Scheduler> {
        Box::new(RecordingScheduler {
            log: self.log.clone(),
        })
    }
}
