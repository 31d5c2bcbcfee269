//! Capture session orchestration for the Neuro-OS shell.
//!
//! This crate ties process launching, window search and frame capture into
//! one [`CaptureSession`] state machine and runs it behind a
//! command/event channel pair.

mod error;
mod metrics;
mod orchestrator;
mod scheduler;
mod session;
mod sink;

#[cfg(test)]
mod testing;

pub use error::EngineError;
pub use metrics::StatsCollector;
pub use orchestrator::Engine;
pub use scheduler::{Scheduler, TickerScheduler};
pub use session::{Backends, CaptureSession, SharedSession};
pub use sink::{ChannelSink, FrameSink, LatestFrame, FRAME_CHANNEL_CAPACITY};

use crossbeam_channel::{Receiver, Sender};
use neuro_ipc::{SessionCommand, SessionEvent};

/// Create an engine instance with IPC channels.
pub fn create_engine<S>(
    command_rx: Receiver<SessionCommand>,
    event_tx: Sender<SessionEvent>,
    sink: S,
) -> Engine
where
    S: FrameSink + Clone + 'static,
{
    Engine::new(command_rx, event_tx, sink)
}
