//! Tick scheduling for the capture session.

use std::sync::Arc;
use std::time::{Duration, Instant};

use crossbeam_channel::{never, tick, Receiver};
use parking_lot::Mutex;
use tracing::debug;

/// Drives a session's periodic work.
///
/// The session calls `start` whenever it enters a state with a different
/// cadence and `stop` when it ends. Starting an already running scheduler
/// replaces its interval.
pub trait Scheduler: Send {
    fn start(&mut self, interval: Duration);
    fn stop(&mut self);
}

struct TickerState {
    ticks: Receiver<Instant>,
    interval: Option<Duration>,
}

/// [`Scheduler`] backed by `crossbeam_channel::tick`.
///
/// Clones share one ticker: the session holds one to start and stop it, the
/// engine loop holds another to receive ticks. The tick channel buffers a
/// single pending tick, so a slow consumer skips ticks rather than
/// accumulating a backlog.
#[derive(Clone)]
pub struct TickerScheduler {
    shared: Arc<Mutex<TickerState>>,
}

impl TickerScheduler {
    /// Create a stopped scheduler.
    pub fn new() -> Self {
        Self {
            shared: Arc::new(Mutex::new(TickerState {
                ticks: never(),
                interval: None,
            })),
        }
    }

    /// Receiver for the current ticker. Never fires while stopped.
    ///
    /// Restarting swaps the receiver, so fetch it again after each tick.
    pub fn ticks(&self) -> Receiver<Instant> {
        self.shared.lock().ticks.clone()
    }

    /// Current interval, or `None` when stopped.
    pub fn interval(&self) -> Option<Duration> {
        self.shared.lock().interval
    }

    pub fn is_running(&self) -> bool {
        self.interval().is_some()
    }
}

impl Default for TickerScheduler {
    fn default() -> Self {
        Self::new()
    }
}

impl Scheduler for TickerScheduler {
    fn start(&mut self, interval: Duration) {
        let mut state = self.shared.lock();
        if state.interval == Some(interval) {
            return;
        }
        debug!(interval_ms = interval.as_millis() as u64, "Starting ticker");
        state.ticks = tick(interval);
        state.interval = Some(interval);
    }

    fn stop(&mut self) {
        let mut state = self.shared.lock();
        if state.interval.take().is_some() {
            debug!("Stopping ticker");
        }
        state.ticks = never();
    }
}
