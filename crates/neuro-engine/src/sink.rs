//! Where captured frames go.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use crossbeam_channel::{Receiver, Sender, TrySendError};
use neuro_capture::Frame;
use parking_lot::Mutex;
use tracing::{debug, trace};

/// Frames buffered between the session and a [`ChannelSink`] consumer.
pub const FRAME_CHANNEL_CAPACITY: usize = 3;

/// Consumer of captured frames.
pub trait FrameSink: Send {
    /// Hand over a frame. Must not block the capture tick.
    fn present(&mut self, frame: Frame);
}

/// Sends frames over a bounded channel, dropping them when the consumer lags.
#[derive(Clone)]
pub struct ChannelSink {
    tx: Sender<Frame>,
    dropped: Arc<AtomicU64>,
}

impl ChannelSink {
    /// Create a sink and the receiver that drains it.
    pub fn channel() -> (Self, Receiver<Frame>) {
        let (tx, rx) = crossbeam_channel::bounded(FRAME_CHANNEL_CAPACITY);
        let sink = Self {
            tx,
            dropped: Arc::new(AtomicU64::new(0)),
        };
        (sink, rx)
    }

    /// Frames dropped because the channel was full.
    pub fn dropped(&self) -> u64 {
        self.dropped.load(Ordering::Relaxed)
    }
}

impl FrameSink for ChannelSink {
    fn present(&mut self, frame: Frame) {
        match self.tx.try_send(frame) {
            Ok(()) => {}
            Err(TrySendError::Full(frame)) => {
                let dropped = self.dropped.fetch_add(1, Ordering::Relaxed) + 1;
                trace!(sequence = frame.sequence, dropped, "Frame channel full, dropping frame");
            }
            Err(TrySendError::Disconnected(_)) => {
                debug!("Frame receiver gone");
            }
        }
    }
}

/// Keeps only the most recent frame.
#[derive(Clone, Default)]
pub struct LatestFrame {
    slot: Arc<Mutex<Option<Frame>>>,
}

impl LatestFrame {
    pub fn new() -> Self {
        Self::default()
    }

    /// The newest frame presented so far.
    pub fn latest(&self) -> Option<Frame> {
        self.slot.lock().clone()
    }

    /// Take the newest frame, leaving the slot empty.
    pub fn take(&self) -> Option<Frame> {
        self.slot.lock().take()
    }
}

impl FrameSink for LatestFrame {
    fn present(&mut self, frame: Frame) {
        *self.slot.lock() = Some(frame);
    }
}
