//! Capture statistics collection and reporting.

use std::sync::atomic::{AtomicU32, AtomicU64, Ordering};
use std::time::Instant;

use parking_lot::RwLock;
use tracing::debug;

use neuro_ipc::CaptureStats;

/// Collects per-session capture statistics.
///
/// Shared between the session and the engine loop; every counter is atomic
/// so recording never contends with a capture tick.
pub struct StatsCollector {
    start_time: RwLock<Option<Instant>>,
    frames_delivered: AtomicU64,
    capture_failures: AtomicU64,
    consecutive_failures: AtomicU32,
    ticks_skipped: AtomicU64,
    search_attempts: AtomicU64,
    last_width: AtomicU32,
    last_height: AtomicU32,
    last_report_time: RwLock<Instant>,
    last_frame_count: AtomicU64,
}

impl StatsCollector {
    pub fn new() -> Self {
        Self {
            start_time: RwLock::new(None),
            frames_delivered: AtomicU64::new(0),
            capture_failures: AtomicU64::new(0),
            consecutive_failures: AtomicU32::new(0),
            ticks_skipped: AtomicU64::new(0),
            search_attempts: AtomicU64::new(0),
            last_width: AtomicU32::new(0),
            last_height: AtomicU32::new(0),
            last_report_time: RwLock::new(Instant::now()),
            last_frame_count: AtomicU64::new(0),
        }
    }

    /// Mark the start of capturing. Uptime counts from the first call.
    pub fn start(&self) {
        let mut start_time = self.start_time.write();
        if start_time.is_none() {
            *start_time = Some(Instant::now());
            *self.last_report_time.write() = Instant::now();
        }
    }

    /// Stop the uptime clock.
    pub fn stop(&self) {
        *self.start_time.write() = None;
    }

    /// Record a frame handed to the sink.
    pub fn record_frame(&self, width: u32, height: u32) {
        self.frames_delivered.fetch_add(1, Ordering::Relaxed);
        self.consecutive_failures.store(0, Ordering::Relaxed);
        self.last_width.store(width, Ordering::Relaxed);
        self.last_height.store(height, Ordering::Relaxed);
    }

    /// Record a failed capture and the current failure run length.
    pub fn record_failure(&self, consecutive: u32) {
        self.capture_failures.fetch_add(1, Ordering::Relaxed);
        self.consecutive_failures.store(consecutive, Ordering::Relaxed);
    }

    /// Reset the consecutive failure run, e.g. after the window changed.
    pub fn reset_failures(&self) {
        self.consecutive_failures.store(0, Ordering::Relaxed);
    }

    /// Record a tick dropped because the previous one was still running.
    pub fn record_tick_skipped(&self) {
        let skipped = self.ticks_skipped.fetch_add(1, Ordering::Relaxed) + 1;
        if skipped % 100 == 1 {
            debug!(skipped, "Capture tick overlapped previous tick, skipping");
        }
    }

    /// Record one window search attempt.
    pub fn record_search_attempt(&self) {
        self.search_attempts.fetch_add(1, Ordering::Relaxed);
    }

    /// Get current stats snapshot.
    pub fn snapshot(&self) -> CaptureStats {
        let now = Instant::now();

        let last_time = *self.last_report_time.read();
        let elapsed = now.duration_since(last_time).as_secs_f32();
        let current_frames = self.frames_delivered.load(Ordering::Relaxed);
        let last_frames = self.last_frame_count.load(Ordering::Relaxed);

        let fps = if elapsed > 0.0 {
            current_frames.saturating_sub(last_frames) as f32 / elapsed
        } else {
            0.0
        };

        let uptime_seconds = self
            .start_time
            .read()
            .map(|s| now.duration_since(s).as_secs())
            .unwrap_or(0);

        CaptureStats {
            frames_delivered: current_frames,
            capture_failures: self.capture_failures.load(Ordering::Relaxed),
            consecutive_failures: self.consecutive_failures.load(Ordering::Relaxed),
            ticks_skipped: self.ticks_skipped.load(Ordering::Relaxed),
            search_attempts: self.search_attempts.load(Ordering::Relaxed),
            fps,
            last_width: self.last_width.load(Ordering::Relaxed),
            last_height: self.last_height.load(Ordering::Relaxed),
            uptime_seconds,
        }
    }

    /// Update last report time for FPS calculation.
    pub fn mark_reported(&self) {
        *self.last_report_time.write() = Instant::now();
        self.last_frame_count.store(
            self.frames_delivered.load(Ordering::Relaxed),
            Ordering::Relaxed,
        );
    }
}

impl Default for StatsCollector {
    fn default() -> Self {
        Self::new()
    }
}
