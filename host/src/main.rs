//! Neuro-OS capture host.
//!
//! Launches an application, captures its main window, and logs session
//! progress until the session ends or the requested duration elapses.

mod config;

use std::path::{Path, PathBuf};
use std::thread;
use std::time::{Duration, Instant};

use anyhow::{anyhow, bail, Context, Result};
use clap::Parser;
use crossbeam_channel::{Receiver, RecvTimeoutError};
use tracing::{error, info, warn};

use neuro_engine::{Engine, LatestFrame};
use neuro_ipc::{
    command_channel, event_channel, SessionCommand, SessionEvent, TerminationReason,
};

/// How long to wait for the engine to acknowledge shutdown.
const SHUTDOWN_TIMEOUT: Duration = Duration::from_secs(10);

#[derive(Parser, Debug)]
#[command(name = "neuro-host")]
#[command(about = "Launch an application and capture its main window")]
#[command(version)]
struct Cli {
    /// Executable to launch
    executable: Option<PathBuf>,

    /// Display name for the captured application
    #[arg(long)]
    name: Option<String>,

    /// JSON session config; command-line values take precedence
    #[arg(long)]
    config: Option<PathBuf>,

    /// Consecutive capture failures that end the session
    #[arg(long)]
    max_failures: Option<u32>,

    /// Write the last captured frame to this PNG file on exit
    #[arg(long)]
    snapshot: Option<PathBuf>,

    /// Stop after this many seconds
    #[arg(long)]
    duration: Option<f64>,
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive(tracing::Level::INFO.into()),
        )
        .init();

    let config = config::resolve(
        cli.config.as_deref(),
        config::Overrides {
            executable: cli.executable.clone(),
            display_name: cli.name.clone(),
            max_consecutive_failures: cli.max_failures,
        },
    )?;
    let duration = cli
        .duration
        .map(Duration::try_from_secs_f64)
        .transpose()
        .context("Invalid --duration")?;

    info!(label = %config.label(), "Neuro-OS capture host starting");

    let (command_tx, command_rx) = command_channel();
    let (event_tx, event_rx) = event_channel();
    let frames = LatestFrame::new();

    let engine_frames = frames.clone();
    let engine_thread = thread::Builder::new()
        .name("neuro-engine".to_string())
        .spawn(move || {
            info!("Engine thread starting");
            let mut engine = Engine::new(command_rx, event_tx, engine_frames);
            engine.run();
            info!("Engine thread stopped");
        })
        .context("Failed to spawn engine thread")?;

    command_tx
        .send(SessionCommand::Start { config })
        .context("Failed to send start command")?;

    let outcome = watch_session(&event_rx, duration.map(|d| Instant::now() + d));

    if command_tx.send(SessionCommand::Shutdown).is_ok() {
        wait_for_shutdown(&event_rx);
    }
    engine_thread
        .join()
        .map_err(|_| anyhow!("Engine thread panicked"))?;

    if let Some(path) = &cli.snapshot {
        write_snapshot(&frames, path)?;
    }

    match outcome {
        Some(reason) if reason.is_failure() => bail!("Session ended: {}", reason.message()),
        _ => Ok(()),
    }
}

/// Log engine events until the session terminates or `deadline` passes.
///
/// An error before the first state change means the session never started.
fn watch_session(
    events: &Receiver<SessionEvent>,
    deadline: Option<Instant>,
) -> Option<TerminationReason> {
    let mut started = false;
    loop {
        let timeout = match deadline {
            Some(deadline) => {
                let remaining = deadline.saturating_duration_since(Instant::now());
                if remaining.is_zero() {
                    info!("Duration elapsed, closing session");
                    return None;
                }
                remaining
            }
            None => Duration::from_secs(3600),
        };

        let event = match events.recv_timeout(timeout) {
            Ok(event) => event,
            Err(RecvTimeoutError::Timeout) => continue,
            Err(RecvTimeoutError::Disconnected) => {
                warn!("Engine event channel closed");
                return None;
            }
        };

        match event {
            SessionEvent::StateChanged { previous, current } => {
                started = true;
                info!(previous = previous.name(), current = current.name(), "Session state");
                if let Some(reason) = current.termination_reason() {
                    return Some(reason.clone());
                }
            }
            SessionEvent::Stats(stats) => info!(
                frames = stats.frames_delivered,
                fps = %format!("{:.1}", stats.fps),
                failures = stats.capture_failures,
                skipped = stats.ticks_skipped,
                size = %format!("{}x{}", stats.last_width, stats.last_height),
                "Capture stats"
            ),
            SessionEvent::Error { message, .. } if !started => {
                error!("Session did not start: {}", message);
                return Some(TerminationReason::LaunchFailed { message });
            }
            SessionEvent::Error {
                recoverable: true,
                message,
            } => warn!("{}", message),
            SessionEvent::Error { message, .. } => error!("{}", message),
            SessionEvent::Ready => info!("Engine ready"),
            SessionEvent::Shutdown => return None,
        }
    }
}

fn wait_for_shutdown(events: &Receiver<SessionEvent>) {
    let deadline = Instant::now() + SHUTDOWN_TIMEOUT;
    loop {
        let remaining = deadline.saturating_duration_since(Instant::now());
        match events.recv_timeout(remaining) {
            Ok(SessionEvent::Shutdown) => return,
            Ok(_) => continue,
            Err(_) => {
                warn!("Engine did not confirm shutdown");
                return;
            }
        }
    }
}

fn write_snapshot(frames: &LatestFrame, path: &Path) -> Result<()> {
    let Some(frame) = frames.latest() else {
        warn!("No frame captured, skipping snapshot");
        return Ok(());
    };

    let image = image::RgbaImage::from_raw(frame.width, frame.height, frame.to_rgba())
        .context("Frame buffer does not match its dimensions")?;
    image
        .save(path)
        .with_context(|| format!("Failed to write snapshot {}", path.display()))?;

    info!(path = %path.display(), width = frame.width, height = frame.height, "Wrote snapshot");
    Ok(())
}
