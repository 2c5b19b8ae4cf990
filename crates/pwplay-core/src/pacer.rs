//! Render pacer
//!
//! Presents the shared frame at a fixed rate on a dedicated thread. Each
//! tick that finds the frame ready presents it once; deadlines advance by
//! exactly one interval from the previous deadline, so the long-run rate
//! does not drift with scheduling jitter. A late wake presents once and
//! does not try to catch up on missed frames.

use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;

use parking_lot::Mutex;
use tokio::sync::watch;
use tokio::time::Instant;
use tracing::{debug, info, trace, warn};

use crate::error::{PwPlayError, Result};
use crate::frame::SharedFrame;
use crate::render::Presenter;

const THREAD_NAME: &str = "pwplay-render";

/// Fixed-interval deadline tracker
#[derive(Debug, Clone, Copy)]
pub struct FrameClock {
    next_deadline: Instant,
    interval: Duration,
}

impl FrameClock {
    /// Clock whose first deadline is one interval from now
    pub fn new(interval: Duration) -> Self {
        Self::starting_at(Instant::now(), interval)
    }

    /// Clock whose first deadline is one interval after `start`
    pub fn starting_at(start: Instant, interval: Duration) -> Self {
        Self {
            next_deadline: start + interval,
            interval,
        }
    }

    /// Next presentation deadline
    pub fn deadline(&self) -> Instant {
        self.next_deadline
    }

    /// Time between deadlines
    pub fn interval(&self) -> Duration {
        self.interval
    }

    /// Whether `now` is past the deadline after the pending one
    pub fn is_late(&self, now: Instant) -> bool {
        now >= self.next_deadline + self.interval
    }

    /// Move to the next deadline
    pub fn advance(&mut self) -> Instant {
        self.next_deadline += self.interval;
        self.next_deadline
    }
}

/// Pacer counters
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PacerStats {
    /// Frames presented
    pub presents: u64,
    /// Ticks with no ready frame
    pub idle_ticks: u64,
    /// Ticks that woke more than one interval past their deadline
    pub late_ticks: u64,
    /// Presents the renderer refused
    pub present_failures: u64,
}

/// Result of one tick
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TickOutcome {
    /// The frame was presented
    Presented,
    /// Nothing to present yet
    Idle,
    /// The presenter failed
    Failed,
}

/// Presents the shared frame at a fixed rate
pub struct RenderPacer<S, P> {
    frame: SharedFrame<S>,
    presenter: P,
    clock: FrameClock,
    stats: Arc<Mutex<PacerStats>>,
}

impl<S, P: Presenter<S>> RenderPacer<S, P> {
    /// Create a pacer presenting `frame` every `interval`
    pub fn new(frame: SharedFrame<S>, presenter: P, interval: Duration) -> Self {
        Self::with_clock(frame, presenter, FrameClock::new(interval))
    }

    /// Create a pacer with an explicit clock
    pub fn with_clock(frame: SharedFrame<S>, presenter: P, clock: FrameClock) -> Self {
        Self {
            frame,
            presenter,
            clock,
            stats: Arc::new(Mutex::new(PacerStats::default())),
        }
    }

    /// Current deadline state
    pub fn clock(&self) -> &FrameClock {
        &self.clock
    }

    /// Snapshot of the counters
    pub fn stats(&self) -> PacerStats {
        self.stats.lock().clone()
    }

    /// Run one pacing step at `now`
    ///
    /// Presents at most once, then advances the deadline by one interval.
    pub fn tick(&mut self, now: Instant) -> TickOutcome {
        let late = self.clock.is_late(now);
        let outcome = self.present_once();

        {
            let mut stats = self.stats.lock();
            if late {
                stats.late_ticks += 1;
            }
            match outcome {
                TickOutcome::Presented => stats.presents += 1,
                TickOutcome::Idle => stats.idle_ticks += 1,
                TickOutcome::Failed => stats.present_failures += 1,
            }
        }

        self.clock.advance();
        outcome
    }

    fn present_once(&mut self) -> TickOutcome {
        let state = self.frame.lock();
        if !state.is_ready() {
            return TickOutcome::Idle;
        }

        let Some((surface, rect)) = state.presentation() else {
            return TickOutcome::Idle;
        };

        match self.presenter.present(surface, rect) {
            Ok(()) => {
                trace!("Presented {:?}", rect);
                TickOutcome::Presented
            }
            Err(e) => {
                warn!("Present failed: {}", e);
                TickOutcome::Failed
            }
        }
    }

    /// Pace until `shutdown` turns true or its sender is dropped
    ///
    /// Returns the final counters.
    pub async fn run(mut self, mut shutdown: watch::Receiver<bool>) -> PacerStats {
        debug!("Render pacer started, interval {:?}", self.clock.interval());

        loop {
            if *shutdown.borrow() {
                break;
            }

            tokio::select! {
                () = tokio::time::sleep_until(self.clock.deadline()) => {
                    self.tick(Instant::now());
                }
                changed = shutdown.changed() => {
                    if changed.is_err() {
                        break;
                    }
                }
            }
        }

        let stats = self.stats();
        debug!("Render pacer stopped: {:?}", stats);
        stats
    }
}

/// Owner of the render thread
///
/// Dropping the handle signals and joins the thread.
pub struct PacerHandle {
    shutdown: watch::Sender<bool>,
    stats: Arc<Mutex<PacerStats>>,
    thread: Option<JoinHandle<PacerStats>>,
}

impl PacerHandle {
    /// Start `pacer` on its own thread with a current-thread runtime
    pub fn spawn<S, P>(pacer: RenderPacer<S, P>) -> Result<Self>
    where
        S: Send + 'static,
        P: Presenter<S> + 'static,
    {
        let runtime = tokio::runtime::Builder::new_current_thread()
            .enable_time()
            .build()
            .map_err(|e| PwPlayError::thread(format!("failed to build runtime: {}", e)))?;

        let (shutdown, receiver) = watch::channel(false);
        let stats = Arc::clone(&pacer.stats);

        let thread = thread::Builder::new()
            .name(THREAD_NAME.to_string())
            .spawn(move || runtime.block_on(pacer.run(receiver)))
            .map_err(|e| PwPlayError::thread(format!("failed to spawn: {}", e)))?;

        info!("Render thread started");

        Ok(Self {
            shutdown,
            stats,
            thread: Some(thread),
        })
    }

    /// Snapshot of the live counters
    pub fn stats(&self) -> PacerStats {
        self.stats.lock().clone()
    }

    /// Signal the thread and wait for it
    ///
    /// Returns the final counters.
    pub fn shutdown(mut self) -> Result<PacerStats> {
        self.stop()
    }

    fn stop(&mut self) -> Result<PacerStats> {
        let Some(thread) = self.thread.take() else {
            return Ok(self.stats());
        };

        // A dropped receiver means the thread already exited
        let _ = self.shutdown.send(true);

        let stats = thread
            .join()
            .map_err(|_| PwPlayError::thread("render thread panicked"))?;
        info!("Render thread stopped after {} presents", stats.presents);
        Ok(stats)
    }
}

impl Drop for PacerHandle {
    fn drop(&mut self) {
        if let Err(e) = self.stop() {
            warn!("{}", e);
        }
    }
}
