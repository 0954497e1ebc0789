//! Continuity worker: keeps the next stretch of program composed ahead of
//! playback on a dedicated thread.
//!
//! All builds run on the single `station-continuity` thread. Callers talk to
//! it through a [`ContinuityHandle`] (wraps `mpsc::Sender<ContinuityCmd>`) and
//! receive results through the `on_event` callback.
//!
//! Selecting a station is debounced: only the last selection of a burst is
//! built, once no other selection has arrived for the station's debounce
//! period. Every selection bumps a shared generation counter, so a build
//! that finishes after a newer selection is reported as
//! [`ContinuityEvent::Discarded`] instead of being delivered.

use crate::program::{DayWindow, Program, local_now};
use crate::timeline::TimeRange;
use chrono::{NaiveDate, Timelike};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, mpsc};
use std::time::{Duration, Instant};

/// How long the loop sleeps when nothing is scheduled.
const IDLE_POLL: Duration = Duration::from_millis(250);

// ── Commands & Events ────────────────────────────────────────────────────────

/// Commands sent to the continuity thread.
pub enum ContinuityCmd {
    /// Switch to a station. `generation` is the counter value taken when
    /// the selection was made.
    Select {
        program: Arc<Program>,
        generation: u64,
    },
    /// Seconds of composed program still queued for playback.
    Progress { remaining: f64 },
    /// Compose what follows `last_range` right away.
    PrepareNext {
        last_range: TimeRange,
        last_day: NaiveDate,
        min_duration: f64,
    },
    Shutdown,
}

/// Events emitted by the continuity thread.
#[derive(Debug, Clone, PartialEq)]
pub enum ContinuityEvent {
    Prepared { station: String, window: DayWindow },
    Failed { station: String, error: String },
    /// A build finished or was about to start after a newer selection.
    Discarded { station: String },
}

// ── Handle ───────────────────────────────────────────────────────────────────

/// Thread-safe handle for sending commands to the continuity worker.
#[derive(Clone)]
pub struct ContinuityHandle {
    tx: mpsc::Sender<ContinuityCmd>,
    generation: Arc<AtomicU64>,
}

impl ContinuityHandle {
    pub fn select(&self, program: Arc<Program>) {
        let generation = self.generation.fetch_add(1, Ordering::SeqCst) + 1;
        let _ = self.tx.send(ContinuityCmd::Select {
            program,
            generation,
        });
    }

    pub fn progress(&self, remaining: f64) {
        let _ = self.tx.send(ContinuityCmd::Progress { remaining });
    }

    pub fn prepare_next(&self, last_range: TimeRange, last_day: NaiveDate, min_duration: f64) {
        let _ = self.tx.send(ContinuityCmd::PrepareNext {
            last_range,
            last_day,
            min_duration,
        });
    }

    pub fn shutdown(&self) {
        let _ = self.tx.send(ContinuityCmd::Shutdown);
    }
}

// ── Runtime ──────────────────────────────────────────────────────────────────

/// Spawn the continuity worker on a dedicated thread.
///
/// `on_event` is called from the worker thread each time a build completes,
/// fails or is thrown away.
pub fn spawn_continuity<F>(on_event: F) -> std::io::Result<ContinuityHandle>
where
    F: Fn(ContinuityEvent) + Send + 'static,
{
    let (tx, rx) = mpsc::channel::<ContinuityCmd>();
    let generation = Arc::new(AtomicU64::new(0));
    let worker_generation = generation.clone();

    std::thread::Builder::new()
        .name("station-continuity".into())
        .spawn(move || {
            Worker::new(worker_generation, on_event).run(rx);
        })?;

    Ok(ContinuityHandle { tx, generation })
}

struct PendingSelect {
    program: Arc<Program>,
    generation: u64,
    deadline: Instant,
}

struct Active {
    program: Arc<Program>,
    generation: u64,
    /// Last component of the most recently delivered window.
    tail: Option<(TimeRange, NaiveDate)>,
    /// A delivered window has not been reflected in `Progress` yet.
    awaiting_uptake: bool,
}

struct Worker<F> {
    generation: Arc<AtomicU64>,
    on_event: F,
    pending: Option<PendingSelect>,
    active: Option<Active>,
}

impl<F> Worker<F>
where
    F: Fn(ContinuityEvent),
{
    fn new(generation: Arc<AtomicU64>, on_event: F) -> Self {
        Worker {
            generation,
            on_event,
            pending: None,
            active: None,
        }
    }

    fn run(mut self, rx: mpsc::Receiver<ContinuityCmd>) {
        loop {
            self.activate_if_due();

            let timeout = self
                .pending
                .as_ref()
                .map(|p| p.deadline.saturating_duration_since(Instant::now()))
                .unwrap_or(IDLE_POLL);

            match rx.recv_timeout(timeout) {
                Ok(ContinuityCmd::Select {
                    program,
                    generation,
                }) => {
                    tracing::debug!(
                        "Selection of '{}' (generation {}) waits {:?}",
                        program.tag(),
                        generation,
                        program.config().debounce()
                    );
                    let deadline = Instant::now() + program.config().debounce();
                    self.pending = Some(PendingSelect {
                        program,
                        generation,
                        deadline,
                    });
                }

                Ok(ContinuityCmd::Progress { remaining }) => self.on_progress(remaining),

                Ok(ContinuityCmd::PrepareNext {
                    last_range,
                    last_day,
                    min_duration,
                }) => {
                    if let Some(active) = &mut self.active {
                        active.tail = Some((last_range, last_day));
                        self.build_next(min_duration);
                    }
                }

                Ok(ContinuityCmd::Shutdown) => break,

                Err(mpsc::RecvTimeoutError::Timeout) => {}

                Err(mpsc::RecvTimeoutError::Disconnected) => break,
            }
        }
        tracing::debug!("Continuity worker stopped");
    }

    fn activate_if_due(&mut self) {
        let due = self
            .pending
            .as_ref()
            .is_some_and(|p| p.deadline <= Instant::now());
        if !due {
            return;
        }
        let Some(selected) = self.pending.take() else {
            return;
        };

        tracing::info!("Switching to '{}'", selected.program.tag());
        self.active = Some(Active {
            program: selected.program,
            generation: selected.generation,
            tail: None,
            awaiting_uptake: false,
        });
        self.build_initial();
    }

    fn on_progress(&mut self, remaining: f64) {
        let Some(active) = &mut self.active else {
            return;
        };
        let look_ahead = active.program.config().look_ahead_secs;
        if remaining >= look_ahead {
            active.awaiting_uptake = false;
            return;
        }
        if active.awaiting_uptake {
            return;
        }
        tracing::debug!(
            "{:.1}s left of '{}', composing ahead",
            remaining,
            active.program.tag()
        );
        self.build_next(look_ahead);
    }

    /// Compose from the current local time.
    fn build_initial(&mut self) {
        let Some(active) = &self.active else {
            return;
        };
        let program = active.program.clone();
        let generation = active.generation;
        let config = program.config();
        let now = local_now(config.utc_offset_secs);
        let from = f64::from(now.time().num_seconds_from_midnight());
        let to = from + config.look_ahead_secs;

        self.run_build(&program, generation, || {
            program.compose_window(now.date(), from, to)
        });
    }

    /// Compose what follows the tail of the last delivered window.
    fn build_next(&mut self, min_duration: f64) {
        let Some(active) = &self.active else {
            return;
        };
        let program = active.program.clone();
        let generation = active.generation;
        let tail = active.tail;
        match tail {
            Some((last_range, last_day)) => self.run_build(&program, generation, || {
                program.prepare_next(last_range, last_day, min_duration)
            }),
            None => self.build_initial(),
        }
    }

    fn run_build<B>(&mut self, program: &Program, generation: u64, build: B)
    where
        B: FnOnce() -> crate::error::Result<DayWindow>,
    {
        let station = program.tag().to_string();
        if self.is_stale(generation) {
            (self.on_event)(ContinuityEvent::Discarded { station });
            return;
        }

        let result = build();

        if self.is_stale(generation) {
            tracing::debug!("Dropping stale build of '{}'", station);
            (self.on_event)(ContinuityEvent::Discarded { station });
            return;
        }

        match result {
            Ok(window) => {
                if let Some(active) = &mut self.active {
                    active.tail = window
                        .window
                        .last_range
                        .map(|range| (range, window.last_day));
                    active.awaiting_uptake = true;
                }
                (self.on_event)(ContinuityEvent::Prepared { station, window });
            }
            Err(e) => {
                tracing::warn!("Could not compose '{}': {}", station, e);
                (self.on_event)(ContinuityEvent::Failed {
                    station,
                    error: e.to_string(),
                });
            }
        }
    }

    fn is_stale(&self, generation: u64) -> bool {
        self.generation.load(Ordering::SeqCst) != generation
    }
}

// ── Tests ────────────────────────────────────────────────────────────────────
