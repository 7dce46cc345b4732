//! Fixed-interval run scheduler.
//!
//! Ticks on a wall-clock interval and invokes the orchestrator once per
//! tick. Ticks are aligned to start plus whole intervals; ticks that fall
//! due while a run is in progress are skipped, never queued. The first
//! failed run moves the scheduler to `Halted` for the rest of the process
//! lifetime.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::watch;
use tokio::time::{sleep_until, Instant};
use tracing::{debug, info, warn};

use crate::domain::{PipelineOutcome, SchedulerState};

use super::clock::{Clock, SystemClock};
use super::orchestrator::Orchestrator;
use super::status_store::StatusStore;

/// Default interval between runs
pub const DEFAULT_INTERVAL: Duration = Duration::from_secs(10 * 60);

/// What a single tick did
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TickOutcome {
    /// A run happened and completed
    Ran(PipelineOutcome),

    /// A run happened and failed; the scheduler is now halted
    Halted(PipelineOutcome),

    /// The scheduler was already halted; nothing ran
    Skipped,
}

/// Recurring trigger for the orchestrator
pub struct Scheduler {
    orchestrator: Arc<Orchestrator>,
    store: Arc<StatusStore>,
    interval: Duration,
    run_on_start: bool,
    clock: Arc<dyn Clock>,
}

impl Scheduler {
    /// Create a scheduler ticking every `interval`
    pub fn new(orchestrator: Arc<Orchestrator>, interval: Duration) -> Self {
        let store = Arc::clone(orchestrator.store());
        Self {
            orchestrator,
            store,
            interval,
            run_on_start: false,
            clock: Arc::new(SystemClock),
        }
    }

    /// Run once immediately instead of waiting a full interval
    pub fn with_run_on_start(mut self, run_on_start: bool) -> Self {
        self.run_on_start = run_on_start;
        self
    }

    /// Replace the clock used for the next-tick timestamp
    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    /// Configured interval
    pub fn interval(&self) -> Duration {
        self.interval
    }

    /// Current state
    pub fn state(&self) -> SchedulerState {
        if self.store.is_halted() {
            SchedulerState::Halted
        } else {
            SchedulerState::Active
        }
    }

    /// Handle one tick: run the pipeline unless halted
    pub async fn tick(&self) -> TickOutcome {
        if self.store.is_halted() {
            debug!("Scheduler halted; tick ignored");
            return TickOutcome::Skipped;
        }

        let outcome = self.orchestrator.run_once().await;
        if outcome.completed {
            TickOutcome::Ran(outcome)
        } else {
            warn!(
                failed_stage = outcome.failed_stage_id.as_deref().unwrap_or_default(),
                "Scheduler halted; restart the process to resume"
            );
            TickOutcome::Halted(outcome)
        }
    }

    /// Tick until halted or until `shutdown` flips to true
    pub async fn run(&self, mut shutdown: watch::Receiver<bool>) {
        info!(interval_secs = self.interval.as_secs(), "Scheduler started");

        if self.run_on_start {
            if let TickOutcome::Halted(_) = self.tick().await {
                return;
            }
        }

        let mut next_due = Instant::now() + self.interval;

        loop {
            if self.store.is_halted() {
                break;
            }

            // Ticks that fell due while a run was in progress are dropped
            let now = Instant::now();
            if next_due <= now {
                let missed = skipped_ticks(next_due, now, self.interval);
                next_due += self.interval * missed;
                debug!(missed, "Skipped ticks that fell due during a run");
            }
            self.publish_next_tick(next_due - now);

            tokio::select! {
                _ = sleep_until(next_due) => {
                    next_due += self.interval;
                    if let TickOutcome::Halted(_) = self.tick().await {
                        break;
                    }
                }
                changed = shutdown.changed() => {
                    if changed.is_err() || *shutdown.borrow() {
                        info!("Scheduler shutting down");
                        self.store.set_next_tick(None);
                        break;
                    }
                }
            }
        }

        info!(state = ?self.state(), "Scheduler stopped");
    }

    fn publish_next_tick(&self, remaining: Duration) {
        let at = chrono::Duration::from_std(remaining)
            .ok()
            .map(|delta| self.clock.now() + delta);
        self.store.set_next_tick(at);
    }
}

/// Number of whole intervals to advance `due` so it lies strictly after `now`
fn skipped_ticks(due: Instant, now: Instant, interval: Duration) -> u32 {
    let behind = now.saturating_duration_since(due).as_nanos();
    let step = interval.as_nanos().max(1);
    u32::try_from(behind / step + 1).unwrap_or(u32::MAX)
}
