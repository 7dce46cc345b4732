//! Per-stage run state and process-wide pipeline status.
//!
//! Only the latest run is kept: every new run resets all stages to
//! `Pending` before the first stage is dispatched.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::artifact::Outcome;

/// Fallback detail recorded when an executor reports failure without one
pub const UNKNOWN_FAILURE_DETAIL: &str = "stage failed without reporting an error detail";

/// Phase of a single stage within the latest run
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Phase {
    /// Not reached in the latest run (or never run)
    #[default]
    Pending,

    /// Currently executing
    Running,

    /// Finished successfully
    Complete,

    /// Finished with a failure
    Errored,
}

impl Phase {
    /// Check if the phase is terminal for the run
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Complete | Self::Errored)
    }

    /// Short lowercase label used in HTML output
    pub fn label(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Running => "running",
            Self::Complete => "complete",
            Self::Errored => "errored",
        }
    }
}

/// Latest run state of one stage
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunState {
    /// Current phase
    pub phase: Phase,

    /// When the stage was dispatched
    pub started_at: Option<DateTime<Utc>>,

    /// When the stage reached a terminal phase
    pub finished_at: Option<DateTime<Utc>>,

    /// Failure detail; present exactly when `phase == Errored`
    pub error_detail: Option<String>,
}

impl RunState {
    /// Fresh state for a stage that has not been reached
    pub fn pending() -> Self {
        Self::default()
    }

    /// Transition to `Running`
    pub fn start(&mut self, at: DateTime<Utc>) {
        self.phase = Phase::Running;
        self.started_at = Some(at);
        self.finished_at = None;
        self.error_detail = None;
    }

    /// Transition to a terminal phase based on the executor outcome
    pub fn finish(&mut self, outcome: &Outcome, at: DateTime<Utc>) {
        self.finished_at = Some(at);

        if outcome.success {
            self.phase = Phase::Complete;
            self.error_detail = None;
        } else {
            self.phase = Phase::Errored;
            self.error_detail = Some(
                outcome
                    .error_detail
                    .as_deref()
                    .map(str::trim)
                    .filter(|detail| !detail.is_empty())
                    .unwrap_or(UNKNOWN_FAILURE_DETAIL)
                    .to_string(),
            );
        }
    }

    /// Duration of the stage in milliseconds, if it has finished
    pub fn duration_ms(&self) -> Option<i64> {
        match (self.started_at, self.finished_at) {
            (Some(start), Some(end)) => Some((end - start).num_milliseconds()),
            _ => None,
        }
    }
}

/// Whether periodic triggering is still active
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SchedulerState {
    /// Ticks keep invoking runs
    Active,

    /// A stage failed; no further runs until process restart
    Halted,
}

/// Process-wide pipeline status
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PipelineRunStatus {
    /// Set once on the first stage failure, never cleared
    pub halted_permanently: bool,

    /// Wall-clock time of the next scheduled tick (absent once halted)
    pub next_scheduled_at: Option<DateTime<Utc>>,

    /// Stage whose failure halted the pipeline
    pub failed_stage: Option<String>,

    /// When the halt happened
    pub halted_at: Option<DateTime<Utc>>,

    /// Identifier of the most recent run
    pub last_run_id: Option<Uuid>,

    /// When the most recent run started
    pub last_run_started_at: Option<DateTime<Utc>>,

    /// When the most recent run finished (successfully or not)
    pub last_run_finished_at: Option<DateTime<Utc>>,

    /// Number of runs started in this process
    pub runs_started: u64,
}

impl PipelineRunStatus {
    /// Scheduler state as seen by readers
    pub fn scheduler_state(&self) -> SchedulerState {
        if self.halted_permanently {
            SchedulerState::Halted
        } else {
            SchedulerState::Active
        }
    }
}

/// Result of one orchestrator pass over the registry
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PipelineOutcome {
    /// Every stage succeeded
    pub completed: bool,

    /// First stage that failed, if any
    pub failed_stage_id: Option<String>,
}

impl PipelineOutcome {
    /// All stages completed
    pub fn completed() -> Self {
        Self {
            completed: true,
            failed_stage_id: None,
        }
    }

    /// The run stopped at `stage_id`
    pub fn failed(stage_id: impl Into<String>) -> Self {
        Self {
            completed: false,
            failed_stage_id: Some(stage_id.into()),
        }
    }
}
