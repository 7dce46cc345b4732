//! Concurrency-safe status store.
//!
//! The only mutable state shared between the scheduler and the HTTP
//! server. A single readers-writer lock guards the whole map, so a
//! snapshot never observes a stage mid-transition.

use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::{RwLock, RwLockReadGuard, RwLockWriteGuard, PoisonError};

use chrono::{DateTime, Utc};
use serde::Serialize;
use tracing::{debug, warn};
use uuid::Uuid;

use crate::domain::{Outcome, Phase, PipelineRunStatus, RunState, SchedulerState};

use super::registry::StageRegistry;

/// Point-in-time status of one stage
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct StageSnapshot {
    /// Stage id
    pub id: String,

    /// HTTP route, if the stage is served
    pub route: Option<String>,

    /// Latest run state
    pub state: RunState,

    /// Most recent rendered report written in this process
    #[serde(skip)]
    pub rendered: Option<PathBuf>,
}

/// Consistent copy of all stage states plus pipeline status
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct StatusSnapshot {
    /// Stages in registry order
    pub stages: Vec<StageSnapshot>,

    /// Process-wide status
    pub pipeline: PipelineRunStatus,
}

impl StatusSnapshot {
    /// Look up a stage by id
    pub fn stage(&self, id: &str) -> Option<&StageSnapshot> {
        self.stages.iter().find(|s| s.id == id)
    }

    /// Run state of a stage by id
    pub fn state(&self, id: &str) -> Option<&RunState> {
        self.stage(id).map(|s| &s.state)
    }

    /// Scheduler state derived from the halt flag
    pub fn scheduler_state(&self) -> SchedulerState {
        self.pipeline.scheduler_state()
    }

    /// Stage currently running, if any
    pub fn running_stage(&self) -> Option<&StageSnapshot> {
        self.stages.iter().find(|s| s.state.phase == Phase::Running)
    }
}

#[derive(Debug)]
struct StageEntry {
    id: String,
    route: Option<String>,
    state: RunState,
    rendered: Option<PathBuf>,
}

#[derive(Debug)]
struct Inner {
    stages: Vec<StageEntry>,
    index: HashMap<String, usize>,
    pipeline: PipelineRunStatus,
}

impl Inner {
    fn entry_mut(&mut self, stage_id: &str) -> Option<&mut StageEntry> {
        match self.index.get(stage_id) {
            Some(&idx) => self.stages.get_mut(idx),
            None => {
                warn!(stage = %stage_id, "Status update for unknown stage ignored");
                None
            }
        }
    }
}

/// Shared stage-status map
#[derive(Debug)]
pub struct StatusStore {
    inner: RwLock<Inner>,
}

impl StatusStore {
    /// Create a store with every registered stage `Pending`
    pub fn new(registry: &StageRegistry) -> Self {
        let stages: Vec<StageEntry> = registry
            .stages()
            .iter()
            .map(|stage| StageEntry {
                id: stage.id.clone(),
                route: stage.route.clone(),
                state: RunState::pending(),
                rendered: None,
            })
            .collect();

        let index = stages
            .iter()
            .enumerate()
            .map(|(idx, entry)| (entry.id.clone(), idx))
            .collect();

        Self {
            inner: RwLock::new(Inner {
                stages,
                index,
                pipeline: PipelineRunStatus::default(),
            }),
        }
    }

    fn read(&self) -> RwLockReadGuard<'_, Inner> {
        self.inner.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write(&self) -> RwLockWriteGuard<'_, Inner> {
        self.inner.write().unwrap_or_else(PoisonError::into_inner)
    }

    /// Start a new run: every stage goes back to `Pending`
    pub fn begin_run(&self, run_id: Uuid, at: DateTime<Utc>) {
        let mut inner = self.write();
        for entry in inner.stages.iter_mut() {
            entry.state = RunState::pending();
        }
        inner.pipeline.last_run_id = Some(run_id);
        inner.pipeline.last_run_started_at = Some(at);
        inner.pipeline.last_run_finished_at = None;
        inner.pipeline.runs_started += 1;
        debug!(%run_id, "Run state reset");
    }

    /// Mark a stage as dispatched
    pub fn mark_running(&self, stage_id: &str, at: DateTime<Utc>) {
        let mut inner = self.write();
        if let Some(entry) = inner.entry_mut(stage_id) {
            entry.state.start(at);
        }
    }

    /// Record a stage's terminal phase
    pub fn mark_result(&self, stage_id: &str, outcome: &Outcome, at: DateTime<Utc>) {
        let mut inner = self.write();
        if let Some(entry) = inner.entry_mut(stage_id) {
            entry.state.finish(outcome, at);
        }
    }

    /// Remember where a stage's latest rendered report lives
    pub fn record_rendered(&self, stage_id: &str, path: PathBuf) {
        let mut inner = self.write();
        if let Some(entry) = inner.entry_mut(stage_id) {
            entry.rendered = Some(path);
        }
    }

    /// Close the current run
    pub fn finish_run(&self, at: DateTime<Utc>) {
        self.write().pipeline.last_run_finished_at = Some(at);
    }

    /// Permanently halt the pipeline. Only the first call has any effect.
    pub fn mark_halted(&self, stage_id: &str, at: DateTime<Utc>) -> bool {
        let mut inner = self.write();
        if inner.pipeline.halted_permanently {
            return false;
        }
        inner.pipeline.halted_permanently = true;
        inner.pipeline.failed_stage = Some(stage_id.to_string());
        inner.pipeline.halted_at = Some(at);
        inner.pipeline.next_scheduled_at = None;
        true
    }

    /// Record the next scheduled tick; ignored once halted
    pub fn set_next_tick(&self, at: Option<DateTime<Utc>>) {
        let mut inner = self.write();
        if inner.pipeline.halted_permanently {
            inner.pipeline.next_scheduled_at = None;
        } else {
            inner.pipeline.next_scheduled_at = at;
        }
    }

    /// Check the halt flag
    pub fn is_halted(&self) -> bool {
        self.read().pipeline.halted_permanently
    }

    /// Consistent copy of the current state
    pub fn snapshot(&self) -> StatusSnapshot {
        let inner = self.read();
        StatusSnapshot {
            stages: inner
                .stages
                .iter()
                .map(|entry| StageSnapshot {
                    id: entry.id.clone(),
                    route: entry.route.clone(),
                    state: entry.state.clone(),
                    rendered: entry.rendered.clone(),
                })
                .collect(),
            pipeline: inner.pipeline.clone(),
        }
    }
}
