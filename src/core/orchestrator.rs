//! Sequential stage orchestrator.
//!
//! Runs the registry's stages in order, recording each transition in the
//! status store, and stops at the first failure. A failure halts the
//! pipeline permanently.

use std::sync::Arc;
use std::time::Instant;

use tracing::{error, info, instrument, warn};
use uuid::Uuid;

use crate::adapters::{Executor, Renderer};
use crate::domain::{Outcome, PipelineOutcome, Stage};

use super::clock::{Clock, SystemClock};
use super::registry::StageRegistry;
use super::status_store::StatusStore;

/// Main pipeline orchestrator
pub struct Orchestrator {
    registry: Arc<StageRegistry>,
    store: Arc<StatusStore>,
    executor: Arc<dyn Executor>,
    renderer: Arc<dyn Renderer>,
    clock: Arc<dyn Clock>,
}

impl Orchestrator {
    /// Create a new orchestrator using the system clock
    pub fn new(
        registry: Arc<StageRegistry>,
        store: Arc<StatusStore>,
        executor: Arc<dyn Executor>,
        renderer: Arc<dyn Renderer>,
    ) -> Self {
        Self {
            registry,
            store,
            executor,
            renderer,
            clock: Arc::new(SystemClock),
        }
    }

    /// Replace the clock used for status timestamps
    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    /// The status store this orchestrator writes to
    pub fn store(&self) -> &Arc<StatusStore> {
        &self.store
    }

    /// The registry this orchestrator runs
    pub fn registry(&self) -> &Arc<StageRegistry> {
        &self.registry
    }

    /// Execute every stage once, in order, stopping at the first failure.
    ///
    /// Must not be called concurrently with itself; the scheduler is the
    /// only caller in a running service.
    #[instrument(skip(self), fields(run_id = tracing::field::Empty))]
    pub async fn run_once(&self) -> PipelineOutcome {
        if self.store.is_halted() {
            let failed = self.store.snapshot().pipeline.failed_stage.unwrap_or_default();
            warn!(failed_stage = %failed, "Pipeline is halted; run refused");
            return PipelineOutcome::failed(failed);
        }

        let run_id = Uuid::new_v4();
        tracing::Span::current().record("run_id", tracing::field::display(run_id));
        info!(stages = self.registry.len(), "Starting pipeline run");

        let run_start = Instant::now();
        self.store.begin_run(run_id, self.clock.now());

        for stage in self.registry.stages() {
            let outcome = self.run_stage(stage).await;

            if !outcome.success {
                let at = self.clock.now();
                self.store.mark_halted(&stage.id, at);
                self.store.finish_run(at);

                error!(
                    stage = %stage.id,
                    error = outcome.error_detail.as_deref().unwrap_or_default(),
                    "Stage failed; pipeline halted until restart"
                );
                return PipelineOutcome::failed(stage.id.clone());
            }
        }

        self.store.finish_run(self.clock.now());
        info!(
            duration_ms = run_start.elapsed().as_millis() as u64,
            "Pipeline run completed"
        );
        PipelineOutcome::completed()
    }

    /// Dispatch, render and record a single stage
    async fn run_stage(&self, stage: &Stage) -> Outcome {
        let stage_start = Instant::now();
        self.store.mark_running(&stage.id, self.clock.now());
        info!(stage = %stage.id, "Stage started");

        let outcome = self.executor.execute(&stage.id).await;

        // Rendering is attempted for failed stages too and never affects the outcome
        match self.renderer.render(&outcome.artifact).await {
            Ok(path) => self.store.record_rendered(&stage.id, path),
            Err(e) => {
                warn!(stage = %stage.id, renderer = self.renderer.name(), error = %e, "Rendering failed");
                if let Some(path) = e.fallback_path() {
                    self.store.record_rendered(&stage.id, path.to_path_buf());
                }
            }
        }

        self.store.mark_result(&stage.id, &outcome, self.clock.now());

        let duration_ms = stage_start.elapsed().as_millis() as u64;
        if outcome.success {
            info!(stage = %stage.id, duration_ms, "Stage completed");
        } else {
            warn!(stage = %stage.id, duration_ms, "Stage errored");
        }

        outcome
    }
}
