//! Domain types for the stagepipe scheduler.
//!
//! This module contains the core data structures:
//! - Stage: One named unit of sequential work
//! - Run: Per-stage run state and process-wide pipeline status
//! - Artifact: Executor outcomes and raw artifact references

pub mod artifact;
pub mod run;
pub mod stage;

// Re-export commonly used types
pub use artifact::{ArtifactRef, Outcome};
pub use run::{Phase, PipelineOutcome, PipelineRunStatus, RunState, SchedulerState};
pub use stage::Stage;
