//! stagepipe - Scheduled halt-on-failure stage pipeline
//!
//! Runs an ordered list of stages on a fixed interval and serves live run
//! status plus each stage's rendered report over HTTP.
//!
//! # Architecture
//!
//! - The scheduler ticks on a wall-clock interval and invokes the
//!   orchestrator once per tick
//! - The orchestrator runs stages strictly in order and halts the pipeline
//!   permanently on the first failure
//! - The status store is the only shared mutable state; the HTTP server
//!   reads consistent snapshots of it
//!
//! # Modules
//!
//! - `adapters`: Stage executor and report renderer collaborators
//! - `core`: Registry, StatusStore, Orchestrator, Scheduler
//! - `domain`: Data structures (Stage, RunState, Outcome)
//! - `server`: Read-only HTTP status surface
//! - `cli`: Command-line interface
//!
//! # Usage
//!
//! ```bash
//! # Serve the pipeline, running every 10 minutes
//! STAGEPIPE_STAGES="sample_stage_1:stage1,sample_stage_2:stage2" stagepipe serve
//!
//! # Run every stage once
//! stagepipe run
//! ```

pub mod adapters;
pub mod cli;
pub mod config;
pub mod core;
pub mod domain;
pub mod logging;
pub mod server;

// Re-export main types at crate root for convenience
pub use adapters::{CommandExecutor, Executor, HtmlRenderer, Renderer};
pub use core::{ConfigError, Orchestrator, Scheduler, StageRegistry, StatusStore};
pub use domain::{ArtifactRef, Outcome, Phase, PipelineOutcome, RunState, SchedulerState, Stage};
pub use server::StatusServer;
