//! Adapter interfaces for the stage collaborators.
//!
//! The orchestrator never performs stage work itself: an `Executor` runs
//! the stage body and a `Renderer` turns the raw artifact into a report.

pub mod command;
pub mod html;

use std::path::PathBuf;

use async_trait::async_trait;

use crate::core::registry::{ConfigError, StageRegistry};
use crate::domain::{ArtifactRef, Outcome};

pub use command::{CommandExecutor, CommandSpec, StageExecutionError, TemplateVars};
pub use html::{HtmlRenderer, RenderError};

/// Runs the body of a stage
#[async_trait]
pub trait Executor: Send + Sync {
    /// Human-readable executor name
    fn name(&self) -> &str;

    /// Execute one stage. Failures are reported through the outcome,
    /// never as a panic or error.
    async fn execute(&self, stage_id: &str) -> Outcome;

    /// Check that every stage's execution target exists
    fn verify(&self, _registry: &StageRegistry) -> Result<(), ConfigError> {
        Ok(())
    }
}

/// Turns a raw artifact into a viewable report
#[async_trait]
pub trait Renderer: Send + Sync {
    /// Human-readable renderer name
    fn name(&self) -> &str;

    /// Render the artifact and return where the report was written
    async fn render(&self, artifact: &ArtifactRef) -> Result<PathBuf, RenderError>;
}
