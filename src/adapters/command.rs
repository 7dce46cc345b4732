//! Subprocess executor.
//!
//! Runs one configured program per stage (papermill by default) with
//! templated arguments, capturing its output as the stage log.

use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::time::Duration;

use async_trait::async_trait;
use thiserror::Error;
use tokio::process::Command;
use tokio::time::timeout;
use tracing::{debug, error, info, instrument};

use crate::core::registry::{ConfigError, StageRegistry};
use crate::domain::{ArtifactRef, Outcome};

use super::Executor;

/// Longest stderr excerpt carried in an error detail
const DETAIL_TAIL_CHARS: usize = 2000;

/// Errors from running a stage subprocess
#[derive(Debug, Error)]
pub enum StageExecutionError {
    #[error("Failed to spawn '{program}': {source}")]
    Spawn {
        program: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Stage '{stage}' timed out after {after:?}")]
    Timeout { stage: String, after: Duration },

    #[error("Stage '{stage}' exited with code {code}: {stderr}")]
    Failed {
        stage: String,
        code: i32,
        stderr: String,
        log: String,
    },

    #[error("Failed to wait for stage '{stage}': {source}")]
    Wait {
        stage: String,
        #[source]
        source: std::io::Error,
    },
}

impl StageExecutionError {
    /// Output captured before the failure, if any
    pub fn captured_log(&self) -> &str {
        match self {
            Self::Failed { log, .. } => log,
            _ => "",
        }
    }
}

/// Values substituted into command templates
#[derive(Debug, Clone)]
pub struct TemplateVars {
    pub stage: String,
    pub work_dir: PathBuf,
    pub notebooks: PathBuf,
    pub reports: PathBuf,
    pub input: Option<PathBuf>,
    pub output: Option<PathBuf>,
}

impl TemplateVars {
    /// Replace `{stage}`, `{work_dir}`, `{notebooks}`, `{reports}`,
    /// `{input}` and `{output}` in `template`
    pub fn expand(&self, template: &str) -> String {
        let mut expanded = template
            .replace("{stage}", &self.stage)
            .replace("{work_dir}", &self.work_dir.to_string_lossy())
            .replace("{notebooks}", &self.notebooks.to_string_lossy())
            .replace("{reports}", &self.reports.to_string_lossy());

        if let Some(ref input) = self.input {
            expanded = expanded.replace("{input}", &input.to_string_lossy());
        }
        if let Some(ref output) = self.output {
            expanded = expanded.replace("{output}", &output.to_string_lossy());
        }

        expanded
    }

    /// Expand a template into a path
    pub fn expand_path(&self, template: &str) -> PathBuf {
        PathBuf::from(self.expand(template))
    }
}

/// A program plus argument templates
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandSpec {
    pub program: String,
    pub args: Vec<String>,
}

impl CommandSpec {
    pub fn new(program: impl Into<String>, args: Vec<String>) -> Self {
        Self {
            program: program.into(),
            args,
        }
    }

    /// Build the tokio command with expanded arguments
    pub fn command(&self, vars: &TemplateVars, cwd: &Path) -> Command {
        let mut cmd = Command::new(vars.expand(&self.program));
        cmd.args(self.args.iter().map(|arg| vars.expand(arg)))
            .current_dir(cwd)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);
        cmd
    }
}

/// Run a prepared command to completion, optionally bounded by a timeout
pub(crate) async fn run_command(
    spec: &CommandSpec,
    vars: &TemplateVars,
    cwd: &Path,
    limit: Option<Duration>,
) -> Result<String, StageExecutionError> {
    let child = spec
        .command(vars, cwd)
        .spawn()
        .map_err(|source| StageExecutionError::Spawn {
            program: spec.program.clone(),
            source,
        })?;

    // Dropping the wait future on timeout kills the child (kill_on_drop)
    let waited = match limit {
        Some(limit) => timeout(limit, child.wait_with_output())
            .await
            .map_err(|_| StageExecutionError::Timeout {
                stage: vars.stage.clone(),
                after: limit,
            })?,
        None => child.wait_with_output().await,
    };

    let output = waited.map_err(|source| StageExecutionError::Wait {
        stage: vars.stage.clone(),
        source,
    })?;

    let stdout = String::from_utf8_lossy(&output.stdout);
    let stderr = String::from_utf8_lossy(&output.stderr);
    let log = combine_log(&stdout, &stderr);

    if !output.status.success() {
        return Err(StageExecutionError::Failed {
            stage: vars.stage.clone(),
            code: output.status.code().unwrap_or(-1),
            stderr: tail(stderr.trim(), DETAIL_TAIL_CHARS).to_string(),
            log,
        });
    }

    Ok(log)
}

fn combine_log(stdout: &str, stderr: &str) -> String {
    match (stdout.trim().is_empty(), stderr.trim().is_empty()) {
        (true, true) => String::new(),
        (false, true) => stdout.to_string(),
        (true, false) => stderr.to_string(),
        (false, false) => format!("{}\n--- stderr ---\n{}", stdout, stderr),
    }
}

fn tail(text: &str, max_chars: usize) -> &str {
    let count = text.chars().count();
    if count <= max_chars {
        return text;
    }
    let skip = count - max_chars;
    match text.char_indices().nth(skip) {
        Some((idx, _)) => &text[idx..],
        None => text,
    }
}

/// Executor that runs a subprocess per stage
#[derive(Debug, Clone)]
pub struct CommandExecutor {
    spec: CommandSpec,
    work_dir: PathBuf,
    notebooks_dir: PathBuf,
    reports_dir: PathBuf,
    /// Template of the file that must exist for a stage to be runnable
    target: Option<String>,
    /// Template of the raw artifact the command writes
    output: Option<String>,
    timeout: Option<Duration>,
}

impl CommandExecutor {
    /// Create an executor for `spec`, resolving templates against the given directories
    pub fn new(
        spec: CommandSpec,
        work_dir: impl Into<PathBuf>,
        notebooks_dir: impl Into<PathBuf>,
        reports_dir: impl Into<PathBuf>,
    ) -> Self {
        Self {
            spec,
            work_dir: work_dir.into(),
            notebooks_dir: notebooks_dir.into(),
            reports_dir: reports_dir.into(),
            target: None,
            output: None,
            timeout: None,
        }
    }

    /// Require `template` to exist for every stage
    pub fn with_target(mut self, template: impl Into<String>) -> Self {
        self.target = Some(template.into());
        self
    }

    /// Record `template` as the raw artifact location
    pub fn with_output(mut self, template: impl Into<String>) -> Self {
        self.output = Some(template.into());
        self
    }

    /// Kill the subprocess after `limit`
    pub fn with_timeout(mut self, limit: Option<Duration>) -> Self {
        self.timeout = limit;
        self
    }

    fn vars(&self, stage_id: &str) -> TemplateVars {
        TemplateVars {
            stage: stage_id.to_string(),
            work_dir: self.work_dir.clone(),
            notebooks: self.notebooks_dir.clone(),
            reports: self.reports_dir.clone(),
            input: None,
            output: None,
        }
    }

    /// Path the stage's target resolves to, if a target is configured
    pub fn target_path(&self, stage_id: &str) -> Option<PathBuf> {
        let vars = self.vars(stage_id);
        self.target.as_deref().map(|t| vars.expand_path(t))
    }
}

#[async_trait]
impl Executor for CommandExecutor {
    fn name(&self) -> &str {
        "command"
    }

    #[instrument(skip(self), fields(program = %self.spec.program))]
    async fn execute(&self, stage_id: &str) -> Outcome {
        let vars = self.vars(stage_id);
        let artifact = match self.output {
            Some(ref template) => ArtifactRef::at_path(stage_id, vars.expand_path(template)),
            None => ArtifactRef::empty(stage_id),
        };

        // A failed run must not leave the previous run's output behind
        if let Some(ref path) = artifact.path {
            match tokio::fs::remove_file(path).await {
                Ok(()) => debug!(path = %path.display(), "Removed previous stage output"),
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
                Err(e) => {
                    error!(stage = %stage_id, path = %path.display(), error = %e, "Cannot clear stage output");
                    let detail = format!(
                        "Failed to remove previous output {}: {}",
                        path.display(),
                        e
                    );
                    return Outcome::failure(artifact, detail);
                }
            }
        }

        debug!(artifact = ?artifact.path, "Spawning stage command");

        match run_command(&self.spec, &vars, &self.work_dir, self.timeout).await {
            Ok(log) => {
                info!(stage = %stage_id, "Stage executed successfully");
                Outcome::success(artifact.with_log(log))
            }
            Err(e) => {
                error!(stage = %stage_id, error = %e, "Stage execution failed");
                let log = e.captured_log().to_string();
                Outcome::failure(artifact.with_log(log), e.to_string())
            }
        }
    }

    fn verify(&self, registry: &StageRegistry) -> Result<(), ConfigError> {
        for stage in registry.stages() {
            if let Some(path) = self.target_path(&stage.id) {
                if !path.exists() {
                    return Err(ConfigError::MissingTarget {
                        stage: stage.id.clone(),
                        path,
                    });
                }
            }
        }
        Ok(())
    }
}
