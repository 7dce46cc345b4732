//! Configuration for stagepipe.
//!
//! Configuration sources (highest priority first):
//! 1. CLI flags / environment variables (STAGEPIPE_*), via `ConfigOverrides`
//! 2. Config file (explicit path, or .stagepipe/config.yaml discovered upward)
//! 3. Defaults (work dir = current directory, data/ underneath)
//!
//! Paths in the config file are relative to the project root, the parent
//! of the `.stagepipe/` directory (or the file's own directory when given
//! explicitly).

use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Context, Result};
use serde::Deserialize;

use crate::adapters::{CommandExecutor, CommandSpec, HtmlRenderer};
use crate::core::registry::{ConfigError, StageRegistry};
use crate::domain::Stage;

const DEFAULT_INTERVAL_MINUTES: u64 = 10;
/// One year
pub const MAX_INTERVAL_MINUTES: u64 = 365 * 24 * 60;
const DEFAULT_HOST: &str = "0.0.0.0";
const DEFAULT_PORT: u16 = 8088;
const DEFAULT_EXECUTOR: &str = "papermill";

/// Raw config file schema (matches YAML structure)
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct ConfigFile {
    pub version: Option<String>,
    pub schedule: ScheduleConfig,
    pub server: ServerConfig,
    pub paths: PathsConfig,
    pub executor: ExecutorConfig,
    pub renderer: RendererConfig,
    pub logging: LoggingConfig,
    pub stages: Vec<Stage>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct ScheduleConfig {
    pub interval_minutes: Option<u64>,
    pub run_on_start: Option<bool>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct ServerConfig {
    pub host: Option<String>,
    pub port: Option<u16>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct PathsConfig {
    /// Working directory (relative to the project root)
    pub work_dir: Option<String>,
    /// Stage sources (relative to the work dir)
    pub notebooks: Option<String>,
    /// Raw and rendered artifacts (relative to the work dir)
    pub reports: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct ExecutorConfig {
    pub program: Option<String>,
    pub args: Option<Vec<String>>,
    pub target: Option<String>,
    pub output: Option<String>,
    pub timeout_seconds: Option<u64>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct RendererConfig {
    pub program: Option<String>,
    #[serde(default)]
    pub args: Vec<String>,
    pub timeout_seconds: Option<u64>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct LoggingConfig {
    #[serde(default)]
    pub file: bool,
}

/// Values that take precedence over the config file
#[derive(Debug, Clone, Default)]
pub struct ConfigOverrides {
    pub config_file: Option<PathBuf>,
    pub work_dir: Option<PathBuf>,
    pub interval_minutes: Option<u64>,
    pub host: Option<String>,
    pub port: Option<u16>,
    /// Compact `id:route,id:route` stage list
    pub stages: Option<String>,
    pub run_on_start: bool,
    pub log_file: bool,
}

/// Subprocess executor settings
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExecutorSettings {
    pub command: CommandSpec,
    pub target: Option<String>,
    pub output: Option<String>,
    pub timeout: Option<Duration>,
}

impl Default for ExecutorSettings {
    fn default() -> Self {
        Self {
            command: CommandSpec::new(
                DEFAULT_EXECUTOR,
                vec![
                    "{notebooks}/{stage}.ipynb".to_string(),
                    "{reports}/{stage}.ipynb".to_string(),
                    "--log-output".to_string(),
                    "--cwd".to_string(),
                    "{notebooks}".to_string(),
                ],
            ),
            target: Some("{notebooks}/{stage}.ipynb".to_string()),
            output: Some("{reports}/{stage}.ipynb".to_string()),
            timeout: None,
        }
    }
}

/// Renderer settings; no converter means the built-in HTML page
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RendererSettings {
    pub converter: Option<CommandSpec>,
    pub timeout: Option<Duration>,
}

/// Resolved configuration with absolute paths
#[derive(Debug, Clone)]
pub struct ResolvedConfig {
    /// Path to config file (if found)
    pub config_file: Option<PathBuf>,
    pub work_dir: PathBuf,
    pub notebooks_dir: PathBuf,
    pub reports_dir: PathBuf,
    pub interval_minutes: u64,
    pub run_on_start: bool,
    pub host: String,
    pub port: u16,
    pub stages: Vec<Stage>,
    pub executor: ExecutorSettings,
    pub renderer: RendererSettings,
    pub log_file: bool,
}

impl ResolvedConfig {
    /// Interval between scheduled runs
    pub fn interval(&self) -> Duration {
        Duration::from_secs(self.interval_minutes.saturating_mul(60))
    }

    /// Check values that would otherwise fail later
    pub fn validate(&self) -> Result<(), ConfigError> {
        if !(1..=MAX_INTERVAL_MINUTES).contains(&self.interval_minutes) {
            return Err(ConfigError::InvalidInterval {
                got: self.interval_minutes,
                max: MAX_INTERVAL_MINUTES,
            });
        }
        Ok(())
    }

    /// Build the stage registry
    pub fn registry(&self) -> Result<StageRegistry, ConfigError> {
        StageRegistry::new(self.stages.clone())
    }

    /// Build the subprocess executor
    pub fn executor(&self) -> CommandExecutor {
        let mut executor = CommandExecutor::new(
            self.executor.command.clone(),
            &self.work_dir,
            &self.notebooks_dir,
            &self.reports_dir,
        )
        .with_timeout(self.executor.timeout);

        if let Some(ref target) = self.executor.target {
            executor = executor.with_target(target.clone());
        }
        if let Some(ref output) = self.executor.output {
            executor = executor.with_output(output.clone());
        }
        executor
    }

    /// Build the HTML renderer
    pub fn renderer(&self) -> HtmlRenderer {
        let renderer = HtmlRenderer::new(&self.reports_dir).with_timeout(self.renderer.timeout);
        match self.renderer.converter {
            Some(ref converter) => {
                renderer.with_converter(converter.clone(), &self.work_dir, &self.notebooks_dir)
            }
            None => renderer,
        }
    }

    /// Create the output directories
    pub fn ensure_dirs(&self) -> Result<()> {
        std::fs::create_dir_all(&self.reports_dir).with_context(|| {
            format!("Failed to create reports directory: {}", self.reports_dir.display())
        })
    }

    /// Directory for rolling log files
    pub fn log_dir(&self) -> PathBuf {
        self.work_dir.join("logs")
    }
}

/// Find config file by searching current directory and parents
fn find_config_file(start: &Path) -> Option<PathBuf> {
    let mut current = start.to_path_buf();

    loop {
        let config_path = current.join(".stagepipe").join("config.yaml");
        if config_path.exists() {
            return Some(config_path);
        }

        if !current.pop() {
            break;
        }
    }

    None
}

/// Load and parse config file
pub fn load_config_file(path: &Path) -> Result<ConfigFile> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file: {}", path.display()))?;

    serde_yaml::from_str(&content)
        .with_context(|| format!("Failed to parse config file: {}", path.display()))
}

/// Resolve a path that may be relative to `base`
fn resolve_path(base: &Path, path_str: &str) -> PathBuf {
    let path = PathBuf::from(path_str);
    if path.is_absolute() {
        path
    } else {
        base.join(path)
    }
}

/// Project root for a config file: the parent of `.stagepipe/`, or the
/// file's own directory otherwise
fn project_root(config_path: &Path) -> PathBuf {
    let parent = config_path.parent().unwrap_or(Path::new("."));
    if parent.file_name().map(|n| n == ".stagepipe").unwrap_or(false) {
        parent.parent().unwrap_or(Path::new(".")).to_path_buf()
    } else {
        parent.to_path_buf()
    }
}

/// Parse the compact `id:route,id:route` stage list
pub fn parse_stage_list(list: &str) -> Vec<Stage> {
    list.split(',').filter_map(Stage::parse_compact).collect()
}

fn seconds(value: Option<u64>) -> Option<Duration> {
    value.filter(|s| *s > 0).map(Duration::from_secs)
}

/// Load configuration from all sources, starting discovery at the current directory
pub fn load_config(overrides: &ConfigOverrides) -> Result<ResolvedConfig> {
    let cwd = std::env::current_dir().context("Failed to determine current directory")?;
    load_config_from(&cwd, overrides)
}

/// Load configuration from all sources, starting discovery at `cwd`
pub fn load_config_from(cwd: &Path, overrides: &ConfigOverrides) -> Result<ResolvedConfig> {
    let config_file = match overrides.config_file {
        Some(ref path) => Some(resolve_path(cwd, &path.to_string_lossy())),
        None => find_config_file(cwd),
    };

    let file = match config_file {
        Some(ref path) => load_config_file(path)?,
        None => ConfigFile::default(),
    };

    let root = config_file
        .as_deref()
        .map(project_root)
        .unwrap_or_else(|| cwd.to_path_buf());

    let work_dir = match (&overrides.work_dir, &file.paths.work_dir) {
        (Some(dir), _) => resolve_path(cwd, &dir.to_string_lossy()),
        (None, Some(dir)) => resolve_path(&root, dir),
        (None, None) => root.clone(),
    };

    let notebooks_dir = resolve_path(
        &work_dir,
        file.paths.notebooks.as_deref().unwrap_or("data/notebooks"),
    );
    let reports_dir = resolve_path(
        &work_dir,
        file.paths.reports.as_deref().unwrap_or("data/reports"),
    );

    let stages = match overrides.stages {
        Some(ref list) => parse_stage_list(list),
        None => file.stages.clone(),
    };

    let defaults = ExecutorSettings::default();
    let executor = ExecutorSettings {
        command: match file.executor.program {
            Some(ref program) => {
                CommandSpec::new(program.clone(), file.executor.args.clone().unwrap_or_default())
            }
            None => match file.executor.args {
                Some(ref args) => CommandSpec::new(DEFAULT_EXECUTOR, args.clone()),
                None => defaults.command,
            },
        },
        target: file.executor.target.clone().or(defaults.target),
        output: file.executor.output.clone().or(defaults.output),
        timeout: seconds(file.executor.timeout_seconds),
    };

    let renderer = RendererSettings {
        converter: file
            .renderer
            .program
            .as_ref()
            .map(|program| CommandSpec::new(program.clone(), file.renderer.args.clone())),
        timeout: seconds(file.renderer.timeout_seconds),
    };

    let config = ResolvedConfig {
        config_file,
        work_dir,
        notebooks_dir,
        reports_dir,
        interval_minutes: overrides
            .interval_minutes
            .or(file.schedule.interval_minutes)
            .unwrap_or(DEFAULT_INTERVAL_MINUTES),
        run_on_start: overrides.run_on_start || file.schedule.run_on_start.unwrap_or(false),
        host: overrides
            .host
            .clone()
            .or(file.server.host)
            .unwrap_or_else(|| DEFAULT_HOST.to_string()),
        port: overrides.port.or(file.server.port).unwrap_or(DEFAULT_PORT),
        stages,
        executor,
        renderer,
        log_file: overrides.log_file || file.logging.file,
    };

    config.validate()?;
    Ok(config)
}
