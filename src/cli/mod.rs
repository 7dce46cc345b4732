//! Command-line interface for stagepipe.
//!
//! Provides commands for serving the scheduled pipeline, running it once,
//! and inspecting the resolved configuration.

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use tokio::sync::watch;
use tracing::{info, warn};

use crate::adapters::Executor;
use crate::config::{load_config, ConfigOverrides, ResolvedConfig};
use crate::core::{Orchestrator, Scheduler, StageRegistry, StatusStore};
use crate::domain::Phase;
use crate::logging::init_logging;
use crate::server::{shutdown_signal, StatusServer};

/// stagepipe - Scheduled halt-on-failure stage pipeline
#[derive(Parser, Debug)]
#[command(name = "stagepipe")]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    /// Config file (defaults to .stagepipe/config.yaml in this or a parent directory)
    #[arg(long, global = true, env = "STAGEPIPE_CONFIG")]
    pub config: Option<PathBuf>,

    /// Working directory for stage sources and reports
    #[arg(long, global = true, env = "STAGEPIPE_WORK_DIR")]
    pub work_dir: Option<PathBuf>,

    /// Ordered stages as `id:route,id:route` (route optional)
    #[arg(long, global = true, env = "STAGEPIPE_STAGES")]
    pub stages: Option<String>,

    /// Log filter (e.g. "info", "stagepipe=debug")
    #[arg(long, global = true)]
    pub log_level: Option<String>,

    /// Also write daily-rolling log files under <work_dir>/logs
    #[arg(long, global = true)]
    pub log_file: bool,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Run the pipeline on a schedule and serve its status over HTTP
    Serve {
        /// Minutes between scheduled runs
        #[arg(long, env = "STAGEPIPE_INTERVAL_MINUTES")]
        interval_minutes: Option<u64>,

        /// Address to bind to
        #[arg(long, env = "STAGEPIPE_HOST")]
        host: Option<String>,

        /// Port to bind to
        #[arg(long, env = "STAGEPIPE_PORT")]
        port: Option<u16>,

        /// Run the pipeline immediately instead of after the first interval
        #[arg(long)]
        run_on_start: bool,
    },

    /// Run every stage once and report the result
    Run,

    /// List the configured stages
    Stages,

    /// Show resolved configuration (debug)
    Config,
}

impl Cli {
    fn overrides(&self) -> ConfigOverrides {
        let mut overrides = ConfigOverrides {
            config_file: self.config.clone(),
            work_dir: self.work_dir.clone(),
            stages: self.stages.clone(),
            log_file: self.log_file,
            ..Default::default()
        };

        if let Commands::Serve {
            interval_minutes,
            ref host,
            port,
            run_on_start,
        } = self.command
        {
            overrides.interval_minutes = interval_minutes;
            overrides.host = host.clone();
            overrides.port = port;
            overrides.run_on_start = run_on_start;
        }

        overrides
    }

    /// Execute the CLI command
    pub async fn execute(self) -> Result<()> {
        let config = load_config(&self.overrides())?;

        let log_dir = config.log_file.then(|| config.log_dir());
        let _guard = init_logging(self.log_level.as_deref(), log_dir.as_deref())?;

        match self.command {
            Commands::Serve { .. } => serve(&config).await,
            Commands::Run => run_once(&config).await,
            Commands::Stages => list_stages(&config),
            Commands::Config => show_config(&config),
        }
    }
}

/// Registry, store and orchestrator wired from configuration
struct Pipeline {
    registry: Arc<StageRegistry>,
    store: Arc<StatusStore>,
    orchestrator: Arc<Orchestrator>,
}

fn build_pipeline(config: &ResolvedConfig) -> Result<Pipeline> {
    let registry = Arc::new(config.registry()?);

    let executor = config.executor();
    executor.verify(&registry)?;

    config.ensure_dirs()?;

    let store = Arc::new(StatusStore::new(&registry));
    let orchestrator = Arc::new(Orchestrator::new(
        Arc::clone(&registry),
        Arc::clone(&store),
        Arc::new(executor),
        Arc::new(config.renderer()),
    ));

    info!(
        stages = ?registry.ids().collect::<Vec<_>>(),
        notebooks = %config.notebooks_dir.display(),
        reports = %config.reports_dir.display(),
        "Pipeline configured"
    );

    Ok(Pipeline {
        registry,
        store,
        orchestrator,
    })
}

async fn serve(config: &ResolvedConfig) -> Result<()> {
    let pipeline = build_pipeline(config)?;

    let scheduler = Arc::new(
        Scheduler::new(Arc::clone(&pipeline.orchestrator), config.interval())
            .with_run_on_start(config.run_on_start),
    );

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let scheduler_task = {
        let scheduler = Arc::clone(&scheduler);
        tokio::spawn(async move { scheduler.run(shutdown_rx).await })
    };

    let server = StatusServer::new(
        config.host.clone(),
        config.port,
        Arc::clone(&pipeline.registry),
        Arc::clone(&pipeline.store),
    );

    let result = server
        .serve(async move {
            shutdown_signal().await;
            let _ = shutdown_tx.send(true);
        })
        .await;

    // An in-flight stage is abandoned with the process
    if !scheduler_task.is_finished() {
        warn!("Abandoning in-flight scheduler work");
        scheduler_task.abort();
    }

    result
}

async fn run_once(config: &ResolvedConfig) -> Result<()> {
    let pipeline = build_pipeline(config)?;
    let outcome = pipeline.orchestrator.run_once().await;

    let snapshot = pipeline.store.snapshot();
    println!("{:<30} {:<10} {:>10}", "STAGE", "PHASE", "MS");
    for stage in &snapshot.stages {
        let duration = stage
            .state
            .duration_ms()
            .map(|ms| ms.to_string())
            .unwrap_or_else(|| "-".to_string());
        println!("{:<30} {:<10} {:>10}", stage.id, stage.state.phase.label(), duration);

        if stage.state.phase == Phase::Errored {
            if let Some(ref detail) = stage.state.error_detail {
                println!("    {}", detail);
            }
        }
        if let Some(ref report) = stage.rendered {
            println!("    report: {}", report.display());
        }
    }

    match outcome.failed_stage_id {
        Some(stage) => anyhow::bail!("Pipeline failed at stage '{}'", stage),
        None => Ok(()),
    }
}

fn list_stages(config: &ResolvedConfig) -> Result<()> {
    let registry = config.registry().context("Invalid stage configuration")?;
    for (idx, stage) in registry.stages().iter().enumerate() {
        match stage.route {
            Some(ref route) => println!("{:>3}. {} -> /{}", idx + 1, stage.id, route),
            None => println!("{:>3}. {}", idx + 1, stage.id),
        }
    }
    Ok(())
}

fn show_config(config: &ResolvedConfig) -> Result<()> {
    println!("Configuration");
    println!("=============");
    match config.config_file {
        Some(ref path) => println!("Config file:  {}", path.display()),
        None => println!("Config file:  (none, using defaults)"),
    }
    println!("Work dir:     {}", config.work_dir.display());
    println!("Notebooks:    {}", config.notebooks_dir.display());
    println!("Reports:      {}", config.reports_dir.display());
    println!("Interval:     {} minutes", config.interval_minutes);
    println!("Run on start: {}", config.run_on_start);
    println!("Listen:       {}:{}", config.host, config.port);
    println!(
        "Executor:     {} {}",
        config.executor.command.program,
        config.executor.command.args.join(" ")
    );
    match config.renderer.converter {
        Some(ref converter) => {
            println!("Renderer:     {} {}", converter.program, converter.args.join(" "))
        }
        None => println!("Renderer:     built-in HTML"),
    }
    println!("Stages:       {}", config.stages.len());
    for stage in &config.stages {
        println!(
            "  - {}{}",
            stage.id,
            stage
                .route
                .as_ref()
                .map(|r| format!(" (/{})", r))
                .unwrap_or_default()
        );
    }
    Ok(())
}
