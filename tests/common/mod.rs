//! Shared fakes for integration tests.

#![allow(dead_code)]

use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::{Arc, Mutex, Once};
use std::time::Duration;

use async_trait::async_trait;
use stagepipe::adapters::{Executor, RenderError, Renderer};
use stagepipe::core::{Orchestrator, StageRegistry, StatusSnapshot, StatusStore};
use stagepipe::domain::{ArtifactRef, Outcome, Stage};
use tokio::time::Instant;
use tracing_subscriber::{fmt, EnvFilter};

static INIT: Once = Once::new();

/// Initialise tracing for tests; output only shows for failing tests.
pub fn init_tracing() {
    INIT.call_once(|| {
        let filter =
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

        fmt()
            .with_env_filter(filter)
            .with_test_writer()
            .with_target(true)
            .init();
    });
}

/// Executor that:
/// - records which stages were executed, in order
/// - fails the stages it was told to fail, succeeds otherwise
/// - optionally captures a status snapshot while each stage "runs"
/// - optionally takes `delay` (tokio time) per stage
#[derive(Default)]
pub struct ScriptedExecutor {
    failures: HashMap<String, String>,
    delay: Option<Duration>,
    started: Mutex<Vec<Instant>>,
    executed: Mutex<Vec<String>>,
    observed: Mutex<Vec<StatusSnapshot>>,
    store: Mutex<Option<Arc<StatusStore>>>,
}

impl ScriptedExecutor {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make `stage` fail with `detail`
    pub fn failing(mut self, stage: &str, detail: &str) -> Self {
        self.failures.insert(stage.to_string(), detail.to_string());
        self
    }

    /// Make every stage take `delay` to finish
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    /// Tokio instants at which each execution started
    pub fn started(&self) -> Vec<Instant> {
        self.started.lock().unwrap().clone()
    }

    /// Capture a snapshot of `store` during every execution
    pub fn observe(&self, store: Arc<StatusStore>) {
        *self.store.lock().unwrap() = Some(store);
    }

    pub fn executed(&self) -> Vec<String> {
        self.executed.lock().unwrap().clone()
    }

    pub fn calls(&self) -> usize {
        self.executed.lock().unwrap().len()
    }

    pub fn observed(&self) -> Vec<StatusSnapshot> {
        self.observed.lock().unwrap().clone()
    }
}

#[async_trait]
impl Executor for ScriptedExecutor {
    fn name(&self) -> &str {
        "scripted"
    }

    async fn execute(&self, stage_id: &str) -> Outcome {
        self.executed.lock().unwrap().push(stage_id.to_string());
        self.started.lock().unwrap().push(Instant::now());

        let store = self.store.lock().unwrap().clone();
        if let Some(store) = store {
            self.observed.lock().unwrap().push(store.snapshot());
        }

        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }

        let artifact = ArtifactRef::empty(stage_id).with_log(format!("ran {}", stage_id));
        match self.failures.get(stage_id) {
            Some(detail) => Outcome::failure(artifact, detail.clone()),
            None => Outcome::success(artifact),
        }
    }
}

/// Renderer writing a small HTML file per stage, or failing on demand
pub struct FakeRenderer {
    dir: PathBuf,
    fail: bool,
    rendered: Mutex<Vec<ArtifactRef>>,
}

impl FakeRenderer {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self {
            dir: dir.into(),
            fail: false,
            rendered: Mutex::new(Vec::new()),
        }
    }

    /// Renderer whose every call fails without writing anything
    pub fn broken(dir: impl Into<PathBuf>) -> Self {
        Self {
            fail: true,
            ..Self::new(dir)
        }
    }

    /// Stages the renderer was asked to render, in order
    pub fn rendered(&self) -> Vec<String> {
        self.rendered
            .lock()
            .unwrap()
            .iter()
            .map(|a| a.stage_id.clone())
            .collect()
    }
}

#[async_trait]
impl Renderer for FakeRenderer {
    fn name(&self) -> &str {
        "fake"
    }

    async fn render(&self, artifact: &ArtifactRef) -> Result<PathBuf, RenderError> {
        self.rendered.lock().unwrap().push(artifact.clone());

        if self.fail {
            return Err(RenderError::NoArtifact(artifact.stage_id.clone()));
        }

        let path = self.dir.join(format!("{}.html", artifact.stage_id));
        std::fs::write(
            &path,
            format!("<html><body>report {}</body></html>", artifact.stage_id),
        )?;
        Ok(path)
    }
}

/// Registry from `(id, route)` pairs
pub fn registry(stages: &[(&str, &str)]) -> Arc<StageRegistry> {
    Arc::new(
        StageRegistry::new(
            stages
                .iter()
                .map(|(id, route)| Stage::new(*id, *route))
                .collect(),
        )
        .unwrap(),
    )
}

/// Wire registry, store, executor and renderer into an orchestrator
pub fn orchestrator(
    registry: &Arc<StageRegistry>,
    executor: &Arc<ScriptedExecutor>,
    renderer: &Arc<FakeRenderer>,
) -> (Arc<StatusStore>, Arc<Orchestrator>) {
    let store = Arc::new(StatusStore::new(registry));
    let orchestrator = Orchestrator::new(
        Arc::clone(registry),
        Arc::clone(&store),
        Arc::clone(executor) as Arc<dyn Executor>,
        Arc::clone(renderer) as Arc<dyn Renderer>,
    );
    (store, Arc::new(orchestrator))
}
