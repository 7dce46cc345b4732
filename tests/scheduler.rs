//! Scheduler Integration Tests
//!
//! Tick handling, fail-stop halting and the timer loop under paused time.

mod common;

use std::sync::Arc;
use std::time::Duration;

use stagepipe::core::{Scheduler, TickOutcome};
use stagepipe::domain::{Phase, PipelineOutcome, SchedulerState};
use tempfile::TempDir;
use tokio::sync::watch;
use tokio::time::Instant;

use common::{orchestrator, registry, FakeRenderer, ScriptedExecutor};

const TEN_MINUTES: Duration = Duration::from_secs(600);

#[tokio::test]
async fn test_three_ticks_keep_scheduler_active() {
    let temp = TempDir::new().unwrap();
    let registry = registry(&[("a", "r1")]);
    let executor = Arc::new(ScriptedExecutor::new());
    let renderer = Arc::new(FakeRenderer::new(temp.path()));
    let (store, orchestrator) = orchestrator(&registry, &executor, &renderer);
    let scheduler = Scheduler::new(orchestrator, TEN_MINUTES);

    for _ in 0..3 {
        let tick = scheduler.tick().await;
        assert_eq!(tick, TickOutcome::Ran(PipelineOutcome::completed()));
        assert_eq!(store.snapshot().state("a").unwrap().phase, Phase::Complete);
    }

    assert_eq!(scheduler.state(), SchedulerState::Active);
    assert_eq!(executor.calls(), 3);
}

#[tokio::test]
async fn test_no_runs_after_halt() {
    let temp = TempDir::new().unwrap();
    let registry = registry(&[("a", "r1"), ("b", "r2")]);
    let executor = Arc::new(ScriptedExecutor::new().failing("b", "boom"));
    let renderer = Arc::new(FakeRenderer::new(temp.path()));
    let (_store, orchestrator) = orchestrator(&registry, &executor, &renderer);
    let scheduler = Scheduler::new(orchestrator, TEN_MINUTES);

    let tick = scheduler.tick().await;
    assert_eq!(tick, TickOutcome::Halted(PipelineOutcome::failed("b")));
    assert_eq!(scheduler.state(), SchedulerState::Halted);
    assert_eq!(executor.calls(), 2);

    for _ in 0..5 {
        assert_eq!(scheduler.tick().await, TickOutcome::Skipped);
    }
    assert_eq!(executor.calls(), 2);
}

#[tokio::test(start_paused = true)]
async fn test_timer_loop_runs_once_per_interval() {
    let temp = TempDir::new().unwrap();
    let registry = registry(&[("a", "r1")]);
    let executor = Arc::new(ScriptedExecutor::new());
    let renderer = Arc::new(FakeRenderer::new(temp.path()));
    let (store, orchestrator) = orchestrator(&registry, &executor, &renderer);
    let scheduler = Arc::new(Scheduler::new(orchestrator, TEN_MINUTES));

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let task = {
        let scheduler = Arc::clone(&scheduler);
        tokio::spawn(async move { scheduler.run(shutdown_rx).await })
    };

    // Nothing runs before the first interval elapses
    tokio::time::sleep(Duration::from_secs(599)).await;
    assert_eq!(executor.calls(), 0);
    assert!(store.snapshot().pipeline.next_scheduled_at.is_some());

    tokio::time::sleep(Duration::from_secs(1202)).await;
    assert_eq!(executor.calls(), 3);
    assert_eq!(scheduler.state(), SchedulerState::Active);

    shutdown_tx.send(true).unwrap();
    task.await.unwrap();
    assert!(store.snapshot().pipeline.next_scheduled_at.is_none());
}

#[tokio::test(start_paused = true)]
async fn test_timer_loop_stops_after_failure() {
    let temp = TempDir::new().unwrap();
    let registry = registry(&[("a", "r1")]);
    let executor = Arc::new(ScriptedExecutor::new().failing("a", "boom"));
    let renderer = Arc::new(FakeRenderer::new(temp.path()));
    let (store, orchestrator) = orchestrator(&registry, &executor, &renderer);
    let scheduler = Arc::new(Scheduler::new(orchestrator, TEN_MINUTES));

    let (_shutdown_tx, shutdown_rx) = watch::channel(false);
    let task = {
        let scheduler = Arc::clone(&scheduler);
        tokio::spawn(async move { scheduler.run(shutdown_rx).await })
    };

    // The loop exits on its own once halted
    task.await.unwrap();
    assert_eq!(executor.calls(), 1);

    tokio::time::sleep(TEN_MINUTES * 10).await;
    assert_eq!(executor.calls(), 1);

    let snapshot = store.snapshot();
    assert_eq!(snapshot.scheduler_state(), SchedulerState::Halted);
    assert!(snapshot.pipeline.next_scheduled_at.is_none());
}

#[tokio::test(start_paused = true)]
async fn test_run_on_start_runs_immediately() {
    let temp = TempDir::new().unwrap();
    let registry = registry(&[("a", "r1")]);
    let executor = Arc::new(ScriptedExecutor::new());
    let renderer = Arc::new(FakeRenderer::new(temp.path()));
    let (_store, orchestrator) = orchestrator(&registry, &executor, &renderer);
    let scheduler =
        Arc::new(Scheduler::new(orchestrator, TEN_MINUTES).with_run_on_start(true));

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let task = {
        let scheduler = Arc::clone(&scheduler);
        tokio::spawn(async move { scheduler.run(shutdown_rx).await })
    };

    tokio::time::sleep(Duration::from_secs(1)).await;
    assert_eq!(executor.calls(), 1);

    tokio::time::sleep(TEN_MINUTES).await;
    assert_eq!(executor.calls(), 2);

    shutdown_tx.send(true).unwrap();
    task.await.unwrap();
}

#[tokio::test(start_paused = true)]
async fn test_long_run_skips_missed_ticks() {
    let temp = TempDir::new().unwrap();
    let registry = registry(&[("a", "r1")]);
    let executor = Arc::new(ScriptedExecutor::new().with_delay(Duration::from_secs(25 * 60)));
    let renderer = Arc::new(FakeRenderer::new(temp.path()));
    let (store, orchestrator) = orchestrator(&registry, &executor, &renderer);
    let scheduler = Arc::new(Scheduler::new(orchestrator, TEN_MINUTES));

    let start = Instant::now();
    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let task = {
        let scheduler = Arc::clone(&scheduler);
        tokio::spawn(async move { scheduler.run(shutdown_rx).await })
    };

    // First run spans 600s..2100s; the ticks at 1200s and 1800s are dropped
    tokio::time::sleep(Duration::from_secs(2101)).await;
    assert_eq!(executor.calls(), 1);

    let snapshot = store.snapshot();
    assert!(snapshot.running_stage().is_none());
    let next = snapshot.pipeline.next_scheduled_at.unwrap();
    let remaining = (next - chrono::Utc::now()).num_seconds();
    assert!((290..=300).contains(&remaining), "next tick in {}s", remaining);

    tokio::time::sleep(Duration::from_secs(2100)).await;
    let offsets: Vec<u64> = executor
        .started()
        .iter()
        .map(|at| at.duration_since(start).as_secs())
        .collect();
    assert_eq!(offsets, vec![600, 2400, 4200]);

    shutdown_tx.send(true).unwrap();
    task.await.unwrap();
}
