use std::sync::Arc;
use std::time::Duration;

use candlewatch::{
    BackoffConfig, MarketWatcher, SupervisionState, SupervisorConfig, WatchError, Watcher,
    WatcherId, WatcherStatus, WatcherTask,
};
use candlewatch_mock::{DynamicMockSource, MemoryConfigStore, MemoryStore};

use crate::helpers::{
    ExitingTask, FailingTask, IdleTask, PanickingTask, StubbornTask, eventually, params, wait_state,
};

fn watcher(task: Arc<dyn WatcherTask>, records: &Arc<MemoryConfigStore>, cfg: SupervisorConfig) -> Watcher {
    Watcher::new(Some(WatcherId::new("w1")), task, Arc::clone(records) as _, cfg)
}

#[tokio::test]
async fn gives_up_after_three_restarts_and_persists_stopped() {
    let records = Arc::new(MemoryConfigStore::new());
    let task = FailingTask::new(WatchError::data_source("mock", "exchange down"));
    let w = watcher(task.clone(), &records, SupervisorConfig::default());
    w.set_store(Arc::new(MemoryStore::new()));

    w.run().await;
    let state = wait_state(&w, |s| matches!(s, SupervisionState::GaveUp(_))).await;

    assert!(matches!(
        state,
        SupervisionState::GaveUp(WatchError::Supervision { attempts: 4, .. })
    ));
    assert_eq!(task.runs(), 4);
    assert_eq!(w.restarts(), 3);
    assert!(!w.is_active());
    let rec = records.peek(w.id()).await.expect("record persisted");
    assert_eq!(rec.status, WatcherStatus::Stopped);

    // no further runs once supervision ended
    tokio::time::sleep(Duration::from_millis(50)).await;
    assert_eq!(task.runs(), 4);
}

#[tokio::test]
async fn max_restarts_zero_gives_up_on_first_failure() {
    let records = Arc::new(MemoryConfigStore::new());
    let task = FailingTask::new(WatchError::store("write", "OHLC", "refused"));
    let cfg = SupervisorConfig {
        max_restarts: 0,
        ..SupervisorConfig::default()
    };
    let w = watcher(task.clone(), &records, cfg);
    w.set_store(Arc::new(MemoryStore::new()));

    w.run().await;
    let state = wait_state(&w, |s| matches!(s, SupervisionState::GaveUp(_))).await;

    assert!(matches!(
        state,
        SupervisionState::GaveUp(WatchError::Supervision { attempts: 1, .. })
    ));
    assert_eq!(task.runs(), 1);
}

#[tokio::test]
async fn missing_store_is_a_config_error_and_not_retried() {
    let records = Arc::new(MemoryConfigStore::new());
    let task = FailingTask::new(WatchError::data_source("mock", "unreachable"));
    let w = watcher(task.clone(), &records, SupervisorConfig::default());

    assert!(matches!(w.store(), Err(WatchError::Config(_))));
    w.run().await;
    let state = wait_state(&w, |s| matches!(s, SupervisionState::GaveUp(_))).await;

    assert!(matches!(state, SupervisionState::GaveUp(WatchError::Config(_))));
    assert_eq!(task.runs(), 0);
    assert_eq!(w.restarts(), 0);
    let rec = records.peek(w.id()).await.expect("record persisted");
    assert_eq!(rec.status, WatcherStatus::Stopped);
}

#[tokio::test]
async fn config_error_from_run_loop_is_not_retried() {
    let records = Arc::new(MemoryConfigStore::new());
    let task = FailingTask::new(WatchError::config("bad parameters"));
    let w = watcher(task.clone(), &records, SupervisorConfig::default());
    w.set_store(Arc::new(MemoryStore::new()));

    w.run().await;
    wait_state(&w, |s| matches!(s, SupervisionState::GaveUp(WatchError::Config(_)))).await;
    assert_eq!(task.runs(), 1);
}

#[tokio::test]
async fn clean_exit_leaves_watcher_inactive_and_restartable() {
    let records = Arc::new(MemoryConfigStore::new());
    let w = watcher(Arc::new(ExitingTask), &records, SupervisorConfig::default());
    w.set_store(Arc::new(MemoryStore::new()));

    w.run().await;
    wait_state(&w, |s| *s == SupervisionState::Stopped).await;

    assert!(!w.is_active());
    assert_eq!(w.restarts(), 0);
    let rec = records.peek(w.id()).await.expect("record persisted");
    assert_eq!(rec.status, WatcherStatus::Stopped);

    // a finished loop does not block the next run
    w.run().await;
    let rec = records.peek(w.id()).await.expect("record persisted");
    assert_eq!(rec.status, WatcherStatus::Running);
    wait_state(&w, |s| *s == SupervisionState::Stopped).await;
}

#[tokio::test]
async fn panicking_run_loop_gives_up() {
    let records = Arc::new(MemoryConfigStore::new());
    let w = watcher(Arc::new(PanickingTask), &records, SupervisorConfig::default());
    w.set_store(Arc::new(MemoryStore::new()));

    w.run().await;
    let state = wait_state(&w, |s| matches!(s, SupervisionState::GaveUp(_))).await;
    assert!(matches!(
        state,
        SupervisionState::GaveUp(WatchError::Supervision { attempts: 1, .. })
    ));
}

#[tokio::test]
async fn run_persists_running_and_stop_persists_stopped() {
    let records = Arc::new(MemoryConfigStore::new());
    let task = Arc::new(IdleTask::default());
    let w = watcher(task.clone(), &records, SupervisorConfig::default());
    w.set_store(Arc::new(MemoryStore::new()));

    w.run().await;
    assert_eq!(w.status(), WatcherStatus::Running);
    assert!(w.is_active());
    let rec = records.peek(w.id()).await.expect("record persisted");
    assert_eq!(rec.status, WatcherStatus::Running);
    assert_eq!(rec.kind, "MarketWatcher");
    assert_eq!(rec.identity, params().to_config(None).identity);

    eventually(|| async { task.runs() == 1 }).await;
    w.stop().await;
    assert_eq!(w.status(), WatcherStatus::Stopped);
    assert_eq!(w.supervision(), SupervisionState::Stopped);
    let rec = records.peek(w.id()).await.expect("record persisted");
    assert_eq!(rec.status, WatcherStatus::Stopped);
}

#[tokio::test]
async fn run_on_active_watcher_is_a_noop() {
    let records = Arc::new(MemoryConfigStore::new());
    let task = Arc::new(IdleTask::default());
    let w = watcher(task.clone(), &records, SupervisorConfig::default());
    w.set_store(Arc::new(MemoryStore::new()));

    w.run().await;
    eventually(|| async { task.runs() == 1 }).await;
    w.run().await;
    tokio::time::sleep(Duration::from_millis(20)).await;
    assert_eq!(task.runs(), 1);
    w.stop().await;
}

#[tokio::test]
async fn persistence_failure_does_not_prevent_start() {
    let records = Arc::new(MemoryConfigStore::new());
    records.fail_next(WatchError::persistence("record store down")).await;
    let task = Arc::new(IdleTask::default());
    let w = watcher(task.clone(), &records, SupervisorConfig::default());
    w.set_store(Arc::new(MemoryStore::new()));

    w.run().await;
    assert_eq!(w.status(), WatcherStatus::Running);
    assert!(records.peek(w.id()).await.is_none());
    eventually(|| async { task.runs() == 1 }).await;

    w.stop().await;
    let rec = records.peek(w.id()).await.expect("stop persisted");
    assert_eq!(rec.status, WatcherStatus::Stopped);
}

#[tokio::test]
async fn stop_during_backoff_ends_supervision() {
    let records = Arc::new(MemoryConfigStore::new());
    let task = FailingTask::new(WatchError::data_source("mock", "flaky"));
    let cfg = SupervisorConfig {
        restart_backoff: Some(BackoffConfig {
            min_backoff_ms: 60_000,
            max_backoff_ms: 60_000,
            factor: 1,
            jitter_percent: 0,
        }),
        ..SupervisorConfig::default()
    };
    let w = watcher(task.clone(), &records, cfg);
    w.set_store(Arc::new(MemoryStore::new()));

    w.run().await;
    wait_state(&w, |s| *s == SupervisionState::Restarting { attempt: 1 }).await;
    let rec = records.peek(w.id()).await.expect("record persisted");
    assert_eq!(rec.status, WatcherStatus::Stopped);

    let started = std::time::Instant::now();
    w.stop().await;
    assert!(started.elapsed() < Duration::from_secs(1));
    assert_eq!(task.runs(), 1);
    assert_eq!(w.supervision(), SupervisionState::Stopped);
}

#[tokio::test]
async fn stubborn_run_loop_is_aborted_after_grace() {
    let records = Arc::new(MemoryConfigStore::new());
    let cfg = SupervisorConfig {
        stop_grace: Duration::from_millis(50),
        ..SupervisorConfig::default()
    };
    let w = watcher(Arc::new(StubbornTask), &records, cfg);
    w.set_store(Arc::new(MemoryStore::new()));

    w.run().await;
    tokio::time::timeout(Duration::from_secs(2), w.stop())
        .await
        .expect("stop returns after the grace period");
    assert!(!w.is_active());
    let rec = records.peek(w.id()).await.expect("record persisted");
    assert_eq!(rec.status, WatcherStatus::Stopped);
}

#[tokio::test]
async fn stop_interrupts_a_long_polling_sleep() {
    let (source, ctl) = DynamicMockSource::new_with_controller("mock");
    let market = MarketWatcher::new(params().refresh_interval_ms(3_600_000), source).unwrap();
    let records = Arc::new(MemoryConfigStore::new());
    let w = watcher(Arc::new(market), &records, SupervisorConfig::default());
    w.set_store(Arc::new(MemoryStore::new()));

    w.run().await;
    // backfill fetch, then the first poll
    tokio::time::timeout(Duration::from_secs(5), ctl.wait_for_candle_calls(2))
        .await
        .expect("first poll issued");

    let started = std::time::Instant::now();
    w.stop().await;
    assert!(started.elapsed() < Duration::from_secs(1));
    assert_eq!(w.supervision(), SupervisionState::Stopped);
    assert_eq!(ctl.candle_calls(), 2);
}
