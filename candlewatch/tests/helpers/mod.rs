// Shared fixtures for the watcher tests.
#![allow(dead_code)]

use std::sync::Arc;
use std::sync::atomic::{AtomicU32, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use candlewatch::{
    Candle, Candlewatch, MarketDataSource, MarketTags, MarketWatcherParams, SupervisionState, WatchError, Watcher,
    WatcherConfig, WatcherContext, WatcherId, WatcherKind, WatcherRecord, WatcherStatus,
    WatcherTask,
};
use candlewatch_mock::{MemoryConfigStore, MemoryStore, SyntheticSource};
use chrono::{DateTime, TimeZone, Utc};

/// Fixed reference instant, minute-aligned.
pub fn t0() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2024, 3, 1, 0, 0, 0).unwrap()
}

/// `t0() + m` minutes.
pub fn minute(m: i64) -> DateTime<Utc> {
    t0() + chrono::Duration::minutes(m)
}

pub fn candle(time: DateTime<Utc>) -> Candle {
    Candle {
        time,
        open: 1.0,
        high: 2.0,
        low: 0.5,
        close: 1.5,
        volume: 3.0,
    }
}

pub const EXCHANGE: &str = "mock";

pub fn tags() -> MarketTags {
    MarketTags::new(EXCHANGE, "BTC", "USDT")
}

pub fn params() -> MarketWatcherParams {
    MarketWatcherParams::new(tags()).refresh_interval_ms(60_000)
}

/// A stopped record for `params` under `id`.
pub fn record(id: &str, params: &MarketWatcherParams) -> WatcherRecord {
    let cfg = params.to_config(None);
    WatcherRecord {
        id: WatcherId::new(id),
        kind: cfg.kind,
        status: WatcherStatus::Stopped,
        identity: cfg.identity,
        extra: cfg.extra,
    }
}

/// A service over a synthetic exchange named [`EXCHANGE`] whose markets
/// were listed half an hour ago.
pub struct Harness {
    pub service: Candlewatch,
    pub records: Arc<MemoryConfigStore>,
    pub store: Arc<MemoryStore>,
}

pub fn harness() -> Harness {
    harness_with(MemoryConfigStore::new())
}

pub fn harness_with(records: MemoryConfigStore) -> Harness {
    let listed_at = Utc::now() - chrono::Duration::minutes(30);
    build_harness(records, Arc::new(SyntheticSource::new(EXCHANGE, listed_at)))
}

/// A service whose only exchange is `source`.
pub fn harness_over(source: Arc<dyn MarketDataSource>) -> Harness {
    build_harness(MemoryConfigStore::new(), source)
}

fn build_harness(records: MemoryConfigStore, source: Arc<dyn MarketDataSource>) -> Harness {
    let records = Arc::new(records);
    let store = Arc::new(MemoryStore::new());
    let service = Candlewatch::builder()
        .with_source(source)
        .config_store(Arc::clone(&records) as _)
        .time_series_store(Arc::clone(&store) as _)
        .build()
        .expect("service builds");
    Harness {
        service,
        records,
        store,
    }
}

/// Wait (bounded) until the watcher's supervision state satisfies `pred`.
pub async fn wait_state<F>(watcher: &Watcher, pred: F) -> SupervisionState
where
    F: Fn(&SupervisionState) -> bool,
{
    let mut rx = watcher.subscribe();
    let state = tokio::time::timeout(Duration::from_secs(5), rx.wait_for(|s| pred(s)))
        .await
        .expect("timed out waiting for supervision state")
        .expect("watcher dropped")
        .clone();
    state
}

/// Poll `check` until it returns true, bounded by a real-time timeout.
pub async fn eventually<F, Fut>(mut check: F)
where
    F: FnMut() -> Fut,
    Fut: std::future::Future<Output = bool>,
{
    let deadline = tokio::time::Instant::now() + Duration::from_secs(5);
    while !check().await {
        assert!(tokio::time::Instant::now() < deadline, "condition not reached in time");
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
}

/// A run loop that fails with `error` every time and counts its runs.
pub struct FailingTask {
    pub runs: AtomicU32,
    pub error: WatchError,
}

impl FailingTask {
    pub fn new(error: WatchError) -> Arc<Self> {
        Arc::new(Self {
            runs: AtomicU32::new(0),
            error,
        })
    }

    pub fn runs(&self) -> u32 {
        self.runs.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl WatcherTask for FailingTask {
    fn kind(&self) -> WatcherKind {
        WatcherKind::Market
    }

    fn parameters(&self) -> WatcherConfig {
        params().to_config(None)
    }

    async fn run_watcher(&self, _ctx: WatcherContext) -> Result<(), WatchError> {
        self.runs.fetch_add(1, Ordering::SeqCst);
        Err(self.error.clone())
    }
}

/// A run loop that idles until asked to stop.
#[derive(Default)]
pub struct IdleTask {
    pub runs: AtomicU32,
}

impl IdleTask {
    pub fn runs(&self) -> u32 {
        self.runs.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl WatcherTask for IdleTask {
    fn kind(&self) -> WatcherKind {
        WatcherKind::Market
    }

    fn parameters(&self) -> WatcherConfig {
        params().to_config(None)
    }

    async fn run_watcher(&self, mut ctx: WatcherContext) -> Result<(), WatchError> {
        self.runs.fetch_add(1, Ordering::SeqCst);
        ctx.stop.stopped().await;
        Ok(())
    }
}

/// A run loop that returns successfully right away.
pub struct ExitingTask;

#[async_trait]
impl WatcherTask for ExitingTask {
    fn kind(&self) -> WatcherKind {
        WatcherKind::Market
    }

    fn parameters(&self) -> WatcherConfig {
        params().to_config(None)
    }

    async fn run_watcher(&self, _ctx: WatcherContext) -> Result<(), WatchError> {
        Ok(())
    }
}

/// A run loop that ignores stop requests entirely.
pub struct StubbornTask;

#[async_trait]
impl WatcherTask for StubbornTask {
    fn kind(&self) -> WatcherKind {
        WatcherKind::Market
    }

    fn parameters(&self) -> WatcherConfig {
        params().to_config(None)
    }

    async fn run_watcher(&self, _ctx: WatcherContext) -> Result<(), WatchError> {
        std::future::pending::<()>().await;
        Ok(())
    }
}

/// A run loop that panics.
pub struct PanickingTask;

#[async_trait]
impl WatcherTask for PanickingTask {
    fn kind(&self) -> WatcherKind {
        WatcherKind::Market
    }

    fn parameters(&self) -> WatcherConfig {
        params().to_config(None)
    }

    async fn run_watcher(&self, _ctx: WatcherContext) -> Result<(), WatchError> {
        panic!("boom");
    }
}
