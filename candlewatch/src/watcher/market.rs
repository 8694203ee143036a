//! Market watcher: keeps one market's minute candle series complete.
//!
//! On every (re)start the watcher reconciles the stored series with the
//! exchange (history backfill when empty, then gap repair) and then polls
//! the latest candle at a fixed interval.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tokio::task::JoinSet;

use candlewatch_core::{
    Candle, CandleRequest, Clock, Granularity, MAX_CANDLES_PER_REQUEST, MarketDataSource, MarketTags,
    MarketWatcherParams, StopSignal, SystemClock, TimeSeriesStore, WatchError, WatcherConfig,
    WatcherKind, coalesce_gap_runs,
};

use super::{WatcherContext, WatcherTask};

/// Outcome of one history backfill.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct BackfillReport {
    /// Fetches issued, including the final boundary fetch.
    pub fetches: usize,
    /// Candles written.
    pub written: usize,
    /// The exchange ran out of history before the boundary was reached.
    pub exhausted: bool,
}

/// Outcome of one gap repair.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct GapRepairReport {
    /// Gap timestamps reported by the store.
    pub gaps: usize,
    /// Runs fetched.
    pub runs: usize,
    /// Candles written.
    pub written: usize,
}

/// Watcher task for one market.
pub struct MarketWatcher {
    params: MarketWatcherParams,
    symbol: String,
    source: Arc<dyn MarketDataSource>,
    clock: Arc<dyn Clock>,
}

fn batch_span() -> chrono::Duration {
    chrono::Duration::minutes(i64::try_from(MAX_CANDLES_PER_REQUEST).unwrap_or(i64::MAX))
}

impl MarketWatcher {
    /// Build a market watcher over `source`.
    ///
    /// # Errors
    /// Returns `WatchError::Config` when the refresh interval is below one second.
    pub fn new(
        params: MarketWatcherParams,
        source: Arc<dyn MarketDataSource>,
    ) -> Result<Self, WatchError> {
        params.validate()?;
        let symbol = params.tags.symbol();
        Ok(Self {
            params,
            symbol,
            source,
            clock: Arc::new(SystemClock),
        })
    }

    /// Build from a raw configuration.
    ///
    /// # Errors
    /// Returns `WatchError::Config` for missing identity fields, a malformed
    /// parameter bag, or a refresh interval below one second.
    pub fn from_config(
        cfg: &WatcherConfig,
        source: Arc<dyn MarketDataSource>,
    ) -> Result<Self, WatchError> {
        Self::new(MarketWatcherParams::from_config(cfg)?, source)
    }

    /// Replace the clock used for backfill windows.
    #[must_use]
    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    /// Market identity.
    #[must_use]
    pub const fn tags(&self) -> &MarketTags {
        &self.params.tags
    }

    /// Traded symbol (`BASE/QUOTE`).
    #[must_use]
    pub fn symbol(&self) -> &str {
        &self.symbol
    }

    /// Validated parameters.
    #[must_use]
    pub const fn params(&self) -> &MarketWatcherParams {
        &self.params
    }

    async fn fetch_from(&self, since: DateTime<Utc>) -> Result<Vec<Candle>, WatchError> {
        self.source
            .fetch_candles(&self.symbol, CandleRequest::since(since, MAX_CANDLES_PER_REQUEST))
            .await
    }

    /// Fetch history backward from now toward the configured boundary.
    ///
    /// Stops early when a batch repeats the previous batch's first candle or
    /// comes back empty; otherwise finishes with one fetch anchored at the
    /// boundary.
    ///
    /// # Errors
    /// The first fetch or write failure aborts the backfill.
    pub async fn backfill(
        &self,
        store: &dyn TimeSeriesStore,
        stop: &StopSignal,
    ) -> Result<BackfillReport, WatchError> {
        let tags = &self.params.tags;
        let boundary = self.params.max_history;
        let step = batch_span();
        let mut report = BackfillReport::default();
        let mut window = self.clock.now() - step;
        let mut previous_first: Option<DateTime<Utc>> = None;

        tracing::info!(exchange = %tags.exchange, base = %tags.base, quote = %tags.quote, since = %boundary, "backfilling history");
        while window > boundary {
            if stop.is_stopped() {
                return Ok(report);
            }
            let batch = self.fetch_from(window).await?;
            report.fetches += 1;
            let first = batch.first().map(|c| c.time);
            if first.is_none() || first == previous_first {
                tracing::debug!(window = %window, "no further history");
                report.exhausted = true;
                break;
            }
            previous_first = first;
            store.write(tags, &batch).await?;
            report.written += batch.len();
            tracing::debug!(window = %window, candles = batch.len(), "backfilled window");
            window -= step;
        }

        if !report.exhausted && !stop.is_stopped() {
            let batch = self.fetch_from(boundary).await?;
            report.fetches += 1;
            if !batch.is_empty() {
                store.write(tags, &batch).await?;
                report.written += batch.len();
            }
        }
        tracing::info!(
            exchange = %tags.exchange, base = %tags.base, quote = %tags.quote,
            fetches = report.fetches, written = report.written, "backfill finished"
        );
        Ok(report)
    }

    /// Fetch and write every run of missing minutes the store reports.
    ///
    /// # Errors
    /// The first query, fetch or write failure aborts the repair.
    pub async fn repair_gaps(
        &self,
        store: &dyn TimeSeriesStore,
        stop: &StopSignal,
    ) -> Result<GapRepairReport, WatchError> {
        let tags = &self.params.tags;
        let gaps = store.gaps(tags, Granularity::Minute).await?;
        let runs = coalesce_gap_runs(&gaps, MAX_CANDLES_PER_REQUEST);
        let mut report = GapRepairReport {
            gaps: gaps.len(),
            ..GapRepairReport::default()
        };
        for run in &runs {
            if stop.is_stopped() {
                break;
            }
            let batch = self.fetch_from(run.start).await?;
            report.runs += 1;
            tracing::debug!(start = %run.start, missing = run.len, fetched = batch.len(), "repairing gap run");
            if batch.is_empty() {
                continue;
            }
            store.write(tags, &batch).await?;
            report.written += batch.len();
        }
        tracing::info!(
            exchange = %tags.exchange, base = %tags.base, quote = %tags.quote,
            gaps = report.gaps, runs = report.runs, "gap repair finished"
        );
        Ok(report)
    }

    /// Backfill when the series is empty, then repair gaps.
    ///
    /// # Errors
    /// The first failure of either phase.
    pub async fn reconcile(
        &self,
        store: &dyn TimeSeriesStore,
        stop: &StopSignal,
    ) -> Result<(), WatchError> {
        if store.count(&self.params.tags).await? == 0 {
            self.backfill(store, stop).await?;
        }
        self.repair_gaps(store, stop).await?;
        Ok(())
    }

    fn log_write(&self, result: Result<Result<(), WatchError>, tokio::task::JoinError>) {
        let tags = &self.params.tags;
        match result {
            Ok(Ok(())) => {}
            Ok(Err(e)) => {
                tracing::warn!(exchange = %tags.exchange, base = %tags.base, quote = %tags.quote, error = %e, "failed to write latest candle");
            }
            Err(e) => {
                tracing::warn!(exchange = %tags.exchange, base = %tags.base, quote = %tags.quote, error = %e, "write task did not complete");
            }
        }
    }

    async fn poll(&self, store: Arc<dyn TimeSeriesStore>, mut stop: StopSignal) -> Result<(), WatchError> {
        let interval = Duration::from_millis(self.params.refresh_interval_ms);
        let mut writes: JoinSet<Result<(), WatchError>> = JoinSet::new();
        let outcome = loop {
            if stop.is_stopped() {
                break Ok(());
            }
            match self.source.fetch_candles(&self.symbol, CandleRequest::latest(1)).await {
                Ok(candles) if candles.is_empty() => {
                    tracing::debug!(symbol = %self.symbol, "no latest candle");
                }
                Ok(candles) => {
                    let store = Arc::clone(&store);
                    let tags = self.params.tags.clone();
                    writes.spawn(async move { store.write(&tags, &candles).await });
                }
                Err(e) => break Err(e),
            }
            while let Some(done) = writes.try_join_next() {
                self.log_write(done);
            }
            if !stop.sleep(interval).await {
                break Ok(());
            }
        };
        while let Some(done) = writes.join_next().await {
            self.log_write(done);
        }
        outcome
    }
}

#[async_trait]
impl WatcherTask for MarketWatcher {
    fn kind(&self) -> WatcherKind {
        WatcherKind::Market
    }

    fn parameters(&self) -> WatcherConfig {
        self.params.to_config(None)
    }

    async fn run_watcher(&self, ctx: WatcherContext) -> Result<(), WatchError> {
        let WatcherContext { store, stop, .. } = ctx;
        if let Err(e) = self.reconcile(store.as_ref(), &stop).await {
            let tags = &self.params.tags;
            tracing::error!(exchange = %tags.exchange, base = %tags.base, quote = %tags.quote, error = %e, "reconciliation failed");
        }
        self.poll(store, stop).await
    }
}
