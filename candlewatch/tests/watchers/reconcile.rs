use std::sync::Arc;

use candlewatch::{
    BackfillReport, CandleRequest, GapRepairReport, MarketWatcher, StopSignal, TimeSeriesStore,
    WatchError,
};
use candlewatch_mock::{DynamicMockSource, ManualClock, MemoryStore, StoreOp, SyntheticSource};
use chrono::{TimeZone, Utc};

use crate::helpers::{candle, minute, params, tags};

const SYMBOL: &str = "BTC/USDT";

fn clock_at(m: i64) -> Arc<ManualClock> {
    Arc::new(ManualClock::new(minute(m)))
}

fn since(m: i64) -> CandleRequest {
    CandleRequest::since(minute(m), 500)
}

#[tokio::test]
async fn backfill_stops_when_a_page_repeats() {
    let clock = clock_at(10_000);
    let (source, ctl) = DynamicMockSource::new_with_controller("mock");
    ctl.set_candles_fn(SYMBOL, |_| Ok(vec![candle(minute(0)), candle(minute(1))]))
        .await;
    let store = MemoryStore::with_clock(clock.clone());
    let w = MarketWatcher::new(params(), source).unwrap().with_clock(clock);

    let report = w.backfill(&store, &StopSignal::never()).await.unwrap();

    assert_eq!(
        report,
        BackfillReport {
            fetches: 2,
            written: 2,
            exhausted: true
        }
    );
    let requests: Vec<_> = ctl.candle_requests().await.into_iter().map(|(_, r)| r).collect();
    assert_eq!(requests, vec![since(9_500), since(9_000)]);
    assert_eq!(store.count(&tags()).await.unwrap(), 2);
}

#[tokio::test]
async fn backfill_stops_on_empty_page_without_writing() {
    let clock = clock_at(10_000);
    let (source, ctl) = DynamicMockSource::new_with_controller("mock");
    let store = MemoryStore::with_clock(clock.clone());
    let w = MarketWatcher::new(params(), source).unwrap().with_clock(clock);

    let report = w.backfill(&store, &StopSignal::never()).await.unwrap();

    assert_eq!(report.fetches, 1);
    assert!(report.exhausted);
    assert_eq!(ctl.candle_calls(), 1);
    assert_eq!(store.write_calls().await, 0);
}

#[tokio::test]
async fn backfill_finishes_with_a_fetch_at_the_boundary() {
    let clock = clock_at(1_200);
    let listed = Utc.with_ymd_and_hms(2017, 1, 1, 0, 0, 0).unwrap();
    let source = Arc::new(SyntheticSource::with_clock("mock", listed, clock.clone()));
    let store = MemoryStore::with_clock(clock.clone());
    let w = MarketWatcher::new(params().max_history(minute(0)), source.clone())
        .unwrap()
        .with_clock(clock);

    let report = w.backfill(&store, &StopSignal::never()).await.unwrap();

    assert_eq!(report.fetches, 3);
    assert_eq!(report.written, 1_500);
    assert!(!report.exhausted);
    let requests: Vec<_> = source.requests().await.into_iter().map(|(_, r)| r).collect();
    assert_eq!(requests, vec![since(700), since(200), since(0)]);

    let stored = store.candles(&tags()).await;
    assert_eq!(stored.len(), 1_200);
    assert_eq!(stored.first().map(|c| c.time), Some(minute(0)));
    assert_eq!(stored.last().map(|c| c.time), Some(minute(1_199)));
    assert!(store.gaps(&tags(), Default::default()).await.unwrap().is_empty());
}

#[tokio::test]
async fn backfill_stops_at_listing_date() {
    let clock = clock_at(3_000);
    let source = Arc::new(SyntheticSource::with_clock("mock", minute(1_800), clock.clone()));
    let store = MemoryStore::with_clock(clock.clone());
    let w = MarketWatcher::new(params().max_history(minute(0)), source)
        .unwrap()
        .with_clock(clock);

    let report = w.backfill(&store, &StopSignal::never()).await.unwrap();

    assert_eq!(
        report,
        BackfillReport {
            fetches: 4,
            written: 1_500,
            exhausted: true
        }
    );
    let stored = store.candles(&tags()).await;
    assert_eq!(stored.len(), 1_200);
    assert_eq!(stored[0].time, minute(1_800));
}

#[tokio::test]
async fn backfill_fetch_failure_aborts() {
    let clock = clock_at(10_000);
    let (source, ctl) = DynamicMockSource::new_with_controller("mock");
    ctl.set_candles_fn(SYMBOL, |_| Err(WatchError::data_source("mock", "rate limited")))
        .await;
    let store = MemoryStore::with_clock(clock.clone());
    let w = MarketWatcher::new(params(), source).unwrap().with_clock(clock);

    let err = w.backfill(&store, &StopSignal::never()).await.unwrap_err();
    assert!(matches!(err, WatchError::DataSource { .. }));
    assert_eq!(ctl.candle_calls(), 1);
}

async fn store_with_holes(clock: Arc<ManualClock>) -> MemoryStore {
    let store = MemoryStore::with_clock(clock);
    let present: Vec<_> = (-1..=602)
        .filter(|m| ![0, 1, 2, 600, 601].contains(m))
        .map(|m| candle(minute(m)))
        .collect();
    store.write(&tags(), &present).await.unwrap();
    store
}

#[tokio::test]
async fn gap_repair_fetches_one_request_per_run() {
    let clock = Arc::new(ManualClock::new(minute(603) + chrono::Duration::seconds(30)));
    let store = store_with_holes(clock.clone()).await;
    let (source, ctl) = DynamicMockSource::new_with_controller("mock");
    let w = MarketWatcher::new(params(), source).unwrap().with_clock(clock);

    let report = w.repair_gaps(&store, &StopSignal::never()).await.unwrap();

    assert_eq!(
        report,
        GapRepairReport {
            gaps: 5,
            runs: 2,
            written: 0
        }
    );
    let requests: Vec<_> = ctl.candle_requests().await.into_iter().map(|(_, r)| r).collect();
    assert_eq!(requests, vec![since(0), since(600)]);
    // empty batches are not written
    assert_eq!(store.write_calls().await, 1);
}

#[tokio::test]
async fn gap_repair_fills_every_hole() {
    let clock = Arc::new(ManualClock::new(minute(603) + chrono::Duration::seconds(30)));
    let store = store_with_holes(clock.clone()).await;
    let source = Arc::new(SyntheticSource::with_clock("mock", minute(-10), clock.clone()));
    let w = MarketWatcher::new(params(), source).unwrap().with_clock(clock);

    let report = w.repair_gaps(&store, &StopSignal::never()).await.unwrap();

    assert_eq!(report.runs, 2);
    assert!(report.written >= 5);
    assert!(store.gaps(&tags(), Default::default()).await.unwrap().is_empty());
}

#[tokio::test]
async fn gap_query_failure_aborts_repair() {
    let clock = clock_at(10);
    let store = MemoryStore::with_clock(clock.clone());
    store
        .fail_next(StoreOp::Gaps, WatchError::store("gaps", "SELECT ...", "timeout"))
        .await;
    let (source, ctl) = DynamicMockSource::new_with_controller("mock");
    let w = MarketWatcher::new(params(), source).unwrap().with_clock(clock);

    let err = w.repair_gaps(&store, &StopSignal::never()).await.unwrap_err();
    assert!(matches!(err, WatchError::Store { .. }));
    assert_eq!(ctl.candle_calls(), 0);
}

#[tokio::test]
async fn reconcile_backfills_an_empty_series_completely() {
    let clock = clock_at(10);
    let (source, ctl) = DynamicMockSource::new_with_controller("mock");
    ctl.set_candles_fn(SYMBOL, |req| {
        let from = req.since.unwrap_or(minute(0));
        Ok((0..10)
            .map(|m| candle(minute(m)))
            .filter(|c| c.time >= from)
            .take(req.limit)
            .collect())
    })
    .await;
    let store = MemoryStore::with_clock(clock.clone());
    let w = MarketWatcher::new(params().max_history(minute(0)), source)
        .unwrap()
        .with_clock(clock);

    w.reconcile(&store, &StopSignal::never()).await.unwrap();

    assert_eq!(store.count(&tags()).await.unwrap(), 10);
    assert!(store.gaps(&tags(), Default::default()).await.unwrap().is_empty());
    // the first window lies before the boundary, so only the boundary fetch runs
    let requests: Vec<_> = ctl.candle_requests().await.into_iter().map(|(_, r)| r).collect();
    assert_eq!(requests, vec![since(0)]);
}

#[tokio::test]
async fn reconcile_skips_backfill_when_series_exists() {
    let clock = clock_at(5);
    let store = MemoryStore::with_clock(clock.clone());
    store.write(&tags(), &[candle(minute(0))]).await.unwrap();
    let (source, ctl) = DynamicMockSource::new_with_controller("mock");
    let w = MarketWatcher::new(params(), source).unwrap().with_clock(clock);

    w.reconcile(&store, &StopSignal::never()).await.unwrap();

    let requests: Vec<_> = ctl.candle_requests().await.into_iter().map(|(_, r)| r).collect();
    assert_eq!(requests, vec![since(1)]);
}

#[tokio::test]
async fn stopped_signal_skips_remaining_work() {
    let clock = clock_at(10_000);
    let (source, ctl) = DynamicMockSource::new_with_controller("mock");
    let store = MemoryStore::with_clock(clock.clone());
    let w = MarketWatcher::new(params(), source).unwrap().with_clock(clock);
    let (handle, signal) = candlewatch::stop_channel();
    handle.stop();

    let report = w.backfill(&store, &signal).await.unwrap();
    assert_eq!(report.fetches, 0);
    assert_eq!(ctl.candle_calls(), 0);
}
