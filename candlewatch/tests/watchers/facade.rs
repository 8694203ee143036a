use std::sync::Arc;

use candlewatch::{
    Candlewatch, MarketTags, MarketWatcherParams, StartOutcome, SupervisionState, WatchError,
    WatcherId, WatcherStatus,
};
use candlewatch_mock::{DynamicMockSource, MemoryConfigStore, MemoryStore};

use crate::helpers::{
    EXCHANGE, eventually, harness, harness_over, harness_with, params, record, tags, wait_state,
};

fn market(base: &str) -> MarketWatcherParams {
    MarketWatcherParams::new(MarketTags::new(EXCHANGE, base, "USDT")).refresh_interval_ms(60_000)
}

#[tokio::test]
async fn create_persists_starts_and_backfills() {
    let h = harness();
    let id = h.service.create_watcher(params().to_config(None)).await.unwrap();

    let rec = h.service.get_watcher(&id).await.unwrap();
    assert_eq!(rec.status, WatcherStatus::Running);
    assert_eq!(rec.kind, "MarketWatcher");
    assert!(h.service.registry().is_active(&id));

    eventually(|| async { h.store.candles(&tags()).await.len() >= 29 }).await;
    h.service.stop_all().await;
}

#[tokio::test]
async fn create_rejects_a_provided_id() {
    let h = harness();
    let err = h
        .service
        .create_watcher(params().to_config(Some(WatcherId::new("mine"))))
        .await
        .unwrap_err();
    assert!(matches!(err, WatchError::InvalidArg(_)));
    assert!(h.records.is_empty().await);
}

#[tokio::test]
async fn create_rejects_an_unknown_type() {
    let h = harness();
    let mut cfg = params().to_config(None);
    cfg.kind = "TickerWatcher".into();
    let err = h.service.create_watcher(cfg).await.unwrap_err();
    assert!(matches!(err, WatchError::InvalidArg(msg) if msg.contains("TickerWatcher")));
}

#[tokio::test]
async fn create_rejects_duplicates_regardless_of_parameters() {
    let h = harness();
    h.service.create_watcher(params().to_config(None)).await.unwrap();

    let again = params().refresh_interval_ms(5_000).to_config(None);
    let err = h.service.create_watcher(again).await.unwrap_err();
    assert!(matches!(err, WatchError::InvalidArg(msg) if msg.contains("already exists")));
    assert_eq!(h.service.list_watchers().await.unwrap().len(), 1);

    // a different market is not a duplicate
    h.service.create_watcher(market("ETH").to_config(None)).await.unwrap();
    assert_eq!(h.service.list_watchers().await.unwrap().len(), 2);
    h.service.stop_all().await;
}

#[tokio::test]
async fn create_rejects_invalid_parameters() {
    let h = harness();
    let err = h
        .service
        .create_watcher(params().refresh_interval_ms(999).to_config(None))
        .await
        .unwrap_err();
    assert!(matches!(err, WatchError::Config(_)));

    let unknown = MarketWatcherParams::new(MarketTags::new("kraken", "BTC", "USD"));
    let err = h.service.create_watcher(unknown.to_config(None)).await.unwrap_err();
    assert!(matches!(err, WatchError::Config(_)));
    assert!(h.records.is_empty().await);
    assert!(h.service.registry().is_empty());
}

#[tokio::test]
async fn start_and_stop_round_trip() {
    let h = harness();
    let id = h.service.create_watcher(params().to_config(None)).await.unwrap();

    assert_eq!(h.service.start_watcher(&id).await.unwrap(), StartOutcome::AlreadyRunning);

    h.service.stop_watcher(&id).await;
    assert!(h.service.registry().get(&id).is_none());
    assert_eq!(h.service.get_watcher(&id).await.unwrap().status, WatcherStatus::Stopped);

    assert_eq!(h.service.start_watcher(&id).await.unwrap(), StartOutcome::Started);
    assert!(h.service.registry().is_active(&id));
    assert_eq!(h.service.get_watcher(&id).await.unwrap().status, WatcherStatus::Running);
    h.service.stop_all().await;
}

#[tokio::test]
async fn restarting_a_watcher_that_gave_up_persists_running() {
    let (source, ctl) = DynamicMockSource::new_with_controller(EXCHANGE);
    ctl.set_candles_fn("BTC/USDT", |req| match req.since {
        None => Err(WatchError::data_source(EXCHANGE, "connection reset")),
        Some(_) => Ok(Vec::new()),
    })
    .await;
    let h = harness_over(source);
    let id = h.service.create_watcher(params().to_config(None)).await.unwrap();

    let first = h.service.registry().get(&id).expect("registered");
    wait_state(&first, |s| matches!(s, SupervisionState::GaveUp(_))).await;
    assert!(!h.service.registry().is_active(&id));
    assert_eq!(h.service.get_watcher(&id).await.unwrap().status, WatcherStatus::Stopped);

    ctl.set_candles_fn("BTC/USDT", |_| Ok(Vec::new())).await;
    assert_eq!(h.service.start_watcher(&id).await.unwrap(), StartOutcome::Started);

    assert!(h.service.registry().is_active(&id));
    assert_eq!(h.service.get_watcher(&id).await.unwrap().status, WatcherStatus::Running);
    assert_eq!(h.service.registry().len(), 1);

    // restart_all leaves the running instance alone
    assert_eq!(h.service.restart_all().await.unwrap(), 0);
    assert_eq!(h.service.get_watcher(&id).await.unwrap().status, WatcherStatus::Running);
    h.service.stop_all().await;
}

#[tokio::test]
async fn restart_all_revives_a_watcher_that_gave_up() {
    let (source, ctl) = DynamicMockSource::new_with_controller(EXCHANGE);
    ctl.set_candles_fn("BTC/USDT", |req| match req.since {
        None => Err(WatchError::data_source(EXCHANGE, "connection reset")),
        Some(_) => Ok(Vec::new()),
    })
    .await;
    let h = harness_over(source);
    let id = h.service.create_watcher(params().to_config(None)).await.unwrap();
    let first = h.service.registry().get(&id).expect("registered");
    wait_state(&first, |s| matches!(s, SupervisionState::GaveUp(_))).await;

    ctl.set_candles_fn("BTC/USDT", |_| Ok(Vec::new())).await;
    assert_eq!(h.service.restart_all().await.unwrap(), 1);

    assert!(h.service.registry().is_active(&id));
    assert_eq!(h.service.get_watcher(&id).await.unwrap().status, WatcherStatus::Running);
    h.service.stop_all().await;
}

#[tokio::test]
async fn start_unknown_watcher_is_not_found() {
    let h = harness();
    let err = h.service.start_watcher(&WatcherId::new("ghost")).await.unwrap_err();
    assert!(matches!(err, WatchError::NotFound { .. }));
    // stopping an unknown watcher is not an error
    h.service.stop_watcher(&WatcherId::new("ghost")).await;
}

#[tokio::test]
async fn delete_stops_and_removes() {
    let h = harness();
    let id = h.service.create_watcher(params().to_config(None)).await.unwrap();

    h.service.delete_watcher(&id).await.unwrap();
    assert!(h.service.registry().get(&id).is_none());
    assert!(matches!(
        h.service.get_watcher(&id).await,
        Err(WatchError::NotFound { .. })
    ));
    assert!(matches!(
        h.service.delete_watcher(&id).await,
        Err(WatchError::NotFound { .. })
    ));
}

#[tokio::test]
async fn restart_all_starts_persisted_watchers_once() {
    let h = harness_with(MemoryConfigStore::with_records([
        record("a", &market("BTC")),
        record("b", &market("ETH")),
    ]));

    assert_eq!(h.service.restart_all().await.unwrap(), 2);
    assert_eq!(h.service.registry().ids(), vec![WatcherId::new("a"), WatcherId::new("b")]);
    for id in ["a", "b"] {
        let rec = h.records.peek(&WatcherId::new(id)).await.unwrap();
        assert_eq!(rec.status, WatcherStatus::Running);
    }

    assert_eq!(h.service.restart_all().await.unwrap(), 0);
    h.service.stop_all().await;
}

#[tokio::test]
async fn restart_all_fails_on_an_unbuildable_record() {
    let unknown = MarketWatcherParams::new(MarketTags::new("kraken", "BTC", "USD"));
    let h = harness_with(MemoryConfigStore::with_records([record("bad", &unknown)]));

    let err = h.service.restart_all().await.unwrap_err();
    assert!(matches!(err, WatchError::Config(_)));
    assert!(h.service.registry().is_empty());
}

#[tokio::test]
async fn stop_all_and_delete_all() {
    let h = harness();
    let a = h.service.create_watcher(market("BTC").to_config(None)).await.unwrap();
    let b = h.service.create_watcher(market("ETH").to_config(None)).await.unwrap();

    h.service.stop_all().await;
    assert!(h.service.registry().is_empty());
    for id in [&a, &b] {
        assert_eq!(h.service.get_watcher(id).await.unwrap().status, WatcherStatus::Stopped);
    }

    h.service.delete_all().await.unwrap();
    assert!(h.service.list_watchers().await.unwrap().is_empty());
}

#[tokio::test]
async fn fetch_market_info_routes_by_exchange() {
    let h = harness();
    let info = h.service.fetch_market_info(EXCHANGE, "BTC/USDT").await.unwrap();
    assert_eq!(info.symbol, "BTCUSDT");
    assert!(info.active);

    let err = h.service.fetch_market_info("kraken", "BTC/USDT").await.unwrap_err();
    assert!(matches!(err, WatchError::Config(_)));
}

#[test]
fn builder_requires_both_stores() {
    let missing_store = Candlewatch::builder()
        .config_store(Arc::new(MemoryConfigStore::new()))
        .build();
    assert!(matches!(missing_store, Err(WatchError::Config(_))));

    let missing_records = Candlewatch::builder()
        .time_series_store(Arc::new(MemoryStore::new()))
        .build();
    assert!(matches!(missing_records, Err(WatchError::Config(_))));
}
