use candlewatch::{MarketTags, MarketWatcher, MarketWatcherParams, StopSignal};
use candlewatch_demos::common::{get_source, get_store, init_tracing};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    init_tracing();

    let store = get_store().await?;
    let params = MarketWatcherParams::new(MarketTags::new("binance", "BTC", "USDT"))
        .max_history(chrono::Utc::now() - chrono::Duration::hours(3));
    let watcher = MarketWatcher::new(params, get_source()?)?;

    // Walk history backward to the boundary (or the listing date).
    let backfill = watcher.backfill(store.as_ref(), &StopSignal::never()).await?;
    println!("backfill: {backfill:?}");

    // Then fetch whatever the store still reports as missing.
    let repair = watcher.repair_gaps(store.as_ref(), &StopSignal::never()).await?;
    println!("gap repair: {repair:?}");
    Ok(())
}
