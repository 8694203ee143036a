use std::time::Duration;

use candlewatch::{Candlewatch, Granularity, MarketTags, MarketWatcherParams, TimeSeriesStore};
use candlewatch_demos::common::{get_records, get_source, get_store, init_tracing};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    init_tracing();

    // 1. Wire the service: exchange, candle store, watcher records.
    let store = get_store().await?;
    let service = Candlewatch::builder()
        .with_source(get_source()?)
        .time_series_store(store.clone())
        .config_store(get_records())
        .build()?;

    // 2. Watch one market, keeping the last hour of history.
    let tags = MarketTags::new("binance", "ETH", "USDT");
    let params = MarketWatcherParams::new(tags.clone())
        .refresh_interval_ms(2_000)
        .max_history(chrono::Utc::now() - chrono::Duration::hours(1));
    let id = service.create_watcher(params.to_config(None)).await?;
    println!("started watcher {id}");

    // 3. Let it backfill and poll for a while.
    tokio::time::sleep(Duration::from_secs(5)).await;
    let count = store.count(&tags).await?;
    let gaps = store.gaps(&tags, Granularity::Minute).await?;
    println!("{tags}: {count} candles stored, {} gaps", gaps.len());

    // 4. Stop and show the persisted record.
    service.stop_watcher(&id).await;
    println!("{:#?}", service.get_watcher(&id).await?);
    Ok(())
}
