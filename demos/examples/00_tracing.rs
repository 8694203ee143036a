use std::time::Duration;

use candlewatch::{Candlewatch, MarketTags, MarketWatcherParams};
use candlewatch_demos::common::{get_records, get_source, get_store};
use tracing_subscriber::fmt::format::FmtSpan;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Suggested: RUST_LOG=info,candlewatch=debug
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_target(false)
        .with_span_events(FmtSpan::NEW | FmtSpan::CLOSE)
        .try_init();

    let service = Candlewatch::builder()
        .with_source(get_source()?)
        .time_series_store(get_store().await?)
        .config_store(get_records())
        .build()?;

    let params = MarketWatcherParams::new(MarketTags::new("binance", "BTC", "USDT"))
        .refresh_interval_ms(1_000)
        .max_history(chrono::Utc::now() - chrono::Duration::hours(1));
    service.create_watcher(params.to_config(None)).await?;

    tokio::time::sleep(Duration::from_secs(3)).await;
    service.stop_all().await;
    Ok(())
}
