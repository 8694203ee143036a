use std::sync::Arc;

use candlewatch::{ConfigStore, MarketDataSource, TimeSeriesStore, WatchError};
use candlewatch_binance::{BinanceConfig, BinanceSource};
use candlewatch_influx::InfluxStore;
use candlewatch_mock::{MemoryConfigStore, MemoryStore, SyntheticSource};

/// Set when demos should run against in-memory doubles (CI).
pub const USE_MOCK_ENV: &str = "CANDLEWATCH_DEMOS_USE_MOCK";

/// Whether demos run against in-memory doubles.
#[must_use]
pub fn use_mock() -> bool {
    std::env::var(USE_MOCK_ENV).is_ok()
}

/// Install a compact `tracing` subscriber filtered by `RUST_LOG` (default `info`).
pub fn init_tracing() {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info"));
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .try_init();
}

/// Return the exchange source for demos.
///
/// In mock mode this is a synthetic exchange named `binance` whose markets
/// were listed two hours ago.
///
/// # Errors
/// Fails when the Binance HTTP client cannot be built.
pub fn get_source() -> Result<Arc<dyn MarketDataSource>, WatchError> {
    if use_mock() {
        println!("--- (Using synthetic exchange for CI) ---");
        let listed_at = chrono::Utc::now() - chrono::Duration::hours(2);
        return Ok(Arc::new(SyntheticSource::new(BinanceSource::NAME, listed_at)));
    }
    Ok(Arc::new(BinanceSource::new(&BinanceConfig::default())?))
}

/// Return the time-series store for demos (InfluxDB on localhost unless mocked).
///
/// # Errors
/// Fails when InfluxDB is unreachable or the database cannot be created.
pub async fn get_store() -> Result<Arc<dyn TimeSeriesStore>, WatchError> {
    if use_mock() {
        return Ok(Arc::new(MemoryStore::new()));
    }
    let store = InfluxStore::builder().build()?;
    store.init().await?;
    Ok(Arc::new(store))
}

/// Watcher records live in memory for every demo.
#[must_use]
pub fn get_records() -> Arc<dyn ConfigStore> {
    Arc::new(MemoryConfigStore::new())
}
