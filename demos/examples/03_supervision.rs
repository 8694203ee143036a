use std::time::Duration;

use candlewatch::{Candlewatch, MarketTags, MarketWatcherParams, SupervisionState, SupervisorConfig};
use candlewatch_demos::common::{get_records, get_source, get_store, init_tracing};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    init_tracing();

    let service = Candlewatch::builder()
        .with_source(get_source()?)
        .time_series_store(get_store().await?)
        .config_store(get_records())
        .supervisor(SupervisorConfig {
            max_restarts: 2,
            ..SupervisorConfig::default()
        })
        .build()?;

    // The synthetic exchange always fails this market; Binance doesn't list it.
    let params = MarketWatcherParams::new(MarketTags::new("binance", "FAIL", "USDT"))
        .refresh_interval_ms(1_000)
        .max_history(chrono::Utc::now() - chrono::Duration::minutes(10));
    let id = service.create_watcher(params.to_config(None)).await?;

    let Some(watcher) = service.registry().get(&id) else {
        return Err("watcher was not registered".into());
    };
    let mut states = watcher.subscribe();
    let outcome = tokio::time::timeout(Duration::from_secs(30), async {
        loop {
            let state = states.borrow_and_update().clone();
            println!("supervision: {state:?}");
            if matches!(state, SupervisionState::GaveUp(_)) {
                return state;
            }
            if states.changed().await.is_err() {
                return state;
            }
        }
    })
    .await;
    println!("final: {outcome:?}");
    println!("record: {:?}", service.get_watcher(&id).await?.status);
    Ok(())
}
