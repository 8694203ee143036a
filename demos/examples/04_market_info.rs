use candlewatch::{Candlewatch, CandleRequest, MarketDataSource};
use candlewatch_demos::common::{get_records, get_source, get_store};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let source = get_source()?;
    let service = Candlewatch::builder()
        .with_source(source.clone())
        .time_series_store(get_store().await?)
        .config_store(get_records())
        .build()?;

    let info = service.fetch_market_info("binance", "BTC/USDT").await?;
    println!("{info:#?}");

    let latest = source.fetch_candles("BTC/USDT", CandleRequest::latest(3)).await?;
    for candle in latest {
        println!(
            "{} o={} h={} l={} c={} v={}",
            candle.time, candle.open, candle.high, candle.low, candle.close, candle.volume
        );
    }
    Ok(())
}
