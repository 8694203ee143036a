use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use tokio::sync::Mutex;

use candlewatch_core::{
    Candle, CandleRequest, Clock, MarketDataSource, MarketInfo, SystemClock, WatchError,
    ceil_minute, floor_minute,
};

/// Deterministic exchange that lists every market at a fixed instant and
/// serves one candle per minute from then on.
///
/// Requests starting before the listing are answered from the listing
/// onward, so repeated backward pages before the listing come back identical.
/// Symbols whose base is `FAIL` always fail.
pub struct SyntheticSource {
    name: &'static str,
    listed_at: DateTime<Utc>,
    clock: Arc<dyn Clock>,
    requests: Mutex<Vec<(String, CandleRequest)>>,
}

impl SyntheticSource {
    /// Source named `name` with markets listed at `listed_at`, using the system clock.
    #[must_use]
    pub fn new(name: &'static str, listed_at: DateTime<Utc>) -> Self {
        Self::with_clock(name, listed_at, Arc::new(SystemClock))
    }

    /// Source whose notion of "now" comes from `clock`.
    #[must_use]
    pub fn with_clock(name: &'static str, listed_at: DateTime<Utc>, clock: Arc<dyn Clock>) -> Self {
        Self {
            name,
            listed_at: ceil_minute(listed_at),
            clock,
            requests: Mutex::new(Vec::new()),
        }
    }

    /// The candle this source serves for the minute starting at `time`.
    #[must_use]
    pub fn candle_at(&self, time: DateTime<Utc>) -> Candle {
        let i = (time - self.listed_at).num_minutes();
        #[allow(clippy::cast_precision_loss)]
        let base = 100.0 + (i.rem_euclid(50)) as f64;
        Candle {
            time,
            open: base,
            high: base + 2.0,
            low: base - 1.0,
            close: base + 1.0,
            volume: 10.0,
        }
    }

    /// Every candle request received so far.
    pub async fn requests(&self) -> Vec<(String, CandleRequest)> {
        self.requests.lock().await.clone()
    }

    fn check_symbol(&self, symbol: &str) -> Result<(), WatchError> {
        if symbol.split('/').next() == Some("FAIL") {
            return Err(WatchError::data_source(self.name, format!("forced failure: {symbol}")));
        }
        Ok(())
    }
}

#[async_trait]
impl MarketDataSource for SyntheticSource {
    fn name(&self) -> &'static str {
        self.name
    }

    async fn fetch_candles(
        &self,
        symbol: &str,
        req: CandleRequest,
    ) -> Result<Vec<Candle>, WatchError> {
        self.requests.lock().await.push((symbol.to_string(), req));
        self.check_symbol(symbol)?;
        let now = self.clock.now();
        let last = floor_minute(now);
        let mut cursor = ceil_minute(req.resolve_since(now)).max(self.listed_at);
        let mut out = Vec::with_capacity(req.effective_limit().min(1_000));
        while out.len() < req.effective_limit() && cursor <= last {
            out.push(self.candle_at(cursor));
            cursor += Duration::minutes(1);
        }
        Ok(out)
    }

    async fn fetch_market_info(&self, symbol: &str) -> Result<MarketInfo, WatchError> {
        self.check_symbol(symbol)?;
        let (base, quote) = symbol
            .split_once('/')
            .ok_or_else(|| WatchError::InvalidArg(format!("symbol must be BASE/QUOTE: {symbol}")))?;
        Ok(MarketInfo {
            symbol: format!("{base}{quote}"),
            base: base.to_string(),
            quote: quote.to_string(),
            active: true,
        })
    }
}
