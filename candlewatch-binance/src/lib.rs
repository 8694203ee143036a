//! candlewatch-binance
//!
//! [`MarketDataSource`] over the public Binance spot REST API: one-minute
//! klines and exchange metadata. No API key is needed.
#![warn(missing_docs)]

/// REST transport abstraction and the production adapter backed by `reqwest`.
pub mod adapter;
mod klines;

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use url::Url;

use candlewatch_core::{
    Candle, CandleRequest, Clock, MarketDataSource, MarketInfo, SystemClock, WatchError,
};

use adapter::{BinanceRest, RealAdapter, RestError};
pub use klines::parse_klines;

/// Largest `limit` the klines endpoint accepts.
pub const MAX_KLINES_LIMIT: usize = 1_000;

/// Connection settings of a [`BinanceSource`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BinanceConfig {
    /// REST base URL.
    pub base_url: String,
    /// Per-request timeout.
    pub timeout: Duration,
}

impl Default for BinanceConfig {
    fn default() -> Self {
        Self {
            base_url: "https://api.binance.com".into(),
            timeout: Duration::from_secs(10),
        }
    }
}

/// Binance spot market data source.
pub struct BinanceSource {
    rest: Arc<dyn BinanceRest>,
    clock: Arc<dyn Clock>,
}

impl BinanceSource {
    /// Exchange name matched against watcher configurations.
    pub const NAME: &'static str = "binance";

    /// Source over HTTP with `config`.
    ///
    /// # Errors
    /// Returns `WatchError::Config` for an unparsable base URL or an HTTP
    /// client that cannot be constructed.
    pub fn new(config: &BinanceConfig) -> Result<Self, WatchError> {
        let base = Url::parse(&config.base_url)
            .map_err(|e| WatchError::config(format!("invalid binance url {}: {e}", config.base_url)))?;
        let rest = RealAdapter::new(base, config.timeout).map_err(|e| WatchError::config(e.to_string()))?;
        Ok(Self::with_rest(Arc::new(rest), Arc::new(SystemClock)))
    }

    /// Source over a custom transport and clock.
    #[must_use]
    pub fn with_rest(rest: Arc<dyn BinanceRest>, clock: Arc<dyn Clock>) -> Self {
        Self { rest, clock }
    }

    /// Exchange-native symbol: `"BTC/USDT"` becomes `"BTCUSDT"`.
    ///
    /// # Errors
    /// Returns `WatchError::InvalidArg` when `symbol` is not `BASE/QUOTE`.
    pub fn market_id(symbol: &str) -> Result<String, WatchError> {
        match symbol.split_once('/') {
            Some((base, quote)) if !base.is_empty() && !quote.is_empty() => {
                Ok(format!("{base}{quote}").to_ascii_uppercase())
            }
            _ => Err(WatchError::InvalidArg(format!(
                "symbol must be BASE/QUOTE, got {symbol}"
            ))),
        }
    }

    fn looks_like_unknown_symbol(err: &RestError) -> bool {
        match err {
            RestError::Status { status: 400, body } => {
                body.contains("-1121") || body.to_ascii_lowercase().contains("invalid symbol")
            }
            _ => false,
        }
    }

    fn normalize_error(err: &RestError, symbol: &str) -> WatchError {
        if Self::looks_like_unknown_symbol(err) {
            WatchError::not_found(format!("market {symbol} on {}", Self::NAME))
        } else {
            WatchError::data_source(Self::NAME, err.to_string())
        }
    }
}

#[async_trait]
impl MarketDataSource for BinanceSource {
    fn name(&self) -> &'static str {
        Self::NAME
    }

    async fn fetch_candles(
        &self,
        symbol: &str,
        req: CandleRequest,
    ) -> Result<Vec<Candle>, WatchError> {
        let id = Self::market_id(symbol)?;
        let since = req.resolve_since(self.clock.now());
        let limit = req.effective_limit().min(MAX_KLINES_LIMIT);
        let params = [
            ("symbol", id),
            ("interval", "1m".to_string()),
            ("startTime", since.timestamp_millis().to_string()),
            ("limit", limit.to_string()),
        ];
        let body = self
            .rest
            .get("/api/v3/klines", &params)
            .await
            .map_err(|e| Self::normalize_error(&e, symbol))?;
        let candles = parse_klines(&body).map_err(|msg| WatchError::data_source(Self::NAME, msg))?;
        tracing::trace!(symbol, since = %since, limit, got = candles.len(), "fetched klines");
        Ok(candles)
    }

    async fn fetch_market_info(&self, symbol: &str) -> Result<MarketInfo, WatchError> {
        let id = Self::market_id(symbol)?;
        let body = self
            .rest
            .get("/api/v3/exchangeInfo", &[("symbol", id.clone())])
            .await
            .map_err(|e| Self::normalize_error(&e, symbol))?;
        let entry = body
            .get("symbols")
            .and_then(Value::as_array)
            .and_then(|list| {
                list.iter()
                    .find(|s| s.get("symbol").and_then(Value::as_str) == Some(id.as_str()))
            })
            .ok_or_else(|| WatchError::not_found(format!("market {symbol} on {}", Self::NAME)))?;
        let text = |key: &str| {
            entry
                .get(key)
                .and_then(Value::as_str)
                .map(str::to_string)
                .ok_or_else(|| WatchError::data_source(Self::NAME, format!("exchangeInfo missing {key}")))
        };
        Ok(MarketInfo {
            symbol: id.clone(),
            base: text("baseAsset")?,
            quote: text("quoteAsset")?,
            active: entry.get("status").and_then(Value::as_str) == Some("TRADING"),
        })
    }
}
