//! OHLCV candle and market identity value types.

use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// One fixed-size (one minute) trading interval for a market.
///
/// `time` is the interval's open time in UTC and serializes as epoch milliseconds.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Candle {
    /// Interval open time.
    #[serde(with = "chrono::serde::ts_milliseconds")]
    pub time: DateTime<Utc>,
    /// First traded price in the interval.
    pub open: f64,
    /// Highest traded price in the interval.
    pub high: f64,
    /// Lowest traded price in the interval.
    pub low: f64,
    /// Last traded price in the interval.
    pub close: f64,
    /// Traded base volume in the interval.
    pub volume: f64,
}

impl Candle {
    /// Open time as UTC epoch milliseconds.
    #[must_use]
    pub fn time_ms(&self) -> i64 {
        self.time.timestamp_millis()
    }
}

/// Market identity used to group stored points and to detect duplicate watchers.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct MarketTags {
    /// Exchange name, e.g. "binance".
    pub exchange: String,
    /// Base asset, e.g. "BTC".
    pub base: String,
    /// Quote asset, e.g. "USDT".
    pub quote: String,
}

impl MarketTags {
    /// Build tags from their parts.
    pub fn new(exchange: impl Into<String>, base: impl Into<String>, quote: impl Into<String>) -> Self {
        Self {
            exchange: exchange.into(),
            base: base.into(),
            quote: quote.into(),
        }
    }

    /// Traded symbol in `BASE/QUOTE` form.
    #[must_use]
    pub fn symbol(&self) -> String {
        format!("{}/{}", self.base, self.quote)
    }

    /// Tag pairs in a stable order, suitable for query building.
    #[must_use]
    pub fn pairs(&self) -> [(&'static str, &str); 3] {
        [
            ("base", self.base.as_str()),
            ("quote", self.quote.as_str()),
            ("exchange", self.exchange.as_str()),
        ]
    }
}

impl fmt::Display for MarketTags {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({}/{})", self.exchange, self.base, self.quote)
    }
}

/// Exchange metadata for a single market.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MarketInfo {
    /// Exchange-native symbol (e.g. "BTCUSDT").
    pub symbol: String,
    /// Base asset.
    pub base: String,
    /// Quote asset.
    pub quote: String,
    /// Whether the market is currently trading.
    pub active: bool,
}
