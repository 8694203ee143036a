use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::{Candle, MarketInfo, WatchError};

/// Per-request candle cap shared by the supported exchanges.
pub const MAX_CANDLES_PER_REQUEST: usize = 500;

/// Parameters of a single candle fetch.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct CandleRequest {
    /// Maximum number of one-minute candles to return (`0` is read as `1`).
    pub limit: usize,
    /// First interval to return; `None` means `now - limit` minutes.
    pub since: Option<DateTime<Utc>>,
}

impl CandleRequest {
    /// The `limit` most recent candles.
    #[must_use]
    pub const fn latest(limit: usize) -> Self {
        Self { limit, since: None }
    }

    /// Up to `limit` candles starting at `since`.
    #[must_use]
    pub const fn since(since: DateTime<Utc>, limit: usize) -> Self {
        Self {
            limit,
            since: Some(since),
        }
    }

    /// Limit with the zero case normalized.
    #[must_use]
    pub const fn effective_limit(&self) -> usize {
        if self.limit == 0 { 1 } else { self.limit }
    }

    /// Start timestamp, resolving the default relative to `now`.
    #[must_use]
    pub fn resolve_since(&self, now: DateTime<Utc>) -> DateTime<Utc> {
        self.since.unwrap_or_else(|| {
            let minutes = i64::try_from(self.effective_limit()).unwrap_or(i64::MAX);
            now - chrono::Duration::minutes(minutes)
        })
    }
}

/// Exchange connectivity consumed by market watchers.
///
/// Implementations must be safe to share between concurrently running
/// watchers. Any failure is reported as `WatchError::DataSource` (or
/// `Unsupported` when the exchange cannot serve candles at all); callers
/// treat it as "phase failed, try later".
#[async_trait]
pub trait MarketDataSource: Send + Sync {
    /// A stable exchange name, matched against the `exchange` field of watcher configs.
    fn name(&self) -> &'static str;

    /// Fetch up to `req.limit` one-minute candles for `symbol` (`BASE/QUOTE`),
    /// oldest first.
    async fn fetch_candles(
        &self,
        symbol: &str,
        req: CandleRequest,
    ) -> Result<Vec<Candle>, WatchError>;

    /// Fetch exchange metadata for `symbol`.
    async fn fetch_market_info(&self, symbol: &str) -> Result<MarketInfo, WatchError>;
}
