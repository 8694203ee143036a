use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::{Candle, MarketTags, WatchError, WatcherId, WatcherRecord};

/// Bucket width used by gap queries.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[non_exhaustive]
pub enum Granularity {
    /// One-minute buckets.
    #[default]
    Minute,
}

impl Granularity {
    /// Bucket width.
    #[must_use]
    pub fn duration(self) -> chrono::Duration {
        match self {
            Self::Minute => chrono::Duration::minutes(1),
        }
    }

    /// InfluxQL duration literal.
    #[must_use]
    pub const fn as_influx(self) -> &'static str {
        match self {
            Self::Minute => "1m",
        }
    }
}

/// Time-series persistence for candle points tagged by market identity.
///
/// Writes are idempotent per market and minute: writing a minute that is
/// already stored overwrites it. Errors carry the operation and the query
/// context they were issued with.
#[async_trait]
pub trait TimeSeriesStore: Send + Sync {
    /// Write candles as points tagged with `tags`.
    async fn write(&self, tags: &MarketTags, candles: &[Candle]) -> Result<(), WatchError>;

    /// Count stored points for `tags`.
    async fn count(&self, tags: &MarketTags) -> Result<u64, WatchError>;

    /// Bucket-aligned timestamps in the series of `tags` with no data, ascending.
    ///
    /// Buckets span the series from its first stored point up to the last
    /// fully elapsed bucket.
    async fn gaps(
        &self,
        tags: &MarketTags,
        granularity: Granularity,
    ) -> Result<Vec<DateTime<Utc>>, WatchError>;
}

/// Watcher record persistence keyed by watcher id.
#[async_trait]
pub trait ConfigStore: Send + Sync {
    /// Fetch one record.
    async fn find_by_id(&self, id: &WatcherId) -> Result<Option<WatcherRecord>, WatchError>;

    /// Fetch every record.
    async fn find_all(&self) -> Result<Vec<WatcherRecord>, WatchError>;

    /// Insert or replace the record keyed by `record.id`.
    async fn upsert(&self, record: WatcherRecord) -> Result<(), WatchError>;

    /// Delete one record; returns whether it existed.
    async fn delete(&self, id: &WatcherId) -> Result<bool, WatchError>;

    /// Delete every record.
    async fn delete_all(&self) -> Result<(), WatchError>;
}
