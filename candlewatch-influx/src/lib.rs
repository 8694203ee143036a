//! candlewatch-influx
//!
//! [`TimeSeriesStore`] implementation over the InfluxDB 1.x HTTP API. Candles
//! are written as points of one measurement (default `OHLC`) tagged with
//! `base`, `quote` and `exchange`, fields `open`, `high`, `low`, `close` and
//! `volume`, at millisecond precision. Gaps are found with a sentinel-filled
//! `GROUP BY time(1m)` query.
#![warn(missing_docs)]

/// Transport abstraction and the production adapter backed by `reqwest`.
pub mod adapter;
mod builder;
/// Line protocol and InfluxQL literal rendering.
pub mod line;
/// `/query` response decoding.
pub mod response;

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use candlewatch_core::{
    Candle, Clock, GAP_SENTINEL, Granularity, MarketTags, TimeSeriesStore, WatchError, floor_to,
    last_closed_minute,
};

use adapter::InfluxTransport;
pub use builder::InfluxStoreBuilder;
use line::{candle_line, quote_ident, tag_predicate};
use response::{Series, as_count, as_time, first_statement_series};

/// Connection settings of an [`InfluxStore`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InfluxConfig {
    /// Server base URL.
    pub url: String,
    /// Database holding the candle series.
    pub database: String,
    /// Measurement candles are written to.
    pub measurement: String,
    /// Per-request timeout.
    pub timeout: Duration,
}

impl Default for InfluxConfig {
    fn default() -> Self {
        Self {
            url: "http://localhost:8086".into(),
            database: "candlewatch".into(),
            measurement: "OHLC".into(),
            timeout: Duration::from_secs(10),
        }
    }
}

/// Time-series store backed by InfluxDB.
pub struct InfluxStore {
    config: InfluxConfig,
    transport: Arc<dyn InfluxTransport>,
    clock: Arc<dyn Clock>,
}

impl InfluxStore {
    /// Start building a store.
    #[must_use]
    pub fn builder() -> InfluxStoreBuilder {
        InfluxStoreBuilder::new()
    }

    /// Store over HTTP with `config` and the system clock.
    ///
    /// # Errors
    /// See [`InfluxStoreBuilder::build`].
    pub fn new(config: InfluxConfig) -> Result<Self, WatchError> {
        InfluxStoreBuilder::new().config(config).build()
    }

    pub(crate) fn from_parts(
        config: InfluxConfig,
        transport: Arc<dyn InfluxTransport>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            config,
            transport,
            clock,
        }
    }

    /// Active configuration.
    #[must_use]
    pub const fn config(&self) -> &InfluxConfig {
        &self.config
    }

    async fn run(&self, op: &str, statement: &str) -> Result<Vec<Series>, WatchError> {
        let body = self
            .transport
            .query(Some(&self.config.database), statement)
            .await
            .map_err(|e| WatchError::store(op, statement, e.to_string()))?;
        first_statement_series(body).map_err(|msg| WatchError::store(op, statement, msg))
    }

    /// Create the database when it does not exist yet.
    ///
    /// # Errors
    /// Returns `WatchError::Store` when the server cannot be queried.
    pub async fn init(&self) -> Result<(), WatchError> {
        let show = "SHOW DATABASES";
        let body = self
            .transport
            .query(None, show)
            .await
            .map_err(|e| WatchError::store("init", show, e.to_string()))?;
        let series = first_statement_series(body).map_err(|msg| WatchError::store("init", show, msg))?;
        let exists = series
            .iter()
            .flat_map(|s| s.values.iter())
            .any(|row| row.first().and_then(|v| v.as_str()) == Some(self.config.database.as_str()));
        if exists {
            tracing::debug!(database = %self.config.database, "influx database present");
            return Ok(());
        }
        let create = format!("CREATE DATABASE {}", quote_ident(&self.config.database));
        let body = self
            .transport
            .query(None, &create)
            .await
            .map_err(|e| WatchError::store("init", &create, e.to_string()))?;
        first_statement_series(body).map_err(|msg| WatchError::store("init", &create, msg))?;
        tracing::info!(database = %self.config.database, "created influx database");
        Ok(())
    }

    /// Delete every stored point of one market.
    ///
    /// # Errors
    /// Returns `WatchError::Store` when the statement fails.
    pub async fn drop_series(&self, tags: &MarketTags) -> Result<(), WatchError> {
        let statement = format!(
            "DROP SERIES FROM {} WHERE {}",
            quote_ident(&self.config.measurement),
            tag_predicate(tags)
        );
        self.run("drop_series", &statement).await?;
        tracing::info!(market = %tags, "dropped series");
        Ok(())
    }

    async fn first_point(&self, tags: &MarketTags) -> Result<Option<DateTime<Utc>>, WatchError> {
        let statement = format!(
            "SELECT first(\"close\") FROM {} WHERE {}",
            quote_ident(&self.config.measurement),
            tag_predicate(tags)
        );
        let series = self.run("gaps", &statement).await?;
        let Some(s) = series.first() else {
            return Ok(None);
        };
        let idx = s.column("time").unwrap_or(0);
        Ok(s.values.first().and_then(|row| row.get(idx)).and_then(as_time))
    }
}

#[async_trait]
impl TimeSeriesStore for InfluxStore {
    async fn write(&self, tags: &MarketTags, candles: &[Candle]) -> Result<(), WatchError> {
        if candles.is_empty() {
            return Ok(());
        }
        let mut body = String::with_capacity(candles.len() * 96);
        let mut skipped = 0usize;
        for candle in candles {
            match candle_line(&self.config.measurement, tags, candle) {
                Some(line) => {
                    body.push_str(&line);
                    body.push('\n');
                }
                None => skipped += 1,
            }
        }
        if skipped > 0 {
            tracing::warn!(market = %tags, skipped, "skipping candles with non-finite fields");
        }
        if body.is_empty() {
            return Ok(());
        }
        self.transport
            .write(&self.config.database, body)
            .await
            .map_err(|e| {
                WatchError::store(
                    "write",
                    format!("{}.{} {tags}", self.config.database, self.config.measurement),
                    e.to_string(),
                )
            })?;
        tracing::trace!(market = %tags, points = candles.len() - skipped, "wrote points");
        Ok(())
    }

    async fn count(&self, tags: &MarketTags) -> Result<u64, WatchError> {
        let statement = format!(
            "SELECT count(\"close\") FROM {} WHERE {}",
            quote_ident(&self.config.measurement),
            tag_predicate(tags)
        );
        let series = self.run("count", &statement).await?;
        let Some(s) = series.first() else {
            return Ok(0);
        };
        let idx = s
            .column("count")
            .ok_or_else(|| WatchError::store("count", &statement, "missing count column"))?;
        s.values
            .first()
            .and_then(|row| row.get(idx))
            .map_or(Ok(0), |v| {
                as_count(v).ok_or_else(|| WatchError::store("count", &statement, format!("bad count value {v}")))
            })
    }

    async fn gaps(
        &self,
        tags: &MarketTags,
        granularity: Granularity,
    ) -> Result<Vec<DateTime<Utc>>, WatchError> {
        let Some(first) = self.first_point(tags).await? else {
            return Ok(Vec::new());
        };
        let width = granularity.duration();
        let from = floor_to(first, width);
        let until = last_closed_minute(self.clock.now());
        if until < from {
            return Ok(Vec::new());
        }
        let statement = format!(
            "SELECT * FROM (SELECT max(\"close\") AS \"close\" FROM {m} WHERE {p} AND time >= {from}ms AND time <= {until}ms GROUP BY time({g}) fill({s})) WHERE \"close\" = {s}",
            m = quote_ident(&self.config.measurement),
            p = tag_predicate(tags),
            from = from.timestamp_millis(),
            until = until.timestamp_millis(),
            g = granularity.as_influx(),
            s = GAP_SENTINEL,
        );
        let series = self.run("gaps", &statement).await?;
        let mut out = Vec::new();
        for s in &series {
            let idx = s.column("time").unwrap_or(0);
            for row in &s.values {
                let ts = row
                    .get(idx)
                    .and_then(as_time)
                    .ok_or_else(|| WatchError::store("gaps", &statement, "bad time value"))?;
                out.push(ts);
            }
        }
        out.sort_unstable();
        Ok(out)
    }
}
