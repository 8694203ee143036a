//! Watcher identity, status, configuration and persisted record shapes.

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, TimeZone, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::candle::MarketTags;
use crate::error::WatchError;

/// Stable watcher identifier, assigned once at creation.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct WatcherId(String);

impl WatcherId {
    /// Wrap an existing identifier.
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Allocate a fresh random identifier.
    #[must_use]
    pub fn generate() -> Self {
        Self(uuid::Uuid::new_v4().to_string())
    }

    /// Borrow the identifier as a string slice.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for WatcherId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Last-known intended status of a watcher.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum WatcherStatus {
    /// The run loop has been started (not necessarily confirmed alive).
    Running,
    /// The watcher is not running.
    #[default]
    Stopped,
}

impl fmt::Display for WatcherStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Running => f.write_str("RUNNING"),
            Self::Stopped => f.write_str("STOPPED"),
        }
    }
}

/// Closed set of known watcher variants.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[non_exhaustive]
pub enum WatcherKind {
    /// Keeps one market's minute candle series complete.
    #[serde(rename = "MarketWatcher")]
    Market,
}

impl WatcherKind {
    /// Every known kind.
    pub const ALL: &'static [Self] = &[Self::Market];

    /// Type name as stored in the `type` field of a record.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Market => "MarketWatcher",
        }
    }
}

impl fmt::Display for WatcherKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for WatcherKind {
    type Err = WatchError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .iter()
            .copied()
            .find(|k| k.as_str() == s)
            .ok_or_else(|| WatchError::InvalidArg(format!("watcher type {s} doesn't exist")))
    }
}

/// Watcher configuration as received from the management layer.
///
/// `kind` stays a raw string here and is validated against [`WatcherKind`]
/// at the factory boundary. Identity fields (for market watchers: `exchange`,
/// `base`, `quote`) live at the top level; type-specific parameters live in `extra`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WatcherConfig {
    /// Identifier; absent for configurations that were never persisted.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<WatcherId>,
    /// Discriminates the concrete watcher variant.
    #[serde(rename = "type")]
    pub kind: String,
    /// Identity fields, compared when detecting duplicates.
    #[serde(flatten)]
    pub identity: Map<String, Value>,
    /// Type-specific parameter bag, ignored by duplicate detection.
    #[serde(default)]
    pub extra: Map<String, Value>,
}

impl WatcherConfig {
    /// Whether `record` carries the same type and identity fields as this configuration.
    ///
    /// Every field except the parameter bag must match.
    #[must_use]
    pub fn is_duplicate_of(&self, record: &WatcherRecord) -> bool {
        if self.kind != record.kind {
            return false;
        }
        if let Some(id) = &self.id
            && id != &record.id
        {
            return false;
        }
        self.identity
            .iter()
            .all(|(key, value)| record.identity.get(key) == Some(value))
    }
}

/// Persisted watcher record: `{id, type, status, ...identity, extra}`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WatcherRecord {
    /// Stable identifier the record is keyed by.
    pub id: WatcherId,
    /// Watcher type name.
    #[serde(rename = "type")]
    pub kind: String,
    /// Last-known intended status.
    pub status: WatcherStatus,
    /// Identity fields.
    #[serde(flatten)]
    pub identity: Map<String, Value>,
    /// Type-specific parameter bag.
    #[serde(default)]
    pub extra: Map<String, Value>,
}

impl From<WatcherRecord> for WatcherConfig {
    fn from(r: WatcherRecord) -> Self {
        Self {
            id: Some(r.id),
            kind: r.kind,
            identity: r.identity,
            extra: r.extra,
        }
    }
}

/// Refresh interval applied when a market watcher configuration omits one.
pub const DEFAULT_REFRESH_INTERVAL_MS: u64 = 30_000;

/// Smallest refresh interval a market watcher accepts.
pub const MIN_REFRESH_INTERVAL_MS: u64 = 1_000;

/// Earliest-history boundary applied when a configuration omits one.
#[must_use]
pub fn default_max_history() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2018, 1, 1, 0, 0, 0)
        .single()
        .unwrap_or(DateTime::<Utc>::UNIX_EPOCH)
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct MarketExtra {
    refresh_interval: Option<u64>,
    max_history: Option<DateTime<Utc>>,
}

/// Typed parameters of a market watcher.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MarketWatcherParams {
    /// Market identity.
    pub tags: MarketTags,
    /// Polling period in milliseconds.
    pub refresh_interval_ms: u64,
    /// Earliest timestamp backfill reaches for.
    pub max_history: DateTime<Utc>,
}

impl MarketWatcherParams {
    /// Parameters with default refresh interval and history boundary.
    #[must_use]
    pub fn new(tags: MarketTags) -> Self {
        Self {
            tags,
            refresh_interval_ms: DEFAULT_REFRESH_INTERVAL_MS,
            max_history: default_max_history(),
        }
    }

    /// Override the polling period.
    #[must_use]
    pub const fn refresh_interval_ms(mut self, ms: u64) -> Self {
        self.refresh_interval_ms = ms;
        self
    }

    /// Override the earliest-history boundary.
    #[must_use]
    pub const fn max_history(mut self, at: DateTime<Utc>) -> Self {
        self.max_history = at;
        self
    }

    /// Extract and validate market parameters from a raw configuration.
    ///
    /// Missing `extra` entries fall back to their defaults.
    ///
    /// # Errors
    /// Returns `WatchError::Config` when an identity field is missing or not a
    /// string, when `extra` is malformed, or when the refresh interval is
    /// below [`MIN_REFRESH_INTERVAL_MS`].
    pub fn from_config(cfg: &WatcherConfig) -> Result<Self, WatchError> {
        let field = |name: &str| -> Result<String, WatchError> {
            cfg.identity
                .get(name)
                .and_then(Value::as_str)
                .map(str::to_string)
                .ok_or_else(|| WatchError::config(format!("market watcher requires `{name}`")))
        };
        let tags = MarketTags::new(field("exchange")?, field("base")?, field("quote")?);
        let extra: MarketExtra = serde_json::from_value(Value::Object(cfg.extra.clone()))
            .map_err(|e| WatchError::config(format!("invalid market watcher extra: {e}")))?;
        let params = Self {
            tags,
            refresh_interval_ms: extra.refresh_interval.unwrap_or(DEFAULT_REFRESH_INTERVAL_MS),
            max_history: extra.max_history.unwrap_or_else(default_max_history),
        };
        params.validate()?;
        Ok(params)
    }

    /// Reject parameters no watcher can run with.
    ///
    /// # Errors
    /// Returns `WatchError::Config` when the refresh interval is below one second.
    pub fn validate(&self) -> Result<(), WatchError> {
        if self.refresh_interval_ms < MIN_REFRESH_INTERVAL_MS {
            return Err(WatchError::config(format!(
                "cannot create market watcher with refreshInterval < {MIN_REFRESH_INTERVAL_MS} (got {})",
                self.refresh_interval_ms
            )));
        }
        Ok(())
    }

    /// Render back into the raw configuration shape.
    #[must_use]
    pub fn to_config(&self, id: Option<WatcherId>) -> WatcherConfig {
        let mut identity = Map::new();
        identity.insert("exchange".into(), Value::String(self.tags.exchange.clone()));
        identity.insert("base".into(), Value::String(self.tags.base.clone()));
        identity.insert("quote".into(), Value::String(self.tags.quote.clone()));
        let mut extra = Map::new();
        extra.insert("refreshInterval".into(), Value::from(self.refresh_interval_ms));
        extra.insert(
            "maxHistory".into(),
            Value::String(self.max_history.to_rfc3339_opts(chrono::SecondsFormat::Secs, true)),
        );
        WatcherConfig {
            id,
            kind: WatcherKind::Market.as_str().to_string(),
            identity,
            extra,
        }
    }
}
