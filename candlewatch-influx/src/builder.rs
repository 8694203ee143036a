use std::sync::Arc;
use std::time::Duration;

use candlewatch_core::{Clock, SystemClock, WatchError};
use url::Url;

use crate::adapter::{InfluxTransport, RealAdapter};
use crate::{InfluxConfig, InfluxStore};

/// Builder for [`InfluxStore`].
pub struct InfluxStoreBuilder {
    config: InfluxConfig,
    clock: Arc<dyn Clock>,
    transport: Option<Arc<dyn InfluxTransport>>,
}

impl Default for InfluxStoreBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl InfluxStoreBuilder {
    /// Builder seeded with [`InfluxConfig::default`].
    #[must_use]
    pub fn new() -> Self {
        Self {
            config: InfluxConfig::default(),
            clock: Arc::new(SystemClock),
            transport: None,
        }
    }

    /// Replace the whole configuration.
    #[must_use]
    pub fn config(mut self, config: InfluxConfig) -> Self {
        self.config = config;
        self
    }

    /// Server base URL, e.g. `http://localhost:8086`.
    #[must_use]
    pub fn url(mut self, url: impl Into<String>) -> Self {
        self.config.url = url.into();
        self
    }

    /// Database holding the candle series.
    #[must_use]
    pub fn database(mut self, database: impl Into<String>) -> Self {
        self.config.database = database.into();
        self
    }

    /// Measurement candles are written to.
    #[must_use]
    pub fn measurement(mut self, measurement: impl Into<String>) -> Self {
        self.config.measurement = measurement.into();
        self
    }

    /// Per-request timeout.
    #[must_use]
    pub const fn timeout(mut self, timeout: Duration) -> Self {
        self.config.timeout = timeout;
        self
    }

    /// Clock used to close the gap window.
    #[must_use]
    pub fn clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    /// Use a custom transport instead of the HTTP client.
    #[must_use]
    pub fn transport(mut self, transport: Arc<dyn InfluxTransport>) -> Self {
        self.transport = Some(transport);
        self
    }

    /// Build the store.
    ///
    /// # Errors
    /// Returns `WatchError::Config` for an empty database or measurement, an
    /// unparsable URL, or an HTTP client that cannot be constructed.
    pub fn build(self) -> Result<InfluxStore, WatchError> {
        if self.config.database.is_empty() {
            return Err(WatchError::config("influx database name must not be empty"));
        }
        if self.config.measurement.is_empty() {
            return Err(WatchError::config("influx measurement must not be empty"));
        }
        let transport = match self.transport {
            Some(t) => t,
            None => {
                let base = Url::parse(&self.config.url)
                    .map_err(|e| WatchError::config(format!("invalid influx url {}: {e}", self.config.url)))?;
                let real = RealAdapter::new(base, self.config.timeout)
                    .map_err(|e| WatchError::config(e.to_string()))?;
                Arc::new(real) as Arc<dyn InfluxTransport>
            }
        };
        Ok(InfluxStore::from_parts(self.config, transport, self.clock))
    }
}
