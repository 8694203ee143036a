use std::collections::BTreeMap;
use std::sync::Arc;

use candlewatch_core::{
    Clock, ConfigStore, MarketDataSource, MarketWatcherParams, SupervisorConfig, SystemClock,
    WatchError, WatcherConfig, WatcherKind,
};

use crate::watcher::Watcher;
use crate::watcher::market::MarketWatcher;

/// Market data sources keyed by exchange name.
#[derive(Clone, Default)]
pub struct SourceRegistry {
    sources: BTreeMap<String, Arc<dyn MarketDataSource>>,
}

impl SourceRegistry {
    /// Empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Register `source` under its own name, replacing any previous one.
    pub fn insert(&mut self, source: Arc<dyn MarketDataSource>) {
        self.sources.insert(source.name().to_string(), source);
    }

    /// Source serving `exchange`.
    ///
    /// # Errors
    /// Returns `WatchError::Config` when no source is registered for `exchange`.
    pub fn get(&self, exchange: &str) -> Result<Arc<dyn MarketDataSource>, WatchError> {
        self.sources
            .get(exchange)
            .cloned()
            .ok_or_else(|| WatchError::config(format!("no market data source for exchange {exchange}")))
    }

    /// Registered exchange names, sorted.
    #[must_use]
    pub fn names(&self) -> Vec<&str> {
        self.sources.keys().map(String::as_str).collect()
    }
}

/// Builds watchers from raw configurations, validating the `type` field
/// against the closed set of [`WatcherKind`]s.
#[derive(Clone)]
pub struct WatcherFactory {
    sources: SourceRegistry,
    records: Arc<dyn ConfigStore>,
    supervisor: SupervisorConfig,
    clock: Arc<dyn Clock>,
}

impl WatcherFactory {
    /// Factory over `sources` persisting into `records`.
    #[must_use]
    pub fn new(sources: SourceRegistry, records: Arc<dyn ConfigStore>, supervisor: SupervisorConfig) -> Self {
        Self {
            sources,
            records,
            supervisor,
            clock: Arc::new(SystemClock),
        }
    }

    /// Replace the clock handed to built watchers.
    #[must_use]
    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    /// Registered sources.
    #[must_use]
    pub const fn sources(&self) -> &SourceRegistry {
        &self.sources
    }

    /// Construct a (stopped) watcher for `cfg`, keeping `cfg.id` when present.
    ///
    /// # Errors
    /// - `WatchError::InvalidArg` for an unknown `type`.
    /// - `WatchError::Config` for invalid parameters or an unknown exchange.
    pub fn build(&self, cfg: &WatcherConfig) -> Result<Watcher, WatchError> {
        let kind: WatcherKind = cfg.kind.parse()?;
        let task = match kind {
            WatcherKind::Market => {
                let params = MarketWatcherParams::from_config(cfg)?;
                let source = self.sources.get(&params.tags.exchange)?;
                MarketWatcher::new(params, source)?.with_clock(Arc::clone(&self.clock))
            }
            other => return Err(WatchError::unsupported(format!("watcher type {other}"))),
        };
        Ok(Watcher::new(
            cfg.id.clone(),
            Arc::new(task),
            Arc::clone(&self.records),
            self.supervisor.clone(),
        ))
    }
}
