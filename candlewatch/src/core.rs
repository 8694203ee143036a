use std::sync::Arc;

use candlewatch_core::{
    CandlewatchConfig, Clock, ConfigStore, MarketDataSource, MarketInfo, SupervisorConfig,
    SystemClock, TimeSeriesStore, WatchError, WatcherConfig, WatcherId, WatcherKind,
    WatcherRecord,
};

use crate::factory::{SourceRegistry, WatcherFactory};
use crate::registry::WatcherRegistry;
use crate::watcher::Watcher;

/// Result of [`Candlewatch::start_watcher`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StartOutcome {
    /// The watcher was rebuilt from its record and started.
    Started,
    /// The watcher was already running; nothing changed.
    AlreadyRunning,
}

/// Watcher service: creates, starts, stops and deletes watchers, keeping the
/// persisted records and the in-process registry in step.
pub struct Candlewatch {
    pub(crate) factory: WatcherFactory,
    pub(crate) records: Arc<dyn ConfigStore>,
    pub(crate) store: Arc<dyn TimeSeriesStore>,
    pub(crate) registry: WatcherRegistry,
}

/// Builder for constructing a [`Candlewatch`] service.
pub struct CandlewatchBuilder {
    sources: SourceRegistry,
    records: Option<Arc<dyn ConfigStore>>,
    store: Option<Arc<dyn TimeSeriesStore>>,
    cfg: CandlewatchConfig,
    clock: Arc<dyn Clock>,
}

impl Default for CandlewatchBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl CandlewatchBuilder {
    /// Create a new builder with default supervision settings and no collaborators.
    #[must_use]
    pub fn new() -> Self {
        Self {
            sources: SourceRegistry::new(),
            records: None,
            store: None,
            cfg: CandlewatchConfig::default(),
            clock: Arc::new(SystemClock),
        }
    }

    /// Register a market data source; watchers select it by its name.
    #[must_use]
    pub fn with_source(mut self, source: Arc<dyn MarketDataSource>) -> Self {
        self.sources.insert(source);
        self
    }

    /// Set the watcher record store.
    #[must_use]
    pub fn config_store(mut self, records: Arc<dyn ConfigStore>) -> Self {
        self.records = Some(records);
        self
    }

    /// Set the time-series store injected into every watcher.
    #[must_use]
    pub fn time_series_store(mut self, store: Arc<dyn TimeSeriesStore>) -> Self {
        self.store = Some(store);
        self
    }

    /// Replace the whole configuration.
    #[must_use]
    pub fn config(mut self, cfg: CandlewatchConfig) -> Self {
        self.cfg = cfg;
        self
    }

    /// Set the restart policy and stop behavior of every watcher.
    #[must_use]
    pub fn supervisor(mut self, supervisor: SupervisorConfig) -> Self {
        self.cfg.supervisor = supervisor;
        self
    }

    /// Set the clock handed to market watchers.
    #[must_use]
    pub fn clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    /// Build the service.
    ///
    /// # Errors
    /// Returns `WatchError::Config` when the record store or the time-series
    /// store is missing.
    pub fn build(self) -> Result<Candlewatch, WatchError> {
        let records = self
            .records
            .ok_or_else(|| WatchError::config("a config store is required"))?;
        let store = self
            .store
            .ok_or_else(|| WatchError::config("a time-series store is required"))?;
        let factory = WatcherFactory::new(self.sources, Arc::clone(&records), self.cfg.supervisor)
            .with_clock(self.clock);
        Ok(Candlewatch {
            factory,
            records,
            store,
            registry: WatcherRegistry::new(),
        })
    }
}

impl Candlewatch {
    /// Start building a service.
    #[must_use]
    pub fn builder() -> CandlewatchBuilder {
        CandlewatchBuilder::new()
    }

    /// The in-process registry of started watchers.
    #[must_use]
    pub const fn registry(&self) -> &WatcherRegistry {
        &self.registry
    }

    fn spawnable(&self, cfg: &WatcherConfig) -> Result<Arc<Watcher>, WatchError> {
        let watcher = self.factory.build(cfg)?;
        watcher.set_store(Arc::clone(&self.store));
        Ok(Arc::new(watcher))
    }

    /// Retire any instance registered under the same id, then run and register `watcher`.
    ///
    /// The previous instance persists STOPPED before the new one persists RUNNING.
    async fn launch(&self, watcher: Arc<Watcher>) {
        if let Some(previous) = self.registry.remove(watcher.id()) {
            previous.stop().await;
        }
        watcher.run().await;
        self.registry.insert(watcher);
    }

    /// Create, persist and start a watcher; returns its new id.
    ///
    /// # Errors
    /// - `WatchError::InvalidArg` when `cfg` carries an id, names an unknown
    ///   type, or duplicates an existing watcher.
    /// - `WatchError::Config` for invalid parameters.
    /// - Record store failures while checking for duplicates.
    pub async fn create_watcher(&self, cfg: WatcherConfig) -> Result<WatcherId, WatchError> {
        if cfg.id.is_some() {
            return Err(WatchError::InvalidArg("watcher id must not be provided".into()));
        }
        cfg.kind.parse::<WatcherKind>()?;
        let existing = self.records.find_all().await?;
        if existing.iter().any(|r| cfg.is_duplicate_of(r)) {
            return Err(WatchError::InvalidArg("watcher already exists".into()));
        }
        let watcher = self.spawnable(&cfg)?;
        let id = watcher.id().clone();
        self.launch(watcher).await;
        tracing::info!(watcher_id = %id, kind = %cfg.kind, "watcher created");
        Ok(id)
    }

    /// Start a persisted watcher unless it is already running.
    ///
    /// # Errors
    /// - `WatchError::NotFound` when no record exists for `id`.
    /// - Construction errors of the persisted configuration.
    pub async fn start_watcher(&self, id: &WatcherId) -> Result<StartOutcome, WatchError> {
        if self.registry.is_active(id) {
            return Ok(StartOutcome::AlreadyRunning);
        }
        let record = self
            .records
            .find_by_id(id)
            .await?
            .ok_or_else(|| WatchError::not_found(format!("watcher {id}")))?;
        let watcher = self.spawnable(&record.into())?;
        self.launch(watcher).await;
        Ok(StartOutcome::Started)
    }

    /// Stop a running watcher and unregister it. Stopping an idle watcher succeeds.
    pub async fn stop_watcher(&self, id: &WatcherId) {
        if let Some(watcher) = self.registry.remove(id) {
            watcher.stop().await;
        }
    }

    /// Stop (if running) and delete a watcher.
    ///
    /// # Errors
    /// - `WatchError::NotFound` when no record exists for `id`.
    /// - Record store failures.
    pub async fn delete_watcher(&self, id: &WatcherId) -> Result<(), WatchError> {
        self.stop_watcher(id).await;
        if !self.records.delete(id).await? {
            return Err(WatchError::not_found(format!("watcher {id}")));
        }
        tracing::info!(watcher_id = %id, "watcher deleted");
        Ok(())
    }

    /// Every persisted watcher record.
    ///
    /// # Errors
    /// Propagates record store failures.
    pub async fn list_watchers(&self) -> Result<Vec<WatcherRecord>, WatchError> {
        self.records.find_all().await
    }

    /// One persisted watcher record.
    ///
    /// # Errors
    /// `WatchError::NotFound` when no record exists for `id`.
    pub async fn get_watcher(&self, id: &WatcherId) -> Result<WatcherRecord, WatchError> {
        self.records
            .find_by_id(id)
            .await?
            .ok_or_else(|| WatchError::not_found(format!("watcher {id}")))
    }

    /// Start every persisted watcher that is not already running.
    ///
    /// # Errors
    /// Fails on the first record that cannot be rebuilt; watchers started
    /// before it keep running.
    pub async fn restart_all(&self) -> Result<usize, WatchError> {
        let records = self.records.find_all().await?;
        let mut started = 0;
        for record in records {
            let id = record.id.clone();
            if self.registry.is_active(&id) {
                continue;
            }
            match self.spawnable(&record.into()) {
                Ok(watcher) => {
                    self.launch(watcher).await;
                    started += 1;
                }
                Err(e) => {
                    if let Some(stale) = self.registry.remove(&id) {
                        stale.stop().await;
                    }
                    tracing::error!(watcher_id = %id, error = %e, "failed to restart watcher");
                    return Err(e);
                }
            }
        }
        tracing::info!(started, "watchers restarted");
        Ok(started)
    }

    /// Stop every running watcher concurrently and clear the registry.
    pub async fn stop_all(&self) {
        let watchers = self.registry.drain();
        futures::future::join_all(watchers.iter().map(|w| w.stop())).await;
    }

    /// Stop every running watcher and delete every record.
    ///
    /// # Errors
    /// Propagates record store failures.
    pub async fn delete_all(&self) -> Result<(), WatchError> {
        self.stop_all().await;
        self.records.delete_all().await
    }

    /// Exchange metadata for `symbol` on `exchange`.
    ///
    /// # Errors
    /// `WatchError::Config` for an unknown exchange, or the source's failure.
    pub async fn fetch_market_info(&self, exchange: &str, symbol: &str) -> Result<MarketInfo, WatchError> {
        self.factory.sources().get(exchange)?.fetch_market_info(symbol).await
    }
}
