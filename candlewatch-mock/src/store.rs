use std::collections::{BTreeMap, HashMap, VecDeque};
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tokio::sync::Mutex;

use candlewatch_core::{
    Candle, Clock, ConfigStore, Granularity, MarketTags, SystemClock, TimeSeriesStore, WatchError,
    WatcherId, WatcherRecord, find_gaps, floor_minute, last_closed_minute,
};

/// Operation selector for injected store failures.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum StoreOp {
    /// `TimeSeriesStore::write`.
    Write,
    /// `TimeSeriesStore::count`.
    Count,
    /// `TimeSeriesStore::gaps`.
    Gaps,
}

#[derive(Default)]
struct SeriesState {
    series: HashMap<MarketTags, BTreeMap<DateTime<Utc>, Candle>>,
    failures: HashMap<StoreOp, VecDeque<WatchError>>,
    write_calls: usize,
}

impl SeriesState {
    fn take_failure(&mut self, op: StoreOp) -> Result<(), WatchError> {
        match self.failures.get_mut(&op).and_then(VecDeque::pop_front) {
            Some(err) => Err(err),
            None => Ok(()),
        }
    }
}

/// In-memory time-series store with minute-keyed series per market.
///
/// Writing a minute twice keeps only the latest candle. The gap window ends
/// at the last closed minute of the injected clock.
pub struct MemoryStore {
    state: Mutex<SeriesState>,
    clock: Arc<dyn Clock>,
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryStore {
    /// Store backed by the system clock.
    #[must_use]
    pub fn new() -> Self {
        Self::with_clock(Arc::new(SystemClock))
    }

    /// Store whose gap window is computed from `clock`.
    #[must_use]
    pub fn with_clock(clock: Arc<dyn Clock>) -> Self {
        Self {
            state: Mutex::new(SeriesState::default()),
            clock,
        }
    }

    /// Make the next call of `op` fail with `err`. Failures queue up in order.
    pub async fn fail_next(&self, op: StoreOp, err: WatchError) {
        let mut guard = self.state.lock().await;
        guard.failures.entry(op).or_default().push_back(err);
    }

    /// Snapshot of the stored series for `tags`, oldest first.
    pub async fn candles(&self, tags: &MarketTags) -> Vec<Candle> {
        let guard = self.state.lock().await;
        guard
            .series
            .get(tags)
            .map(|s| s.values().copied().collect())
            .unwrap_or_default()
    }

    /// Number of `write` calls that reached the store, failed ones included.
    pub async fn write_calls(&self) -> usize {
        self.state.lock().await.write_calls
    }
}

#[async_trait]
impl TimeSeriesStore for MemoryStore {
    async fn write(&self, tags: &MarketTags, candles: &[Candle]) -> Result<(), WatchError> {
        let mut guard = self.state.lock().await;
        guard.write_calls += 1;
        guard.take_failure(StoreOp::Write)?;
        let series = guard.series.entry(tags.clone()).or_default();
        for candle in candles {
            series.insert(floor_minute(candle.time), *candle);
        }
        Ok(())
    }

    async fn count(&self, tags: &MarketTags) -> Result<u64, WatchError> {
        let mut guard = self.state.lock().await;
        guard.take_failure(StoreOp::Count)?;
        let n = guard.series.get(tags).map_or(0, BTreeMap::len);
        Ok(n as u64)
    }

    async fn gaps(
        &self,
        tags: &MarketTags,
        granularity: Granularity,
    ) -> Result<Vec<DateTime<Utc>>, WatchError> {
        let mut guard = self.state.lock().await;
        guard.take_failure(StoreOp::Gaps)?;
        let Some(series) = guard.series.get(tags) else {
            return Ok(Vec::new());
        };
        let until = last_closed_minute(self.clock.now());
        Ok(find_gaps(
            series.values().map(|c| (c.time, c.close)),
            granularity.duration(),
            until,
        ))
    }
}

#[derive(Default)]
struct RecordState {
    records: BTreeMap<WatcherId, WatcherRecord>,
    failures: VecDeque<WatchError>,
}

/// In-memory watcher record store.
#[derive(Default)]
pub struct MemoryConfigStore {
    state: Mutex<RecordState>,
}

impl MemoryConfigStore {
    /// Empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Store pre-populated with `records`.
    #[must_use]
    pub fn with_records(records: impl IntoIterator<Item = WatcherRecord>) -> Self {
        let state = RecordState {
            records: records.into_iter().map(|r| (r.id.clone(), r)).collect(),
            failures: VecDeque::new(),
        };
        Self {
            state: Mutex::new(state),
        }
    }

    /// Make the next call (of any operation) fail with `err`.
    pub async fn fail_next(&self, err: WatchError) {
        self.state.lock().await.failures.push_back(err);
    }

    /// Snapshot of one record without consuming injected failures.
    pub async fn peek(&self, id: &WatcherId) -> Option<WatcherRecord> {
        self.state.lock().await.records.get(id).cloned()
    }

    /// Number of stored records without consuming injected failures.
    pub async fn len(&self) -> usize {
        self.state.lock().await.records.len()
    }

    /// Whether the store holds no records.
    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }
}

impl RecordState {
    fn take_failure(&mut self) -> Result<(), WatchError> {
        self.failures.pop_front().map_or(Ok(()), Err)
    }
}

#[async_trait]
impl ConfigStore for MemoryConfigStore {
    async fn find_by_id(&self, id: &WatcherId) -> Result<Option<WatcherRecord>, WatchError> {
        let mut guard = self.state.lock().await;
        guard.take_failure()?;
        Ok(guard.records.get(id).cloned())
    }

    async fn find_all(&self) -> Result<Vec<WatcherRecord>, WatchError> {
        let mut guard = self.state.lock().await;
        guard.take_failure()?;
        Ok(guard.records.values().cloned().collect())
    }

    async fn upsert(&self, record: WatcherRecord) -> Result<(), WatchError> {
        let mut guard = self.state.lock().await;
        guard.take_failure()?;
        guard.records.insert(record.id.clone(), record);
        Ok(())
    }

    async fn delete(&self, id: &WatcherId) -> Result<bool, WatchError> {
        let mut guard = self.state.lock().await;
        guard.take_failure()?;
        Ok(guard.records.remove(id).is_some())
    }

    async fn delete_all(&self) -> Result<(), WatchError> {
        let mut guard = self.state.lock().await;
        guard.take_failure()?;
        guard.records.clear();
        Ok(())
    }
}
