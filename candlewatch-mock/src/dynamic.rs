use std::collections::{HashMap, VecDeque};
use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::{Mutex, watch};

use candlewatch_core::{Candle, CandleRequest, MarketDataSource, MarketInfo, WatchError};

/// Scripted outcome of one mocked exchange call.
#[derive(Clone)]
pub enum MockBehavior<T> {
    /// Answer with this value.
    Return(T),
    /// Answer with this error.
    Fail(WatchError),
    /// Hang indefinitely (simulate a stalled request).
    Hang,
}

type CandleFn = Arc<dyn Fn(&CandleRequest) -> Result<Vec<Candle>, WatchError> + Send + Sync>;

#[derive(Clone)]
enum CandleRule {
    Behavior(MockBehavior<Vec<Candle>>),
    Handler(CandleFn),
}

enum Resolved {
    Done(Result<Vec<Candle>, WatchError>),
    Hang,
}

impl CandleRule {
    fn resolve(self, req: &CandleRequest) -> Resolved {
        match self {
            Self::Behavior(MockBehavior::Return(v)) => Resolved::Done(Ok(v)),
            Self::Behavior(MockBehavior::Fail(e)) => Resolved::Done(Err(e)),
            Self::Behavior(MockBehavior::Hang) => Resolved::Hang,
            Self::Handler(f) => Resolved::Done(f(req)),
        }
    }
}

#[derive(Default)]
struct InternalState {
    scripted: HashMap<String, VecDeque<MockBehavior<Vec<Candle>>>>,
    candle_rules: HashMap<String, CandleRule>,
    info_rules: HashMap<String, MockBehavior<MarketInfo>>,
    candle_requests: Vec<(String, CandleRequest)>,
}

/// Test-side handle that scripts a [`DynamicMockSource`] and inspects its call log.
pub struct DynamicMockController {
    state: Arc<Mutex<InternalState>>,
    calls: watch::Receiver<usize>,
}

impl DynamicMockController {
    /// Queue a one-shot behavior for the next unscripted `fetch_candles` call on `symbol`.
    ///
    /// Queued behaviors are consumed in order before the standing rule applies.
    pub async fn push_candles(&self, symbol: &str, behavior: MockBehavior<Vec<Candle>>) {
        let mut guard = self.state.lock().await;
        guard
            .scripted
            .entry(symbol.to_string())
            .or_default()
            .push_back(behavior);
    }

    /// Set the standing behavior for `fetch_candles` on `symbol`.
    pub async fn set_candles(&self, symbol: &str, behavior: MockBehavior<Vec<Candle>>) {
        let mut guard = self.state.lock().await;
        guard
            .candle_rules
            .insert(symbol.to_string(), CandleRule::Behavior(behavior));
    }

    /// Answer `fetch_candles` on `symbol` by calling `f` with the request.
    pub async fn set_candles_fn<F>(&self, symbol: &str, f: F)
    where
        F: Fn(&CandleRequest) -> Result<Vec<Candle>, WatchError> + Send + Sync + 'static,
    {
        let mut guard = self.state.lock().await;
        guard
            .candle_rules
            .insert(symbol.to_string(), CandleRule::Handler(Arc::new(f)));
    }

    /// Set the behavior for `fetch_market_info` on `symbol`.
    pub async fn set_market_info(&self, symbol: &str, behavior: MockBehavior<MarketInfo>) {
        let mut guard = self.state.lock().await;
        guard.info_rules.insert(symbol.to_string(), behavior);
    }

    /// Return a copy of the `fetch_candles` request log.
    pub async fn candle_requests(&self) -> Vec<(String, CandleRequest)> {
        self.state.lock().await.candle_requests.clone()
    }

    /// Number of `fetch_candles` calls observed so far.
    #[must_use]
    pub fn candle_calls(&self) -> usize {
        *self.calls.borrow()
    }

    /// Resolve once at least `n` `fetch_candles` calls have been observed.
    pub async fn wait_for_candle_calls(&self, n: usize) {
        let mut rx = self.calls.clone();
        let _ = rx.wait_for(|c| *c >= n).await;
    }

    /// Forget every scripted behavior and the request log.
    pub async fn clear_all_behaviors(&self) {
        let mut guard = self.state.lock().await;
        guard.scripted.clear();
        guard.candle_rules.clear();
        guard.info_rules.clear();
        guard.candle_requests.clear();
    }
}

/// A market data source that defers all behavior to an external controller.
///
/// Unconfigured symbols return no candles and no market info.
pub struct DynamicMockSource {
    name: &'static str,
    state: Arc<Mutex<InternalState>>,
    calls: watch::Sender<usize>,
}

impl DynamicMockSource {
    /// Create a new dynamic mock source and its controller.
    #[must_use]
    pub fn new_with_controller(
        name: &'static str,
    ) -> (Arc<dyn MarketDataSource>, DynamicMockController) {
        let (me, controller) = Self::new_typed(name);
        (me as Arc<dyn MarketDataSource>, controller)
    }

    /// Like [`Self::new_with_controller`] but keeps the concrete type.
    #[must_use]
    pub fn new_typed(name: &'static str) -> (Arc<Self>, DynamicMockController) {
        let state = Arc::new(Mutex::new(InternalState::default()));
        let (tx, rx) = watch::channel(0usize);
        let controller = DynamicMockController {
            state: Arc::clone(&state),
            calls: rx,
        };
        let me = Arc::new(Self {
            name,
            state,
            calls: tx,
        });
        (me, controller)
    }
}

#[async_trait]
impl MarketDataSource for DynamicMockSource {
    fn name(&self) -> &'static str {
        self.name
    }

    async fn fetch_candles(
        &self,
        symbol: &str,
        req: CandleRequest,
    ) -> Result<Vec<Candle>, WatchError> {
        // rule is cloned out so the lock is not held while hanging
        let rule = {
            let mut guard = self.state.lock().await;
            guard.candle_requests.push((symbol.to_string(), req));
            let scripted = guard
                .scripted
                .get_mut(symbol)
                .and_then(VecDeque::pop_front)
                .map(CandleRule::Behavior);
            scripted.or_else(|| guard.candle_rules.get(symbol).cloned())
        };
        self.calls.send_modify(|c| *c += 1);
        match rule.map(|r| r.resolve(&req)) {
            Some(Resolved::Done(result)) => result,
            Some(Resolved::Hang) => std::future::pending().await,
            None => Ok(Vec::new()),
        }
    }

    async fn fetch_market_info(&self, symbol: &str) -> Result<MarketInfo, WatchError> {
        let behavior = {
            let guard = self.state.lock().await;
            guard.info_rules.get(symbol).cloned()
        };
        match behavior {
            Some(MockBehavior::Return(info)) => Ok(info),
            Some(MockBehavior::Fail(e)) => Err(e),
            Some(MockBehavior::Hang) => std::future::pending().await,
            None => Err(WatchError::not_found(format!("market {symbol} on {}", self.name))),
        }
    }
}
