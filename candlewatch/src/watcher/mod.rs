//! Supervised watcher lifecycle.
//!
//! A [`Watcher`] owns identity and status and runs a [`WatcherTask`] under a
//! bounded restart policy. `run()` persists RUNNING and spawns the supervised
//! loop without waiting for it; `stop()` persists STOPPED after the loop has
//! acknowledged the stop request (or was aborted after the grace period).

mod backoff;
pub mod market;
mod supervisor_sm;

use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Arc, Mutex, PoisonError, RwLock};

use async_trait::async_trait;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::Instrument;

use candlewatch_core::{
    ConfigStore, StopHandle, StopSignal, SupervisorConfig, TimeSeriesStore, WatchError,
    WatcherConfig, WatcherId, WatcherKind, WatcherRecord, WatcherStatus, drop_impl, stop_channel,
};

use self::backoff::restart_delay;
use self::supervisor_sm as sm;

/// What a supervised run loop receives on each (re)start.
pub struct WatcherContext {
    /// Identifier of the owning watcher.
    pub id: WatcherId,
    /// Time-series store injected into the watcher.
    pub store: Arc<dyn TimeSeriesStore>,
    /// Fires when the watcher is asked to stop.
    pub stop: StopSignal,
}

/// The watcher-specific body run under supervision.
#[async_trait]
pub trait WatcherTask: Send + Sync + 'static {
    /// Variant implemented by this task.
    fn kind(&self) -> WatcherKind;

    /// Raw configuration describing this task (without id).
    fn parameters(&self) -> WatcherConfig;

    /// Run until `ctx.stop` fires (returning `Ok`) or a failure occurs.
    ///
    /// Returning an error hands control to the restart policy.
    async fn run_watcher(&self, ctx: WatcherContext) -> Result<(), WatchError>;
}

/// Observable supervision state of a watcher.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SupervisionState {
    /// Never started, or stopped on request.
    Stopped,
    /// The run loop is live; `restarts` automatic restarts happened so far.
    Running {
        /// Automatic restarts consumed.
        restarts: u32,
    },
    /// Waiting to perform automatic restart number `attempt`.
    Restarting {
        /// 1-based restart number.
        attempt: u32,
    },
    /// Supervision ended on an unrecoverable error.
    GaveUp(WatchError),
}

impl SupervisionState {
    /// Whether a run loop is live or about to be restarted.
    #[must_use]
    pub const fn is_active(&self) -> bool {
        matches!(self, Self::Running { .. } | Self::Restarting { .. })
    }
}

struct Shared {
    id: WatcherId,
    kind: WatcherKind,
    parameters: WatcherConfig,
    status: Mutex<WatcherStatus>,
    store: RwLock<Option<Arc<dyn TimeSeriesStore>>>,
    records: Arc<dyn ConfigStore>,
    supervisor: SupervisorConfig,
    restarts: AtomicU32,
    state: watch::Sender<SupervisionState>,
}

impl Shared {
    fn status(&self) -> WatcherStatus {
        *self.status.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn set_status(&self, status: WatcherStatus) {
        *self.status.lock().unwrap_or_else(PoisonError::into_inner) = status;
    }

    fn store(&self) -> Result<Arc<dyn TimeSeriesStore>, WatchError> {
        self.store
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
            .ok_or_else(|| {
                WatchError::config(format!("watcher {} has no time-series store", self.id))
            })
    }

    fn record(&self) -> WatcherRecord {
        WatcherRecord {
            id: self.id.clone(),
            kind: self.kind.as_str().to_string(),
            status: self.status(),
            identity: self.parameters.identity.clone(),
            extra: self.parameters.extra.clone(),
        }
    }

    async fn save(&self) -> Result<(), WatchError> {
        self.records.upsert(self.record()).await
    }

    async fn persist(&self, status: WatcherStatus) {
        self.set_status(status);
        if let Err(e) = self.save().await {
            tracing::error!(watcher_id = %self.id, %status, error = %e, "failed to persist watcher status");
        }
    }
}

struct RunControl {
    stop: StopHandle,
    join: JoinHandle<()>,
}

/// Aborts the run-loop task if the supervisor itself is cancelled.
struct RunGuard {
    handle: Option<JoinHandle<Result<(), WatchError>>>,
}

impl Drop for RunGuard {
    fn drop(&mut self) {
        drop_impl(&mut self.handle, &mut None);
    }
}

/// A supervised, persistable watcher.
pub struct Watcher {
    shared: Arc<Shared>,
    task: Arc<dyn WatcherTask>,
    control: tokio::sync::Mutex<Option<RunControl>>,
}

impl Watcher {
    /// Wrap `task` with identity `id` (a fresh one when `None`), initially STOPPED.
    pub fn new(
        id: Option<WatcherId>,
        task: Arc<dyn WatcherTask>,
        records: Arc<dyn ConfigStore>,
        supervisor: SupervisorConfig,
    ) -> Self {
        let (state, _) = watch::channel(SupervisionState::Stopped);
        let shared = Shared {
            id: id.unwrap_or_else(WatcherId::generate),
            kind: task.kind(),
            parameters: task.parameters(),
            status: Mutex::new(WatcherStatus::Stopped),
            store: RwLock::new(None),
            records,
            supervisor,
            restarts: AtomicU32::new(0),
            state,
        };
        Self {
            shared: Arc::new(shared),
            task,
            control: tokio::sync::Mutex::new(None),
        }
    }

    /// Stable identifier.
    #[must_use]
    pub fn id(&self) -> &WatcherId {
        &self.shared.id
    }

    /// Variant of the supervised task.
    #[must_use]
    pub fn kind(&self) -> WatcherKind {
        self.shared.kind
    }

    /// Last-known intended status.
    #[must_use]
    pub fn status(&self) -> WatcherStatus {
        self.shared.status()
    }

    /// Automatic restarts performed by the current supervision.
    #[must_use]
    pub fn restarts(&self) -> u32 {
        self.shared.restarts.load(Ordering::Relaxed)
    }

    /// Current supervision state.
    #[must_use]
    pub fn supervision(&self) -> SupervisionState {
        self.shared.state.borrow().clone()
    }

    /// Subscribe to supervision state changes.
    #[must_use]
    pub fn subscribe(&self) -> watch::Receiver<SupervisionState> {
        self.shared.state.subscribe()
    }

    /// Whether a run loop is live or about to be restarted.
    #[must_use]
    pub fn is_active(&self) -> bool {
        self.shared.state.borrow().is_active()
    }

    /// Inject the time-series store used by the run loop.
    pub fn set_store(&self, store: Arc<dyn TimeSeriesStore>) {
        *self.shared.store.write().unwrap_or_else(PoisonError::into_inner) = Some(store);
    }

    /// The injected time-series store.
    ///
    /// # Errors
    /// Returns `WatchError::Config` when no store has been injected.
    pub fn store(&self) -> Result<Arc<dyn TimeSeriesStore>, WatchError> {
        self.shared.store()
    }

    /// Persisted shape of this watcher.
    #[must_use]
    pub fn record(&self) -> WatcherRecord {
        self.shared.record()
    }

    /// Upsert the record `{id, type, status, ...parameters}` keyed by id.
    ///
    /// # Errors
    /// Propagates the record store failure.
    pub async fn save(&self) -> Result<(), WatchError> {
        self.shared.save().await
    }

    /// Mark RUNNING, persist, and start the supervised run loop in the background.
    ///
    /// Persistence failures are logged. Calling `run` on an active watcher is a no-op.
    pub async fn run(&self) {
        let mut control = self.control.lock().await;
        if self.is_active() && control.as_ref().is_some_and(|c| !c.join.is_finished()) {
            tracing::debug!(watcher_id = %self.shared.id, "watcher already running");
            return;
        }
        // a loop that already exited or gave up is only winding down
        if let Some(previous) = control.take() {
            let _ = previous.join.await;
        }
        self.shared.restarts.store(0, Ordering::Relaxed);
        self.shared.persist(WatcherStatus::Running).await;
        self.shared
            .state
            .send_replace(SupervisionState::Running { restarts: 0 });
        let (stop, signal) = stop_channel();
        let span = tracing::info_span!("watcher", watcher_id = %self.shared.id, kind = %self.shared.kind);
        let join = tokio::spawn(
            supervise(Arc::clone(&self.shared), Arc::clone(&self.task), signal).instrument(span),
        );
        *control = Some(RunControl { stop, join });
        tracing::info!(watcher_id = %self.shared.id, kind = %self.shared.kind, "watcher started");
    }

    /// Mark STOPPED, stop the run loop cooperatively, and persist.
    ///
    /// Waits up to the configured grace period for the loop to acknowledge,
    /// then aborts it.
    pub async fn stop(&self) {
        self.shared.set_status(WatcherStatus::Stopped);
        let control = self.control.lock().await.take();
        if let Some(RunControl { stop, mut join }) = control {
            stop.stop();
            let grace = self.shared.supervisor.stop_grace;
            if tokio::time::timeout(grace, &mut join).await.is_err() {
                tracing::warn!(
                    watcher_id = %self.shared.id,
                    grace_ms = u64::try_from(grace.as_millis()).unwrap_or(u64::MAX),
                    "run loop ignored stop request; aborting"
                );
                join.abort();
                let _ = join.await;
            }
        }
        self.shared.state.send_modify(|s| {
            if s.is_active() {
                *s = SupervisionState::Stopped;
            }
        });
        self.shared.persist(WatcherStatus::Stopped).await;
        tracing::info!(watcher_id = %self.shared.id, "watcher stopped");
    }
}

impl Drop for Watcher {
    fn drop(&mut self) {
        if let Some(RunControl { stop, join }) = self.control.get_mut().take() {
            drop_impl(&mut Some(join), &mut Some(stop));
        }
    }
}

async fn run_once(shared: &Arc<Shared>, task: &Arc<dyn WatcherTask>, stop: &StopSignal) -> sm::Event {
    if stop.is_stopped() {
        return sm::Event::StopRequested;
    }
    let store = match shared.store() {
        Ok(store) => store,
        Err(error) => {
            return sm::Event::RunFailed {
                error,
                uptime: std::time::Duration::ZERO,
            };
        }
    };
    let ctx = WatcherContext {
        id: shared.id.clone(),
        store,
        stop: stop.clone(),
    };
    let task = Arc::clone(task);
    let started = tokio::time::Instant::now();
    let mut guard = RunGuard {
        handle: Some(tokio::spawn(
            async move { task.run_watcher(ctx).await }.in_current_span(),
        )),
    };
    let Some(handle) = guard.handle.as_mut() else {
        return sm::Event::RunExited;
    };
    let joined = handle.await;
    let uptime = started.elapsed();
    match joined {
        _ if stop.is_stopped() => sm::Event::StopRequested,
        Ok(Ok(())) => sm::Event::RunExited,
        Ok(Err(error)) => sm::Event::RunFailed { error, uptime },
        Err(e) if e.is_panic() => sm::Event::RunPanicked {
            msg: format!("run loop panicked: {e}"),
        },
        Err(e) => sm::Event::RunFailed {
            error: WatchError::Supervision {
                watcher: shared.id.to_string(),
                attempts: shared.restarts.load(Ordering::Relaxed) + 1,
                last: e.to_string(),
            },
            uptime,
        },
    }
}

async fn supervise(shared: Arc<Shared>, task: Arc<dyn WatcherTask>, mut stop: StopSignal) {
    let mut machine = sm::Supervisor::new(shared.id.to_string(), &shared.supervisor);
    let mut actions = vec![sm::Action::SpawnRun { restarts: 0 }];
    loop {
        let mut next = None;
        for action in actions {
            match action {
                sm::Action::PersistStatus(status) => {
                    if stop.is_stopped() {
                        continue;
                    }
                    shared.persist(status).await;
                }
                sm::Action::SpawnRun { restarts } => {
                    shared.restarts.store(restarts, Ordering::Relaxed);
                    shared
                        .state
                        .send_replace(SupervisionState::Running { restarts });
                    next = Some(run_once(&shared, &task, &stop).await);
                }
                sm::Action::WaitBackoff { attempt } => {
                    shared
                        .state
                        .send_replace(SupervisionState::Restarting { attempt });
                    let delay = restart_delay(shared.supervisor.restart_backoff.as_ref(), attempt);
                    tracing::warn!(
                        attempt,
                        max_restarts = shared.supervisor.max_restarts,
                        delay_ms = u64::try_from(delay.as_millis()).unwrap_or(u64::MAX),
                        "run loop failed; restarting"
                    );
                    next = Some(if stop.sleep(delay).await {
                        sm::Event::BackoffElapsed
                    } else {
                        sm::Event::StopRequested
                    });
                }
                sm::Action::GiveUp { error } => {
                    tracing::error!(error = %error, "watcher gave up");
                    shared.state.send_replace(SupervisionState::GaveUp(error));
                }
                sm::Action::Exit => {
                    shared.state.send_modify(|s| {
                        if s.is_active() {
                            *s = SupervisionState::Stopped;
                        }
                    });
                }
            }
        }
        if let Some(sm::Event::RunFailed { error, .. }) = &next {
            tracing::error!(error = %error, "run loop failed");
        }
        let Some(event) = next else {
            break;
        };
        let (m, a) = machine.handle(event);
        machine = m;
        actions = a;
    }
}
