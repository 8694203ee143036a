use std::time::Duration;

use candlewatch_core::{SupervisorConfig, WatchError, WatcherStatus};

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Phase {
    Running,
    /// Waiting before restart number `attempt`.
    Backoff { attempt: u32 },
    Stopped,
    GaveUp,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Event {
    RunFailed { error: WatchError, uptime: Duration },
    RunPanicked { msg: String },
    /// The run loop returned without a stop request.
    RunExited,
    StopRequested,
    BackoffElapsed,
}

#[derive(Debug, PartialEq, Eq)]
pub enum Action {
    PersistStatus(WatcherStatus),
    SpawnRun { restarts: u32 },
    WaitBackoff { attempt: u32 },
    GiveUp { error: WatchError },
    Exit,
}

/// Bounded restart policy around one watcher's run loop.
///
/// Every automatic restart mirrors a `stop()` followed by a `run()`: the
/// record is persisted STOPPED, then RUNNING again before the next run.
#[derive(Debug)]
pub struct Supervisor {
    pub watcher: String,
    pub max_restarts: u32,
    pub healthy_reset_after: Option<Duration>,
    pub restarts: u32,
    pub phase: Phase,
}

impl Supervisor {
    pub fn new(watcher: impl Into<String>, cfg: &SupervisorConfig) -> Self {
        Self {
            watcher: watcher.into(),
            max_restarts: cfg.max_restarts,
            healthy_reset_after: cfg.healthy_reset_after,
            restarts: 0,
            phase: Phase::Running,
        }
    }

    pub fn handle(mut self, event: Event) -> (Self, Vec<Action>) {
        match (self.phase, event) {
            (Phase::Stopped | Phase::GaveUp, _) => (self, Vec::new()),
            (_, Event::StopRequested) => {
                self.phase = Phase::Stopped;
                (self, vec![Action::Exit])
            }
            (Phase::Running, Event::RunExited) => {
                self.phase = Phase::Stopped;
                (self, vec![Action::PersistStatus(WatcherStatus::Stopped), Action::Exit])
            }
            (Phase::Running, Event::RunFailed { error, uptime }) => {
                if self.healthy_reset_after.is_some_and(|h| uptime >= h) {
                    self.restarts = 0;
                }
                if !error.is_recoverable() {
                    return self.give_up(error);
                }
                if self.restarts < self.max_restarts {
                    self.restarts += 1;
                    let attempt = self.restarts;
                    self.phase = Phase::Backoff { attempt };
                    return (
                        self,
                        vec![
                            Action::PersistStatus(WatcherStatus::Stopped),
                            Action::WaitBackoff { attempt },
                        ],
                    );
                }
                let error = WatchError::Supervision {
                    watcher: self.watcher.clone(),
                    attempts: self.restarts + 1,
                    last: error.to_string(),
                };
                self.give_up(error)
            }
            (Phase::Running, Event::RunPanicked { msg }) => {
                let error = WatchError::Supervision {
                    watcher: self.watcher.clone(),
                    attempts: self.restarts + 1,
                    last: msg,
                };
                self.give_up(error)
            }
            (Phase::Backoff { .. }, Event::BackoffElapsed) => {
                self.phase = Phase::Running;
                let restarts = self.restarts;
                (
                    self,
                    vec![
                        Action::PersistStatus(WatcherStatus::Running),
                        Action::SpawnRun { restarts },
                    ],
                )
            }
            // Events that cannot happen in the current phase are ignored.
            (Phase::Running | Phase::Backoff { .. }, _) => (self, Vec::new()),
        }
    }

    fn give_up(mut self, error: WatchError) -> (Self, Vec<Action>) {
        self.phase = Phase::GaveUp;
        (
            self,
            vec![
                Action::PersistStatus(WatcherStatus::Stopped),
                Action::GiveUp { error },
                Action::Exit,
            ],
        )
    }
}
