//! Configuration types shared across the supervisor and connectors.

use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Exponential backoff configuration applied between automatic restarts.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct BackoffConfig {
    /// Delay before the first restart, in milliseconds.
    pub min_backoff_ms: u64,
    /// Upper bound on any restart delay, in milliseconds.
    pub max_backoff_ms: u64,
    /// Multiplier applied per further restart (values below 1 act as 1).
    pub factor: u32,
    /// Up to this percentage of the delay is added at random.
    pub jitter_percent: u8,
}

impl Default for BackoffConfig {
    fn default() -> Self {
        Self {
            min_backoff_ms: 500,
            max_backoff_ms: 30_000,
            factor: 2,
            jitter_percent: 20,
        }
    }
}

impl BackoffConfig {
    /// Un-jittered delay before restart number `attempt` (1-based).
    #[must_use]
    pub fn delay_ms(&self, attempt: u32) -> u64 {
        let mut delay = self.min_backoff_ms;
        for _ in 1..attempt {
            delay = delay.saturating_mul(u64::from(self.factor.max(1)));
            if delay >= self.max_backoff_ms {
                return self.max_backoff_ms;
            }
        }
        delay.min(self.max_backoff_ms)
    }
}

/// Restart policy and shutdown behavior of a supervised watcher.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SupervisorConfig {
    /// Automatic restarts allowed before the watcher gives up.
    pub max_restarts: u32,
    /// Optional delay between a failure and the automatic restart.
    ///
    /// `None` restarts immediately.
    pub restart_backoff: Option<BackoffConfig>,
    /// When set, a run that stayed up at least this long before failing
    /// starts a fresh restart budget. `None` never resets the counter.
    pub healthy_reset_after: Option<Duration>,
    /// How long `stop()` waits for the run loop to acknowledge before aborting it.
    pub stop_grace: Duration,
}

impl Default for SupervisorConfig {
    fn default() -> Self {
        Self {
            max_restarts: 3,
            restart_backoff: None,
            healthy_reset_after: None,
            stop_grace: Duration::from_secs(5),
        }
    }
}

/// Top-level configuration of the `Candlewatch` service facade.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CandlewatchConfig {
    /// Supervision policy applied to every watcher built by the service.
    pub supervisor: SupervisorConfig,
}
