use std::time::Duration;

use candlewatch_core::BackoffConfig;
use rand::Rng;

/// `base_ms` plus a random jitter of up to `jitter_percent` percent.
pub fn jitter_wait(base_ms: u64, jitter_percent: u32) -> u64 {
    let jitter_range = if jitter_percent == 0 {
        1
    } else {
        std::cmp::max(1, (base_ms.saturating_mul(u64::from(jitter_percent))) / 100)
    };
    let mut rng = rand::rng();
    base_ms + rng.random_range(0..jitter_range)
}

/// Delay before automatic restart number `attempt`; zero without a backoff policy.
pub fn restart_delay(cfg: Option<&BackoffConfig>, attempt: u32) -> Duration {
    cfg.map_or(Duration::ZERO, |b| {
        Duration::from_millis(jitter_wait(b.delay_ms(attempt), u32::from(b.jitter_percent)))
    })
}
