use chrono::{DateTime, Utc};

/// Source of wall-clock time for components whose behavior depends on "now".
///
/// Backfill windows, default candle request windows and the end of the gap
/// window are all computed from a clock so tests can pin them.
pub trait Clock: Send + Sync {
    /// Current UTC time.
    fn now(&self) -> DateTime<Utc>;
}

/// The system wall clock.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}
