use chrono::{DateTime, Duration, DurationRound, Utc};

/// Round `ts` down to the start of its bucket of width `width`.
///
/// Falls back to `ts` when the rounding would overflow.
#[must_use]
pub fn floor_to(ts: DateTime<Utc>, width: Duration) -> DateTime<Utc> {
    ts.duration_trunc(width).unwrap_or(ts)
}

/// Round `ts` up to the next bucket boundary of width `width` (identity when aligned).
#[must_use]
pub fn ceil_to(ts: DateTime<Utc>, width: Duration) -> DateTime<Utc> {
    let floor = floor_to(ts, width);
    if floor == ts { ts } else { floor + width }
}

/// Round `ts` down to the minute.
#[must_use]
pub fn floor_minute(ts: DateTime<Utc>) -> DateTime<Utc> {
    floor_to(ts, Duration::minutes(1))
}

/// Round `ts` up to the minute.
#[must_use]
pub fn ceil_minute(ts: DateTime<Utc>) -> DateTime<Utc> {
    ceil_to(ts, Duration::minutes(1))
}

/// Last fully elapsed minute bucket at `now`.
#[must_use]
pub fn last_closed_minute(now: DateTime<Utc>) -> DateTime<Utc> {
    floor_minute(now) - Duration::minutes(1)
}
