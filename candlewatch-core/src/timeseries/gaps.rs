use std::collections::BTreeMap;

use chrono::{DateTime, Duration, Utc};

use super::align::floor_to;

/// Value assigned to buckets that received no point.
pub const GAP_SENTINEL: f64 = -1.0;

/// One fetchable run of gap timestamps.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GapRun {
    /// First gap timestamp of the run; repair fetches are anchored here.
    pub start: DateTime<Utc>,
    /// Last gap timestamp of the run.
    pub end: DateTime<Utc>,
    /// Number of gap timestamps in the run.
    pub len: usize,
}

/// Group points into buckets of `width` holding the maximum value per bucket,
/// and fill empty buckets with [`GAP_SENTINEL`].
///
/// Buckets span from the bucket of the earliest point through the bucket
/// containing `until`. Returns an empty series when there are no points or
/// when `until` precedes the first bucket.
pub fn bucket_max_filled<I>(points: I, width: Duration, until: DateTime<Utc>) -> Vec<(DateTime<Utc>, f64)>
where
    I: IntoIterator<Item = (DateTime<Utc>, f64)>,
{
    let mut buckets: BTreeMap<DateTime<Utc>, f64> = BTreeMap::new();
    for (ts, value) in points {
        let key = floor_to(ts, width);
        buckets
            .entry(key)
            .and_modify(|v| *v = v.max(value))
            .or_insert(value);
    }
    let Some(first) = buckets.keys().next().copied() else {
        return Vec::new();
    };
    let last = floor_to(until, width);
    let mut out = Vec::new();
    let mut cursor = first;
    while cursor <= last {
        out.push((cursor, buckets.get(&cursor).copied().unwrap_or(GAP_SENTINEL)));
        cursor += width;
    }
    out
}

/// Timestamps of sentinel buckets, ascending.
pub fn sentinel_buckets(series: &[(DateTime<Utc>, f64)]) -> Vec<DateTime<Utc>> {
    series
        .iter()
        .filter(|(_, v)| *v == GAP_SENTINEL)
        .map(|(ts, _)| *ts)
        .collect()
}

/// Missing buckets between the first point and `until`, ascending.
pub fn find_gaps<I>(points: I, width: Duration, until: DateTime<Utc>) -> Vec<DateTime<Utc>>
where
    I: IntoIterator<Item = (DateTime<Utc>, f64)>,
{
    sentinel_buckets(&bucket_max_filled(points, width, until))
}

/// Coalesce sorted gap timestamps into runs that one capped fetch can cover.
///
/// A timestamp joins the current run while it lies less than `cap` minutes
/// after the run's start; otherwise it opens a new run.
#[must_use]
pub fn coalesce_gap_runs(gaps: &[DateTime<Utc>], cap: usize) -> Vec<GapRun> {
    let span = Duration::minutes(i64::try_from(cap.max(1)).unwrap_or(i64::MAX));
    let mut runs: Vec<GapRun> = Vec::new();
    for &ts in gaps {
        match runs.last_mut() {
            Some(run) if ts - run.start < span => {
                run.end = ts;
                run.len += 1;
            }
            _ => runs.push(GapRun {
                start: ts,
                end: ts,
                len: 1,
            }),
        }
    }
    runs
}
