use std::collections::BTreeMap;

use crate::Candle;

use super::align::floor_minute;

/// Order candles by open time and keep one per minute bucket.
///
/// When several candles fall into the same minute the last one in input
/// order wins, matching the store's overwrite semantics.
#[must_use]
pub fn dedup_by_minute(candles: impl IntoIterator<Item = Candle>) -> Vec<Candle> {
    let mut by_minute = BTreeMap::new();
    for candle in candles {
        by_minute.insert(floor_minute(candle.time), candle);
    }
    by_minute.into_values().collect()
}
