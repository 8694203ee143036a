use candlewatch_core::{Candle, dedup_by_minute};
use chrono::DateTime;
use serde_json::Value;

fn number(v: &Value) -> Option<f64> {
    match v {
        Value::String(s) => s.parse().ok(),
        Value::Number(n) => n.as_f64(),
        _ => None,
    }
}

fn kline(row: &Value) -> Result<Candle, String> {
    let cells = row.as_array().ok_or_else(|| format!("kline is not an array: {row}"))?;
    if cells.len() < 6 {
        return Err(format!("kline has {} cells, expected at least 6", cells.len()));
    }
    let time = cells[0]
        .as_i64()
        .and_then(DateTime::from_timestamp_millis)
        .ok_or_else(|| format!("bad kline open time: {}", cells[0]))?;
    let field = |i: usize, name: &str| number(&cells[i]).ok_or_else(|| format!("bad kline {name}: {}", cells[i]));
    Ok(Candle {
        time,
        open: field(1, "open")?,
        high: field(2, "high")?,
        low: field(3, "low")?,
        close: field(4, "close")?,
        volume: field(5, "volume")?,
    })
}

/// Decode a `/api/v3/klines` body into candles, oldest first, one per minute.
///
/// # Errors
/// Returns a description of the first malformed row.
pub fn parse_klines(body: &Value) -> Result<Vec<Candle>, String> {
    let rows = body
        .as_array()
        .ok_or_else(|| "klines body is not an array".to_string())?;
    let out = rows.iter().map(kline).collect::<Result<Vec<_>, _>>()?;
    Ok(dedup_by_minute(out))
}
