//! InfluxDB line protocol and InfluxQL literal rendering.

use std::fmt::Write as _;

use candlewatch_core::{Candle, MarketTags};

fn escape_into(out: &mut String, raw: &str, specials: &[char]) {
    for ch in raw.chars() {
        if specials.contains(&ch) {
            out.push('\\');
        }
        out.push(ch);
    }
}

/// Escape a measurement name for line protocol.
#[must_use]
pub fn escape_measurement(raw: &str) -> String {
    let mut out = String::with_capacity(raw.len());
    escape_into(&mut out, raw, &[',', ' ']);
    out
}

/// Escape a tag key or tag value for line protocol.
#[must_use]
pub fn escape_tag(raw: &str) -> String {
    let mut out = String::with_capacity(raw.len());
    escape_into(&mut out, raw, &[',', ' ', '=']);
    out
}

/// Quote an identifier for InfluxQL (`"name"`).
#[must_use]
pub fn quote_ident(raw: &str) -> String {
    let mut out = String::with_capacity(raw.len() + 2);
    out.push('"');
    escape_into(&mut out, raw, &['"', '\\']);
    out.push('"');
    out
}

/// Quote a string literal for InfluxQL (`'value'`).
#[must_use]
pub fn quote_literal(raw: &str) -> String {
    let mut out = String::with_capacity(raw.len() + 2);
    out.push('\'');
    escape_into(&mut out, raw, &['\'', '\\']);
    out.push('\'');
    out
}

/// `"base" = 'BTC' AND "quote" = 'USDT' AND "exchange" = 'binance'`
#[must_use]
pub fn tag_predicate(tags: &MarketTags) -> String {
    tags.pairs()
        .iter()
        .map(|(k, v)| format!("{} = {}", quote_ident(k), quote_literal(v)))
        .collect::<Vec<_>>()
        .join(" AND ")
}

/// Render one candle as a line-protocol point with millisecond timestamp.
///
/// Returns `None` when a field is not finite; such values cannot be stored.
#[must_use]
pub fn candle_line(measurement: &str, tags: &MarketTags, candle: &Candle) -> Option<String> {
    let fields = [
        ("open", candle.open),
        ("high", candle.high),
        ("low", candle.low),
        ("close", candle.close),
        ("volume", candle.volume),
    ];
    if fields.iter().any(|(_, v)| !v.is_finite()) {
        return None;
    }
    let mut line = escape_measurement(measurement);
    for (k, v) in tags.pairs() {
        let _ = write!(line, ",{}={}", escape_tag(k), escape_tag(v));
    }
    for (i, (k, v)) in fields.iter().enumerate() {
        let sep = if i == 0 { ' ' } else { ',' };
        let _ = write!(line, "{sep}{k}={v:?}");
    }
    let _ = write!(line, " {}", candle.time_ms());
    Some(line)
}
