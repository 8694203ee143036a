//! Decoding of `/query` JSON bodies.

use chrono::{DateTime, Utc};
use serde::Deserialize;
use serde_json::Value;

#[derive(Debug, Deserialize)]
struct QueryBody {
    #[serde(default)]
    results: Vec<StatementResult>,
    #[serde(default)]
    error: Option<String>,
}

#[derive(Debug, Deserialize)]
struct StatementResult {
    #[serde(default)]
    series: Vec<Series>,
    #[serde(default)]
    error: Option<String>,
}

/// One result series: `columns` names each position of every `values` row.
#[derive(Debug, Deserialize)]
pub struct Series {
    /// Column names.
    #[serde(default)]
    pub columns: Vec<String>,
    /// Rows, one value per column.
    #[serde(default)]
    pub values: Vec<Vec<Value>>,
}

impl Series {
    /// Position of `name` among the columns.
    #[must_use]
    pub fn column(&self, name: &str) -> Option<usize> {
        self.columns.iter().position(|c| c == name)
    }
}

/// Decode the series of the first statement.
///
/// An empty result (no matching points) decodes to no series.
///
/// # Errors
/// Returns the server-reported error message, or a decode message when the
/// body is not an InfluxDB query response.
pub fn first_statement_series(body: Value) -> Result<Vec<Series>, String> {
    let body: QueryBody = serde_json::from_value(body).map_err(|e| format!("unexpected body: {e}"))?;
    if let Some(err) = body.error {
        return Err(err);
    }
    let Some(first) = body.results.into_iter().next() else {
        return Ok(Vec::new());
    };
    if let Some(err) = first.error {
        return Err(err);
    }
    Ok(first.series)
}

/// Read a numeric cell as `u64`, accepting integer or float encodings.
#[must_use]
pub fn as_count(v: &Value) -> Option<u64> {
    v.as_u64().or_else(|| {
        v.as_f64()
            .filter(|f| f.is_finite() && *f >= 0.0)
            .map(|f| f as u64)
    })
}

/// Read an epoch-millisecond cell as a UTC timestamp.
#[must_use]
pub fn as_time(v: &Value) -> Option<DateTime<Utc>> {
    v.as_i64().and_then(DateTime::from_timestamp_millis)
}
