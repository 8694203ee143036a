//! Time-series utilities shared by stores and watchers.
//!
//! Modules include:
//! - `align`: minute alignment of timestamps
//! - `dedup`: one candle per minute bucket
//! - `gaps`: sentinel-based gap bucketing and coalescing of gaps into fetchable runs
/// Minute alignment helpers.
pub mod align;
/// Per-minute deduplication.
pub mod dedup;
/// Gap detection and gap-run coalescing.
pub mod gaps;
