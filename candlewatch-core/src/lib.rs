//! candlewatch-core
//!
//! Collaborator contracts and shared utilities for the candlewatch ecosystem.
//!
//! - `clock`: injectable wall clock.
//! - `connector`: the `MarketDataSource` trait and candle request shape.
//! - `store`: the `TimeSeriesStore` and `ConfigStore` traits.
//! - `stop`: cooperative stop signalling for supervised run loops.
//! - `timeseries`: minute alignment, per-minute dedup, gap bucketing and gap-run coalescing.
//!
//! Async runtime (Tokio)
//! ---------------------
//! `stop::StopSignal` is built on `tokio::sync::watch` and its `sleep` uses the
//! Tokio timer, so run loops that use it must execute under a Tokio 1.x runtime.
#![warn(missing_docs)]

/// Wall-clock abstraction.
pub mod clock;
/// Market data source trait and request parameters.
pub mod connector;
/// Cooperative stop signal used by supervised run loops.
pub mod stop;
/// Time-series and watcher-record persistence contracts.
pub mod store;
/// Time-series utilities for alignment and gap detection.
pub mod timeseries;

pub use candlewatch_types::*;
pub use clock::{Clock, SystemClock};
pub use connector::{CandleRequest, MAX_CANDLES_PER_REQUEST, MarketDataSource};
pub use stop::{Abortable, StopHandle, StopSignal, drop_impl, stop_channel};
pub use store::{ConfigStore, Granularity, TimeSeriesStore};
pub use timeseries::align::{ceil_minute, ceil_to, floor_minute, floor_to, last_closed_minute};
pub use timeseries::dedup::dedup_by_minute;
pub use timeseries::gaps::{GAP_SENTINEL, GapRun, coalesce_gap_runs, find_gaps};
