//! Candlewatch data transfer objects and configuration primitives.
//!
//! Everything here is plain data: serializable, cloneable, and free of any
//! async runtime coupling, so it can be shared by connectors, stores and the
//! supervisor alike.
#![warn(missing_docs)]

mod candle;
mod config;
mod error;
mod watcher;

pub use candle::{Candle, MarketInfo, MarketTags};
pub use config::{BackoffConfig, CandlewatchConfig, SupervisorConfig};
pub use error::WatchError;
pub use watcher::{
    DEFAULT_REFRESH_INTERVAL_MS, MIN_REFRESH_INTERVAL_MS, MarketWatcherParams, WatcherConfig,
    WatcherId, WatcherKind, WatcherRecord, WatcherStatus, default_max_history,
};
