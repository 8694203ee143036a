//! Candlewatch keeps minute candle series complete.
//!
//! Overview
//! - A [`Watcher`] supervises one run loop with a bounded restart policy and
//!   persists its status through a `ConfigStore`.
//! - A [`MarketWatcher`] reconciles a market's stored series on every start
//!   (history backfill when empty, then gap repair) and then polls the
//!   latest candle at a fixed interval.
//! - [`Candlewatch`] is the service facade: it builds watchers from raw
//!   configurations, rejects duplicates, and tracks started watchers in a
//!   [`WatcherRegistry`].
//!
//! Key behaviors
//! - Reconciliation failures are logged and the polling phase still starts.
//! - A polling failure ends the run; the supervisor restarts it up to
//!   `max_restarts` times, then persists STOPPED and gives up.
//! - Configuration errors are never retried.
//!
//! Example
//! ```rust,ignore
//! use std::sync::Arc;
//! use candlewatch::{Candlewatch, MarketTags, MarketWatcherParams};
//!
//! let service = Candlewatch::builder()
//!     .with_source(Arc::new(binance))
//!     .time_series_store(Arc::new(influx))
//!     .config_store(Arc::new(records))
//!     .build()?;
//! service.restart_all().await?;
//! let params = MarketWatcherParams::new(MarketTags::new("binance", "BTC", "USDT"));
//! let id = service.create_watcher(params.to_config(None)).await?;
//! ```
#![warn(missing_docs)]

mod core;
mod factory;
mod registry;
/// Watcher supervision and the market watcher.
pub mod watcher;

pub use crate::core::{Candlewatch, CandlewatchBuilder, StartOutcome};
pub use candlewatch_core::*;
pub use factory::{SourceRegistry, WatcherFactory};
pub use registry::WatcherRegistry;
pub use watcher::market::{BackfillReport, GapRepairReport, MarketWatcher};
pub use watcher::{SupervisionState, Watcher, WatcherContext, WatcherTask};
