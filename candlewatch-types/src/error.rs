use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Unified error type for the candlewatch workspace.
///
/// This covers invalid construction parameters, exchange and store failures,
/// record persistence problems, not-found conditions, and the terminal
/// supervision failure reported once a watcher exhausts its restart budget.
#[derive(Debug, Error, Serialize, Deserialize, Clone, PartialEq, Eq)]
#[non_exhaustive]
pub enum WatchError {
    /// Invalid construction parameters or missing collaborators (fatal, never retried).
    #[error("configuration error: {0}")]
    Config(String),

    /// The exchange fetch failed or the exchange cannot serve the request.
    #[error("{source_name} failed: {msg}")]
    DataSource {
        /// Data source name that failed (e.g. "binance").
        source_name: String,
        /// Human-readable error message.
        msg: String,
    },

    /// A time-series read or write failed.
    #[error("store {op} failed: {msg} (query: {context})")]
    Store {
        /// Store operation label ("write", "count", "gaps", ...).
        op: String,
        /// Query or request context the operation was issued with.
        context: String,
        /// Human-readable error message.
        msg: String,
    },

    /// Reading or writing a watcher record failed.
    #[error("persistence error: {0}")]
    Persistence(String),

    /// A watcher failed more often than its restart budget allows.
    #[error("watcher {watcher} gave up after {attempts} failed runs: {last}")]
    Supervision {
        /// Identifier of the watcher that gave up.
        watcher: String,
        /// Number of failed runs observed, including the final one.
        attempts: u32,
        /// Rendering of the last run-loop error.
        last: String,
    },

    /// A resource could not be found.
    #[error("not found: {what}")]
    NotFound {
        /// Description of the missing resource, e.g. "watcher 1234".
        what: String,
    },

    /// Invalid input argument.
    #[error("invalid argument: {0}")]
    InvalidArg(String),

    /// The requested capability is not implemented by the collaborator.
    #[error("unsupported capability: {capability}")]
    Unsupported {
        /// A capability string describing what was requested (e.g. "candles").
        capability: String,
    },
}

impl WatchError {
    /// Helper: build a `Config` error.
    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config(msg.into())
    }

    /// Helper: build a `DataSource` error tagged with the source name.
    pub fn data_source(source_name: impl Into<String>, msg: impl Into<String>) -> Self {
        Self::DataSource {
            source_name: source_name.into(),
            msg: msg.into(),
        }
    }

    /// Helper: build a `Store` error wrapping the operation and its query context.
    pub fn store(op: impl Into<String>, context: impl Into<String>, msg: impl Into<String>) -> Self {
        Self::Store {
            op: op.into(),
            context: context.into(),
            msg: msg.into(),
        }
    }

    /// Helper: build a `Persistence` error.
    pub fn persistence(msg: impl Into<String>) -> Self {
        Self::Persistence(msg.into())
    }

    /// Helper: build a `NotFound` error for a description of the missing resource.
    pub fn not_found(what: impl Into<String>) -> Self {
        Self::NotFound { what: what.into() }
    }

    /// Helper: build an `Unsupported` error for a capability string.
    #[must_use]
    pub fn unsupported(cap: impl Into<String>) -> Self {
        Self::Unsupported {
            capability: cap.into(),
        }
    }

    /// Returns true if a run loop failing with this error may be restarted.
    ///
    /// Configuration-class errors would fail identically on every attempt, so
    /// they end supervision without consuming the restart budget.
    #[must_use]
    pub const fn is_recoverable(&self) -> bool {
        !matches!(
            self,
            Self::Config(_)
                | Self::InvalidArg(_)
                | Self::Unsupported { .. }
                | Self::Supervision { .. }
        )
    }
}
