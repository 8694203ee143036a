use std::sync::Arc;
use std::time::Duration;

use tokio::sync::watch;
use tokio::task::JoinHandle;

/// Create a connected stop handle / stop signal pair.
#[must_use]
pub fn stop_channel() -> (StopHandle, StopSignal) {
    let (tx, rx) = watch::channel(false);
    (
        StopHandle { tx },
        StopSignal {
            rx,
            _keepalive: None,
        },
    )
}

/// Owner side of a cooperative stop request.
#[derive(Debug)]
pub struct StopHandle {
    tx: watch::Sender<bool>,
}

impl StopHandle {
    /// Request every connected signal to stop. Idempotent.
    pub fn stop(&self) {
        self.tx.send_replace(true);
    }

    /// Whether a stop has been requested.
    #[must_use]
    pub fn is_stopped(&self) -> bool {
        *self.tx.borrow()
    }
}

/// Observer side of a cooperative stop request, cloned into run loops.
///
/// Dropping the [`StopHandle`] counts as a stop request.
#[derive(Debug, Clone)]
pub struct StopSignal {
    rx: watch::Receiver<bool>,
    _keepalive: Option<Arc<watch::Sender<bool>>>,
}

impl StopSignal {
    /// A signal that never fires.
    #[must_use]
    pub fn never() -> Self {
        let (tx, rx) = watch::channel(false);
        Self {
            rx,
            _keepalive: Some(Arc::new(tx)),
        }
    }

    /// Whether a stop has been requested (or the handle was dropped).
    #[must_use]
    pub fn is_stopped(&self) -> bool {
        *self.rx.borrow() || self.rx.has_changed().is_err()
    }

    /// Resolve once a stop is requested.
    pub async fn stopped(&mut self) {
        loop {
            if *self.rx.borrow_and_update() {
                return;
            }
            if self.rx.changed().await.is_err() {
                return;
            }
        }
    }

    /// Sleep for `period` unless a stop arrives first.
    ///
    /// Returns `true` when the full period elapsed and `false` when the sleep
    /// was cut short by a stop request.
    pub async fn sleep(&mut self, period: Duration) -> bool {
        if self.is_stopped() {
            return false;
        }
        tokio::select! {
            biased;
            () = self.stopped() => false,
            () = tokio::time::sleep(period) => true,
        }
    }
}

/// A spawned run loop that can be polled for completion and cancelled.
pub trait Abortable {
    /// Cancel the run loop.
    fn abort(&mut self);
    /// Whether the run loop has already returned.
    fn is_finished(&self) -> bool;
}

impl<T> Abortable for JoinHandle<T> {
    fn abort(&mut self) {
        Self::abort(self);
    }

    fn is_finished(&self) -> bool {
        Self::is_finished(self)
    }
}

/// Drop-time logic for supervised tasks:
/// - send a best-effort stop request if present
/// - abort the run loop unless it already returned
pub fn drop_impl<H>(inner: &mut Option<H>, stop: &mut Option<StopHandle>)
where
    H: Abortable,
{
    if let Some(s) = stop.take() {
        s.stop();
    }
    if let Some(mut h) = inner.take()
        && !h.is_finished()
    {
        h.abort();
    }
}
