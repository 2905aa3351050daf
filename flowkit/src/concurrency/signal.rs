//! One-shot cancellation signals.
//!
//! A signal is a `watch` channel carrying a single `bool`. Firing flips it from `false` to
//! `true` exactly once; receivers observe the flip without consuming it, so any number of tasks
//! can wait on clones of the same [`SignalRx`]. Dropping the [`SignalTx`] fires the signal, which
//! makes "closing" and "firing" the same event.

use std::future;

use tokio::sync::watch;

/// Transmitter side of a cancellation signal.
///
/// Not [`Clone`]: a signal has exactly one owner that decides when it fires.
#[derive(Debug)]
pub struct SignalTx {
    tx: watch::Sender<bool>,
}

impl SignalTx {
    /// Fires the signal.
    ///
    /// Returns `true` only for the call that actually fired it; later calls are no-ops and
    /// return `false`.
    pub fn fire(&self) -> bool {
        self.tx.send_if_modified(|fired| {
            if *fired {
                return false;
            }

            *fired = true;
            true
        })
    }

    /// Returns `true` once the signal has fired.
    pub fn is_fired(&self) -> bool {
        *self.tx.borrow()
    }

    /// Creates a new receiver observing this signal.
    pub fn subscribe(&self) -> SignalRx {
        SignalRx::from_watch(self.tx.subscribe())
    }

    /// Completes when every receiver of this signal has been dropped.
    ///
    /// Producers of timer-like signals use it to stop early when nobody listens anymore.
    pub async fn closed(&self) {
        self.tx.closed().await
    }
}

impl Drop for SignalTx {
    fn drop(&mut self) {
        self.fire();
    }
}

/// Receiver side of a cancellation signal.
///
/// Cheap to clone; every clone observes the same signal.
#[derive(Debug, Clone)]
pub struct SignalRx {
    // `None` never fires.
    rx: Option<watch::Receiver<bool>>,
}

impl SignalRx {
    fn from_watch(rx: watch::Receiver<bool>) -> Self {
        Self { rx: Some(rx) }
    }

    /// Returns a receiver that never fires.
    ///
    /// No channel or task backs it, so it costs nothing to hold.
    pub fn never() -> Self {
        Self { rx: None }
    }

    /// Returns `true` if this receiver can never fire.
    pub fn is_never(&self) -> bool {
        self.rx.is_none()
    }

    /// Returns `true` once the signal has fired.
    pub fn is_fired(&self) -> bool {
        match &self.rx {
            Some(rx) => *rx.borrow(),
            None => false,
        }
    }

    /// Completes once the signal has fired.
    ///
    /// Completes immediately if it already fired. Cancel safe.
    pub async fn fired(&self) {
        let Some(rx) = &self.rx else {
            return future::pending().await;
        };

        let mut rx = rx.clone();
        // An error means the sender is gone, and a dropped sender counts as fired.
        let _ = rx.wait_for(|fired| *fired).await;
    }
}

/// Creates a new signal that has not fired yet.
pub fn create_signal() -> (SignalTx, SignalRx) {
    let (tx, rx) = watch::channel(false);
    (SignalTx { tx }, SignalRx::from_watch(rx))
}
