//! Write-once result slots.
//!
//! [`promise`] creates a multi-reader slot: the [`Promise`] is consumed by the call that resolves
//! it, so resolving twice does not compile, and every [`Deferred`] clone reads the same value.
//! [`oneshot`] is the cheaper single-reader variant whose reader is itself a future.

use std::pin::Pin;
use std::task::{Context, Poll, ready};

use tokio::sync::{oneshot as tokio_oneshot, watch};
use tokio::task::JoinHandle;
use tracing::debug;

use crate::concurrency::signal::SignalRx;
use crate::error::{ErrorKind, FlowError, FlowResult};
use crate::flow_error;

/// Creates a connected [`Promise`] and [`Deferred`].
pub fn promise<T>() -> (Promise<T>, Deferred<T>) {
    let (tx, rx) = watch::channel(None);
    (Promise { tx }, Deferred { rx })
}

/// Creates a connected [`OncePromise`] and [`OnceDeferred`].
pub fn oneshot<T>() -> (OncePromise<T>, OnceDeferred<T>) {
    let (tx, rx) = tokio_oneshot::channel();
    (OncePromise { tx }, OnceDeferred { rx })
}

fn promise_dropped() -> FlowError {
    flow_error!(
        ErrorKind::PromiseDropped,
        "Promise dropped without being resolved"
    )
}

/// Write side of a promise.
///
/// Dropping it unresolved makes every reader observe [`ErrorKind::PromiseDropped`].
#[derive(Debug)]
pub struct Promise<T> {
    tx: watch::Sender<Option<FlowResult<T>>>,
}

impl<T> Promise<T> {
    /// Resolves the promise with a value.
    pub fn set(self, value: T) {
        self.resolve(Ok(value));
    }

    /// Resolves the promise with an error.
    pub fn fail(self, err: FlowError) {
        self.resolve(Err(err));
    }

    /// Resolves the promise with `result`.
    pub fn resolve(self, result: FlowResult<T>) {
        self.tx.send_replace(Some(result));
    }

    /// Returns `true` once every reader has been dropped.
    pub fn is_abandoned(&self) -> bool {
        self.tx.is_closed()
    }
}

/// Read side of a promise. Clones observe the same result.
#[derive(Debug)]
pub struct Deferred<T> {
    rx: watch::Receiver<Option<FlowResult<T>>>,
}

// Manual impl: a derive would require `T: Clone` for the handle itself.
impl<T> Clone for Deferred<T> {
    fn clone(&self) -> Self {
        Self {
            rx: self.rx.clone(),
        }
    }
}

impl<T: Clone> Deferred<T> {
    /// Waits for the promise to be resolved and returns a clone of the result.
    pub async fn get(&self) -> FlowResult<T> {
        let mut rx = self.rx.clone();
        let resolved = rx
            .wait_for(Option::is_some)
            .await
            .map(|slot| (*slot).clone());

        match resolved {
            Ok(Some(result)) => result,
            _ => Err(promise_dropped()),
        }
    }

    /// Returns the result if the promise was already resolved or dropped, without waiting.
    pub fn try_get(&self) -> Option<FlowResult<T>> {
        if let Some(result) = &*self.rx.borrow() {
            return Some(result.clone());
        }

        // The sender is gone without having written a value.
        if self.rx.has_changed().is_err() {
            return Some(Err(promise_dropped()));
        }

        None
    }

    /// Waits like [`Deferred::get`] unless `done` fires first.
    pub async fn get_until(&self, done: &SignalRx) -> FlowResult<T> {
        tokio::select! {
            biased;

            _ = done.fired() => Err(flow_error!(ErrorKind::Cancelled, "Promise wait cancelled")),
            result = self.get() => result,
        }
    }

    /// Registers continuations that run on a spawned task once the promise resolves.
    ///
    /// Returns immediately. Exactly one of `on_ok` and `on_err` runs; a dropped promise runs
    /// `on_err` with [`ErrorKind::PromiseDropped`].
    pub fn then<F, E>(&self, on_ok: F, on_err: E) -> JoinHandle<()>
    where
        T: Send + Sync + 'static,
        F: FnOnce(T) + Send + 'static,
        E: FnOnce(FlowError) + Send + 'static,
    {
        let deferred = self.clone();

        tokio::spawn(async move {
            match deferred.get().await {
                Ok(value) => on_ok(value),
                Err(err) => {
                    debug!(error = %err, "promise continuation received an error");
                    on_err(err)
                }
            }
        })
    }
}

/// Write side of a single-reader promise.
#[derive(Debug)]
pub struct OncePromise<T> {
    tx: tokio_oneshot::Sender<FlowResult<T>>,
}

impl<T> OncePromise<T> {
    /// Resolves the promise with a value.
    pub fn set(self, value: T) {
        self.resolve(Ok(value));
    }

    /// Resolves the promise with an error.
    pub fn fail(self, err: FlowError) {
        self.resolve(Err(err));
    }

    /// Resolves the promise with `result`. Discarded if the reader is gone.
    pub fn resolve(self, result: FlowResult<T>) {
        let _ = self.tx.send(result);
    }

    /// Returns `true` once the reader has been dropped.
    pub fn is_abandoned(&self) -> bool {
        self.tx.is_closed()
    }
}

/// Read side of a single-reader promise. Await it to get the result.
#[must_use = "futures do nothing unless polled"]
#[derive(Debug)]
pub struct OnceDeferred<T> {
    rx: tokio_oneshot::Receiver<FlowResult<T>>,
}

impl<T> OnceDeferred<T> {
    /// Takes the result if it is already available, without waiting.
    pub fn try_get(&mut self) -> Option<FlowResult<T>> {
        match self.rx.try_recv() {
            Ok(result) => Some(result),
            Err(tokio_oneshot::error::TryRecvError::Empty) => None,
            Err(tokio_oneshot::error::TryRecvError::Closed) => Some(Err(promise_dropped())),
        }
    }
}

impl<T> Future for OnceDeferred<T> {
    type Output = FlowResult<T>;

    fn poll(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        let this = self.get_mut();

        match ready!(Pin::new(&mut this.rx).poll(cx)) {
            Ok(result) => Poll::Ready(result),
            Err(_) => Poll::Ready(Err(promise_dropped())),
        }
    }
}
