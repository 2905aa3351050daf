use std::sync::Arc;

use tokio::sync::OwnedSemaphorePermit;

use crate::concurrency::signal::SignalRx;
use crate::error::{ErrorKind, FlowResult};
use crate::flow_error;

/// Counting semaphore with a fixed number of permits.
///
/// Clones share the same pool. Outstanding permits never exceed [`Semaphore::capacity`]
/// because acquisition waits instead of failing.
#[derive(Debug, Clone)]
pub struct Semaphore {
    inner: Arc<tokio::sync::Semaphore>,
    capacity: usize,
}

impl Semaphore {
    /// Creates a semaphore with `capacity` permits.
    ///
    /// # Panics
    ///
    /// Panics if `capacity` is zero or larger than [`tokio::sync::Semaphore::MAX_PERMITS`].
    pub fn new(capacity: usize) -> Self {
        assert!(capacity > 0, "semaphore capacity must be greater than 0");
        assert!(
            capacity <= tokio::sync::Semaphore::MAX_PERMITS,
            "semaphore capacity exceeds the maximum number of permits"
        );

        Self {
            inner: Arc::new(tokio::sync::Semaphore::new(capacity)),
            capacity,
        }
    }

    /// Waits until a permit is free and takes it.
    pub async fn acquire(&self) -> Permit {
        let permit = self
            .inner
            .clone()
            .acquire_owned()
            .await
            .expect("semaphore is never closed");

        Permit { _permit: permit }
    }

    /// Waits for a permit unless `done` fires first.
    ///
    /// Returns [`ErrorKind::Cancelled`] when cancellation wins; no permit is held in that case.
    pub async fn acquire_until(&self, done: &SignalRx) -> FlowResult<Permit> {
        tokio::select! {
            biased;

            _ = done.fired() => Err(flow_error!(
                ErrorKind::Cancelled,
                "Semaphore acquisition cancelled"
            )),
            permit = self.acquire() => Ok(permit),
        }
    }

    /// Takes a permit only if one is free right now.
    pub fn try_acquire(&self) -> Option<Permit> {
        self.inner
            .clone()
            .try_acquire_owned()
            .ok()
            .map(|permit| Permit { _permit: permit })
    }

    /// Runs `future` while holding a permit.
    ///
    /// The permit is returned when the future completes, is dropped, or panics.
    pub async fn with_permit<F>(&self, future: F) -> F::Output
    where
        F: Future,
    {
        let _permit = self.acquire().await;
        future.await
    }

    /// Returns the total number of permits.
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Returns the number of permits currently free.
    pub fn available(&self) -> usize {
        self.inner.available_permits()
    }

    /// Returns the number of permits currently held.
    pub fn in_use(&self) -> usize {
        self.capacity - self.available()
    }
}

/// A held semaphore permit. Dropping it returns the permit.
#[must_use = "dropping a permit releases it immediately"]
#[derive(Debug)]
pub struct Permit {
    _permit: OwnedSemaphorePermit,
}

impl Permit {
    /// Returns the permit to its semaphore.
    pub fn release(self) {}
}
