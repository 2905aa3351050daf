//! Timer utilities.
//!
//! [`after`] turns a duration into a [`SignalRx`], which is how timeouts are expressed: race
//! the work's completion signal against a timer signal with
//! [`or`](crate::combinators::or).
//!
//! [`DeferredTimer`] is a deadline that stays inert until armed, for `tokio::select!` branches
//! that should only fire after some event, such as the grace period an error group gives
//! stragglers before aborting them.

use std::pin::Pin;
use std::task::{Context, Poll, ready};
use std::time::Duration;

use tokio::time::{Sleep, sleep};
use tracing::trace;

use crate::concurrency::signal::{SignalRx, create_signal};

/// Returns a signal that fires once `duration` has elapsed.
///
/// Spawns one task that exits at the deadline, or earlier if every receiver of the returned
/// signal is dropped.
///
/// # Panics
///
/// Panics if called outside of a Tokio runtime.
pub fn after(duration: Duration) -> SignalRx {
    let (tx, rx) = create_signal();

    tokio::spawn(async move {
        tokio::select! {
            biased;

            _ = tx.closed() => {
                trace!(?duration, "timer signal abandoned before its deadline");
            }
            _ = sleep(duration) => {
                tx.fire();
            }
        }
    });

    rx
}

/// A future that resolves after a configured duration once armed.
///
/// [`DeferredTimer`] starts inactive and stays pending until [`DeferredTimer::start`] is called.
/// It is `Unpin`, so it can be used directly in `select!` through `&mut timer`.
#[derive(Debug)]
pub struct DeferredTimer {
    /// The active deadline if armed, or `None` when inactive.
    deadline: Option<Pin<Box<Sleep>>>,
    /// Duration used when (re)arming the timer.
    duration: Duration,
}

impl DeferredTimer {
    /// Creates a new, inactive timer for the given `duration`.
    pub fn new(duration: Duration) -> Self {
        Self {
            deadline: None,
            duration,
        }
    }

    /// Arms the timer so that it will resolve after the configured duration.
    ///
    /// Replaces any previously armed deadline.
    pub fn start(&mut self) {
        self.deadline = Some(Box::pin(sleep(self.duration)));
    }

    /// Arms the timer unless it is already armed.
    pub fn start_once(&mut self) {
        if self.deadline.is_none() {
            self.start();
        }
    }

    /// Disarms the timer; it stays pending until started again.
    pub fn stop(&mut self) {
        self.deadline = None;
    }

    /// Returns `true` if the timer is armed.
    pub fn is_armed(&self) -> bool {
        self.deadline.is_some()
    }
}

impl Future for DeferredTimer {
    type Output = ();

    fn poll(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        let this = self.get_mut();

        let Some(deadline) = this.deadline.as_mut() else {
            return Poll::Pending;
        };

        ready!(deadline.as_mut().poll(cx));

        Poll::Ready(())
    }
}
