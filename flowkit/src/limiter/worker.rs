use std::sync::Arc;
use std::time::Duration;

use metrics::gauge;
use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior, interval_at};
use tracing::{debug, trace};

use crate::concurrency::signal::SignalRx;
use crate::limiter::bucket::Bucket;
use crate::metrics::FLOWKIT_RATE_LIMITER_LEVEL;

/// Background worker that drains a [`Bucket`] at a fixed pace.
#[derive(Debug)]
pub(crate) struct LeakWorker {
    bucket: Arc<Bucket>,
    every: Duration,
    shutdown_rx: SignalRx,
}

impl LeakWorker {
    pub(crate) fn new(bucket: Arc<Bucket>, every: Duration, shutdown_rx: SignalRx) -> Self {
        Self {
            bucket,
            every,
            shutdown_rx,
        }
    }

    /// Starts the worker in a background task.
    pub(crate) fn start(self) -> JoinHandle<()> {
        tokio::spawn(self.run())
    }

    async fn run(self) {
        debug!(every = ?self.every, capacity = self.bucket.capacity(), "starting leak worker");

        // The first leak happens one interval after start, not immediately.
        let mut ticker = interval_at(Instant::now() + self.every, self.every);
        // A late worker leaks less, never more, than the configured pace.
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

        loop {
            tokio::select! {
                biased;

                _ = self.shutdown_rx.fired() => break,
                _ = ticker.tick() => {
                    let level = self.bucket.leak();
                    gauge!(FLOWKIT_RATE_LIMITER_LEVEL).set(level as f64);
                    trace!(level, "leaked one drop");
                }
            }
        }

        self.bucket.stop();
        debug!("leak worker stopped");
    }
}
