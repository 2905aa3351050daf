use std::sync::Arc;

use flowkit_config::shared::RateLimiterConfig;
use metrics::counter;
use tokio::task::JoinHandle;
use tracing::{debug, error};

use crate::concurrency::signal::{SignalTx, create_signal};
use crate::error::{ErrorKind, FlowResult};
use crate::flow_error;
use crate::limiter::bucket::{Bucket, LimiterState};
use crate::limiter::worker::LeakWorker;
use crate::metrics::{FLOWKIT_RATE_LIMITER_ADMITTED_TOTAL, FLOWKIT_RATE_LIMITER_REJECTED_TOTAL};

fn admit(bucket: &Bucket) -> bool {
    let admitted = bucket.try_admit();

    if admitted {
        counter!(FLOWKIT_RATE_LIMITER_ADMITTED_TOTAL).increment(1);
    } else {
        counter!(FLOWKIT_RATE_LIMITER_REJECTED_TOTAL).increment(1);
    }

    admitted
}

/// A running leaky-bucket rate limiter.
///
/// Dropping a running limiter aborts its worker; [`RateLimiter::shutdown`] stops it and waits
/// for it to exit.
#[derive(Debug)]
pub struct RateLimiter {
    bucket: Arc<Bucket>,
    shutdown_tx: SignalTx,
    worker: Option<JoinHandle<()>>,
    config: RateLimiterConfig,
}

impl RateLimiter {
    /// Validates `config` and starts the leak worker.
    ///
    /// # Panics
    ///
    /// Panics if called outside of a Tokio runtime.
    pub fn start(config: RateLimiterConfig) -> FlowResult<Self> {
        config.validate()?;

        let bucket = Arc::new(Bucket::new(config.capacity(), config.min_spacing()));
        let (shutdown_tx, shutdown_rx) = create_signal();
        let worker =
            LeakWorker::new(bucket.clone(), config.leak_interval(), shutdown_rx).start();

        debug!(
            limit = config.limit,
            period_ms = config.period_ms,
            capacity = config.capacity(),
            "rate limiter started"
        );

        Ok(Self {
            bucket,
            shutdown_tx,
            worker: Some(worker),
            config,
        })
    }

    /// Admits the call if the bucket has room. Never blocks.
    pub fn allow(&self) -> bool {
        admit(&self.bucket)
    }

    /// Returns a cloneable handle that admits calls against this limiter.
    pub fn handle(&self) -> RateLimiterHandle {
        RateLimiterHandle {
            bucket: self.bucket.clone(),
        }
    }

    /// Returns the lifecycle state.
    pub fn state(&self) -> LimiterState {
        self.bucket.state()
    }

    /// Returns the number of drops currently in the bucket.
    pub fn level(&self) -> u32 {
        self.bucket.level()
    }

    /// Returns the configuration the limiter was started with.
    pub fn config(&self) -> &RateLimiterConfig {
        &self.config
    }

    /// Stops the leak worker and waits until it has exited.
    ///
    /// Every handle rejects calls afterwards.
    pub async fn shutdown(mut self) -> FlowResult<()> {
        self.shutdown_tx.fire();

        if let Some(worker) = self.worker.take() {
            if let Err(err) = worker.await {
                error!(error = %err, "rate limiter worker failed");
                self.bucket.stop();

                return Err(flow_error!(
                    ErrorKind::WorkerPanic,
                    "Rate limiter worker failed",
                    err
                ));
            }
        }

        debug!("rate limiter stopped");

        Ok(())
    }
}

impl Drop for RateLimiter {
    fn drop(&mut self) {
        if let Some(worker) = self.worker.take() {
            worker.abort();
            self.bucket.stop();
        }
    }
}

/// Cheap, cloneable admission handle for a [`RateLimiter`].
#[derive(Debug, Clone)]
pub struct RateLimiterHandle {
    bucket: Arc<Bucket>,
}

impl RateLimiterHandle {
    /// Admits the call if the bucket has room. Never blocks.
    pub fn allow(&self) -> bool {
        admit(&self.bucket)
    }

    /// Returns the lifecycle state.
    pub fn state(&self) -> LimiterState {
        self.bucket.state()
    }
}
