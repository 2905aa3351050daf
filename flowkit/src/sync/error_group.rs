use std::sync::{Arc, OnceLock};
use std::time::Duration;

use flowkit_config::shared::ErrorGroupConfig;
use metrics::counter;
use tokio::task::JoinSet;
use tracing::{debug, error, warn};

use crate::concurrency::future::catch_panic;
use crate::concurrency::signal::{SignalRx, SignalTx, create_signal};
use crate::concurrency::timer::DeferredTimer;
use crate::error::{FlowError, FlowResult};
use crate::metrics::{ERROR_KIND_LABEL, FLOWKIT_ERROR_GROUP_FAILURES_TOTAL};
use crate::sync::Semaphore;

/// State shared between the group and its tasks.
#[derive(Debug)]
struct GroupShared {
    cancel_tx: SignalTx,
    first_error: OnceLock<FlowError>,
}

impl GroupShared {
    /// Records `err`; only the first recorded error fires cancellation.
    fn record(&self, err: FlowError) {
        counter!(
            FLOWKIT_ERROR_GROUP_FAILURES_TOTAL,
            ERROR_KIND_LABEL => format!("{:?}", err.kind())
        )
        .increment(1);

        match self.first_error.set(err) {
            Ok(()) => {
                if let Some(err) = self.first_error.get() {
                    error!(error = %err, "task failed, cancelling group");
                }
                self.cancel_tx.fire();
            }
            Err(err) => {
                debug!(error = %err, "task failed after the group was already cancelled");
            }
        }
    }
}

/// A set of tasks that fail fast together.
///
/// Every task receives the group's cancellation signal. The first task to return an error or
/// panic records that error and fires the signal exactly once; [`ErrorGroup::wait`] returns the
/// recorded error after every task has exited. Dropping the group aborts whatever is still
/// running.
#[derive(Debug)]
pub struct ErrorGroup {
    tasks: JoinSet<()>,
    shared: Arc<GroupShared>,
    semaphore: Option<Semaphore>,
    abort_after: Option<Duration>,
}

impl ErrorGroup {
    /// Creates an unbounded group that waits for every task without a grace period.
    pub fn new() -> Self {
        Self::build(None, None)
    }

    /// Creates a group from validated configuration.
    pub fn with_config(config: &ErrorGroupConfig) -> FlowResult<Self> {
        config.validate()?;

        Ok(Self::build(
            config.max_concurrency.map(Semaphore::new),
            config.abort_after(),
        ))
    }

    fn build(semaphore: Option<Semaphore>, abort_after: Option<Duration>) -> Self {
        let (cancel_tx, _) = create_signal();

        Self {
            tasks: JoinSet::new(),
            shared: Arc::new(GroupShared {
                cancel_tx,
                first_error: OnceLock::new(),
            }),
            semaphore,
            abort_after,
        }
    }

    /// Returns the group's cancellation signal.
    pub fn cancellation(&self) -> SignalRx {
        self.shared.cancel_tx.subscribe()
    }

    /// Fires the cancellation signal without recording an error.
    ///
    /// Returns `true` if this call fired it.
    pub fn cancel(&self) -> bool {
        self.shared.cancel_tx.fire()
    }

    /// Returns the number of tasks that have not been reaped yet.
    pub fn len(&self) -> usize {
        self.tasks.len()
    }

    /// Returns `true` if no task is left to reap.
    pub fn is_empty(&self) -> bool {
        self.tasks.is_empty()
    }

    /// Spawns a task that receives the group's cancellation signal.
    ///
    /// With a concurrency limit the task first waits for a permit; if the group is cancelled
    /// while it waits, the task never runs.
    pub fn spawn<F, Fut>(&mut self, task: F)
    where
        F: FnOnce(SignalRx) -> Fut + Send + 'static,
        Fut: Future<Output = FlowResult<()>> + Send + 'static,
    {
        let shared = self.shared.clone();
        let cancel = self.cancellation();
        let semaphore = self.semaphore.clone();

        self.tasks.spawn(async move {
            let _permit = match &semaphore {
                Some(semaphore) => match semaphore.acquire_until(&cancel).await {
                    Ok(permit) => Some(permit),
                    Err(_) => {
                        debug!("group cancelled before the task acquired a permit");
                        return;
                    }
                },
                None => None,
            };

            if let Err(err) = catch_panic(task(cancel)).await {
                shared.record(err);
            }
        });
    }

    /// Waits for every task to exit and returns the first error, if any.
    ///
    /// With a grace period configured, tasks still running that long after the first error are
    /// aborted. The cancellation signal fires once the group is gone.
    pub async fn wait(mut self) -> FlowResult<()> {
        let mut grace = DeferredTimer::new(self.abort_after.unwrap_or_default());

        loop {
            if self.abort_after.is_some() && self.shared.first_error.get().is_some() {
                grace.start_once();
            }

            tokio::select! {
                biased;

                _ = &mut grace => {
                    warn!(remaining = self.tasks.len(), "aborting tasks still running after the grace period");
                    self.tasks.abort_all();
                    grace.stop();
                    // Stay disarmed: aborted tasks are reaped below.
                    self.abort_after = None;
                }
                joined = self.tasks.join_next() => match joined {
                    None => break,
                    Some(Ok(())) => {}
                    Some(Err(err)) if err.is_cancelled() => {
                        debug!("group task aborted");
                    }
                    Some(Err(err)) => self.shared.record(FlowError::from(err)),
                },
            }
        }

        match self.shared.first_error.get() {
            Some(err) => Err(err.clone()),
            None => Ok(()),
        }
    }
}

impl Default for ErrorGroup {
    fn default() -> Self {
        Self::new()
    }
}
