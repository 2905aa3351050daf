use std::sync::{Mutex, PoisonError};

use metrics::counter;
use tokio::sync::watch;
use tracing::{debug, trace};

use crate::concurrency::signal::SignalRx;
use crate::error::{ErrorKind, FlowResult};
use crate::flow_error;
use crate::metrics::FLOWKIT_BARRIER_TRIPS_TOTAL;

/// Outcome of a barrier wait.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BarrierWaitResult {
    generation: u64,
    is_leader: bool,
}

impl BarrierWaitResult {
    /// The generation the caller crossed, starting at zero.
    pub fn generation(&self) -> u64 {
        self.generation
    }

    /// `true` for exactly one party per generation: the one whose arrival tripped the barrier.
    pub fn is_leader(&self) -> bool {
        self.is_leader
    }
}

#[derive(Debug)]
struct BarrierState {
    arrived: usize,
    generation: u64,
}

enum Arrival {
    Leader(u64),
    Waiting(u64, watch::Receiver<u64>),
}

/// A reusable rendezvous point for a fixed number of parties.
///
/// No party returns from a wait for generation `G` before all `parties` have arrived for `G`.
/// The arrival that completes a generation resets the count, advances the generation and wakes
/// everyone else. Share it across tasks with an [`Arc`](std::sync::Arc).
#[derive(Debug)]
pub struct Barrier {
    parties: usize,
    state: Mutex<BarrierState>,
    // Publishes the generation that is currently open.
    generation_tx: watch::Sender<u64>,
}

impl Barrier {
    /// Creates a barrier for `parties` participants.
    ///
    /// # Panics
    ///
    /// Panics if `parties` is zero.
    pub fn new(parties: usize) -> Self {
        assert!(parties > 0, "barrier must have at least one party");

        let (generation_tx, _) = watch::channel(0);

        Self {
            parties,
            state: Mutex::new(BarrierState {
                arrived: 0,
                generation: 0,
            }),
            generation_tx,
        }
    }

    /// Returns the number of parties that must arrive to trip the barrier.
    pub fn parties(&self) -> usize {
        self.parties
    }

    /// Returns the generation currently open for arrivals.
    pub fn generation(&self) -> u64 {
        self.lock().generation
    }

    /// Waits until every party has arrived for the current generation.
    ///
    /// The arrival is counted as soon as the future is first polled and is not withdrawn if the
    /// future is dropped afterwards; use [`Barrier::wait_until`] for a cancellable wait.
    pub async fn wait(&self) -> BarrierWaitResult {
        match self.arrive() {
            Arrival::Leader(generation) => BarrierWaitResult {
                generation,
                is_leader: true,
            },
            Arrival::Waiting(generation, mut generation_rx) => {
                tripped(&mut generation_rx, generation).await;

                BarrierWaitResult {
                    generation,
                    is_leader: false,
                }
            }
        }
    }

    /// Waits like [`Barrier::wait`] unless `done` fires first.
    ///
    /// On cancellation the caller's arrival is withdrawn, so the generation still needs
    /// `parties` arrivals, and [`ErrorKind::Cancelled`] is returned. If the barrier tripped
    /// before the withdrawal took effect, the wait succeeds instead.
    pub async fn wait_until(&self, done: &SignalRx) -> FlowResult<BarrierWaitResult> {
        let (generation, mut generation_rx) = match self.arrive() {
            Arrival::Leader(generation) => {
                return Ok(BarrierWaitResult {
                    generation,
                    is_leader: true,
                });
            }
            Arrival::Waiting(generation, generation_rx) => (generation, generation_rx),
        };

        let crossed = BarrierWaitResult {
            generation,
            is_leader: false,
        };

        tokio::select! {
            biased;

            _ = tripped(&mut generation_rx, generation) => Ok(crossed),
            _ = done.fired() => {
                let mut state = self.lock();
                if state.generation != generation {
                    return Ok(crossed);
                }

                state.arrived -= 1;
                debug!(generation, arrived = state.arrived, "withdrew barrier arrival");

                Err(flow_error!(ErrorKind::Cancelled, "Barrier wait cancelled"))
            }
        }
    }

    fn arrive(&self) -> Arrival {
        let mut state = self.lock();
        let generation = state.generation;
        state.arrived += 1;

        if state.arrived < self.parties {
            trace!(generation, arrived = state.arrived, "arrived at barrier");
            return Arrival::Waiting(generation, self.generation_tx.subscribe());
        }

        state.arrived = 0;
        state.generation += 1;
        self.generation_tx.send_replace(state.generation);

        counter!(FLOWKIT_BARRIER_TRIPS_TOTAL).increment(1);
        debug!(generation, parties = self.parties, "barrier tripped");

        Arrival::Leader(generation)
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, BarrierState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// Completes once the barrier has moved past `generation`.
async fn tripped(generation_rx: &mut watch::Receiver<u64>, generation: u64) {
    // The sender lives in the barrier, which outlives every waiter.
    let _ = generation_rx
        .wait_for(|current| *current > generation)
        .await;
}
