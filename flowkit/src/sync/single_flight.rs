use std::collections::HashMap;
use std::fmt;
use std::hash::Hash;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use metrics::counter;
use tokio::sync::watch;
use tracing::{debug, warn};

use crate::error::{ErrorKind, FlowResult};
use crate::flow_error;
use crate::metrics::{
    FLOWKIT_SINGLE_FLIGHT_EXECUTIONS_TOTAL, FLOWKIT_SINGLE_FLIGHT_SHARED_TOTAL,
};

type CallSlot<V> = watch::Receiver<Option<FlowResult<V>>>;
type CallTable<K, V> = Mutex<HashMap<K, CallSlot<V>>>;

/// Deduplicates concurrent calls that share a key.
///
/// The first caller for a key executes its work inline; callers that arrive while that execution
/// is in flight wait for it and receive a clone of the same result. The record is removed from
/// the table as soon as the execution finishes, so later callers start a fresh execution.
/// Clones share the same table.
pub struct SingleFlight<K, V> {
    calls: Arc<CallTable<K, V>>,
}

impl<K, V> SingleFlight<K, V>
where
    K: Eq + Hash + Clone + fmt::Debug,
    V: Clone,
{
    /// Creates an empty single-flight group.
    pub fn new() -> Self {
        Self {
            calls: Arc::new(Mutex::new(HashMap::new())),
        }
    }

    /// Runs `work` for `key`, or joins the execution already in flight for it.
    ///
    /// Waiters receive [`ErrorKind::FlightAbandoned`] if the executing caller is dropped or
    /// panics before `work` completes.
    pub async fn run<F, Fut>(&self, key: K, work: F) -> FlowResult<V>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = FlowResult<V>>,
    {
        let flight = {
            let mut calls = lock(&self.calls);
            match calls.get(&key) {
                Some(slot) => Err(slot.clone()),
                None => {
                    let (result_tx, result_rx) = watch::channel(None);
                    calls.insert(key.clone(), result_rx.clone());

                    Ok(Flight {
                        calls: &self.calls,
                        key: key.clone(),
                        result_tx,
                        result_rx,
                    })
                }
            }
        };

        let flight = match flight {
            Ok(flight) => flight,
            Err(mut slot) => {
                counter!(FLOWKIT_SINGLE_FLIGHT_SHARED_TOTAL).increment(1);
                debug!(?key, "joining call in flight");

                let shared = slot
                    .wait_for(Option::is_some)
                    .await
                    .map(|slot| (*slot).clone());

                return match shared {
                    Ok(Some(result)) => result,
                    _ => Err(flow_error!(
                        ErrorKind::FlightAbandoned,
                        "Call in flight was abandoned",
                        format!("{key:?}")
                    )),
                };
            }
        };

        counter!(FLOWKIT_SINGLE_FLIGHT_EXECUTIONS_TOTAL).increment(1);
        debug!(?key, "executing call");

        let result = work().await;
        flight.complete(result.clone());

        result
    }

    /// Detaches the record for `key` so that the next caller starts a new execution.
    ///
    /// Callers already waiting on the detached execution still receive its result. Returns
    /// `true` if a record was in flight.
    pub fn forget(&self, key: &K) -> bool {
        lock(&self.calls).remove(key).is_some()
    }

    /// Returns the number of keys with an execution in flight.
    pub fn in_flight(&self) -> usize {
        lock(&self.calls).len()
    }
}

impl<K, V> Clone for SingleFlight<K, V> {
    fn clone(&self) -> Self {
        Self {
            calls: self.calls.clone(),
        }
    }
}

impl<K, V> Default for SingleFlight<K, V>
where
    K: Eq + Hash + Clone + fmt::Debug,
    V: Clone,
{
    fn default() -> Self {
        Self::new()
    }
}

impl<K, V> fmt::Debug for SingleFlight<K, V> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SingleFlight")
            .field("in_flight", &lock(&self.calls).len())
            .finish()
    }
}

/// Execution record owned by the caller running the work.
///
/// Dropping it without [`Flight::complete`] removes the record and closes the result channel,
/// which waiters observe as an abandoned call.
struct Flight<'a, K: Eq + Hash, V> {
    calls: &'a CallTable<K, V>,
    key: K,
    result_tx: watch::Sender<Option<FlowResult<V>>>,
    result_rx: CallSlot<V>,
}

impl<K: Eq + Hash, V> Flight<'_, K, V> {
    fn complete(self, result: FlowResult<V>) {
        // Remove before publishing: a caller that sees no record must not join a finished call.
        self.detach();
        self.result_tx.send_replace(Some(result));
    }

    fn detach(&self) {
        let mut calls = lock(self.calls);

        // A `forget` followed by a new execution may own the entry now.
        let owned = calls
            .get(&self.key)
            .is_some_and(|slot| slot.same_channel(&self.result_rx));
        if owned {
            calls.remove(&self.key);
        }
    }
}

impl<K: Eq + Hash, V> Drop for Flight<'_, K, V> {
    fn drop(&mut self) {
        if self.result_rx.borrow().is_none() {
            warn!("call in flight abandoned before completion");
        }

        self.detach();
    }
}

fn lock<K, V>(calls: &CallTable<K, V>) -> MutexGuard<'_, HashMap<K, CallSlot<V>>> {
    calls.lock().unwrap_or_else(PoisonError::into_inner)
}
