use std::sync::Arc;

use tokio::task::JoinSet;
use tracing::{debug, error, trace};

use crate::combinators::record_cancellation;
use crate::concurrency::signal::SignalRx;
use crate::concurrency::stream::{
    DEFAULT_STREAM_CAPACITY, RecvOutcome, SendOutcome, StreamRx, StreamTx, channel,
};
use crate::sync::{Permit, Semaphore};

/// Applies `f` to every value of `input`, one at a time, preserving order.
///
/// A call to `f` in progress when `done` fires is dropped.
pub fn map<T, U, F, Fut>(done: &SignalRx, mut input: StreamRx<T>, mut f: F) -> StreamRx<U>
where
    T: Send + 'static,
    U: Send + 'static,
    F: FnMut(T) -> Fut + Send + 'static,
    Fut: Future<Output = U> + Send + 'static,
{
    let (tx, rx) = channel(DEFAULT_STREAM_CAPACITY);
    let done = done.clone();

    tokio::spawn(async move {
        loop {
            let item = match input.recv_or_cancel(&done).await {
                RecvOutcome::Item(item) => item,
                RecvOutcome::Cancelled => {
                    record_cancellation("map");
                    break;
                }
                RecvOutcome::Closed => break,
            };

            let mapped = tokio::select! {
                biased;

                _ = done.fired() => {
                    record_cancellation("map");
                    break;
                }
                mapped = f(item) => mapped,
            };

            match tx.send_or_cancel(&done, mapped).await {
                SendOutcome::Sent => {}
                SendOutcome::Cancelled(_) => {
                    record_cancellation("map");
                    break;
                }
                SendOutcome::Closed(_) => break,
            }
        }
    });

    rx
}

/// Applies `f` to every value of `input` on its own task, with at most as many calls in flight
/// as `semaphore` has permits.
///
/// The dispatcher acquires a permit before spawning each call, so a slow `f` applies
/// backpressure to `input`. Output order is not preserved. The output closes after the
/// dispatcher and every spawned call have finished. A panicking call is logged and its value is
/// lost; the other calls keep going. Dropping the output stops the dispatcher and abandons the
/// calls in flight.
pub fn map_bounded<T, U, F, Fut>(
    done: &SignalRx,
    mut input: StreamRx<T>,
    semaphore: Semaphore,
    f: F,
) -> StreamRx<U>
where
    T: Send + 'static,
    U: Send + 'static,
    F: Fn(T) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = U> + Send + 'static,
{
    let (tx, rx) = channel(DEFAULT_STREAM_CAPACITY);
    let done = done.clone();
    let f = Arc::new(f);

    tokio::spawn(async move {
        let mut workers = JoinSet::new();
        let mut dispatched = 0usize;

        loop {
            let item = tokio::select! {
                biased;

                _ = tx.closed() => {
                    trace!("bounded map output dropped");
                    break;
                }
                outcome = input.recv_or_cancel(&done) => match outcome {
                    RecvOutcome::Item(item) => item,
                    RecvOutcome::Cancelled => {
                        record_cancellation("map_bounded");
                        break;
                    }
                    RecvOutcome::Closed => break,
                },
            };

            let permit = tokio::select! {
                biased;

                _ = tx.closed() => {
                    trace!("bounded map output dropped");
                    break;
                }
                permit = semaphore.acquire_until(&done) => match permit {
                    Ok(permit) => permit,
                    Err(_) => {
                        record_cancellation("map_bounded");
                        break;
                    }
                },
            };

            workers.spawn(apply(done.clone(), tx.clone(), f.clone(), item, permit));
            dispatched += 1;

            while let Some(joined) = workers.try_join_next() {
                reap(joined);
            }
        }

        // Only the workers keep the output open from here on.
        drop(tx);

        while let Some(joined) = workers.join_next().await {
            reap(joined);
        }

        debug!(dispatched, "bounded map finished");
    });

    rx
}

async fn apply<T, U, F, Fut>(
    done: SignalRx,
    tx: StreamTx<U>,
    f: Arc<F>,
    item: T,
    _permit: Permit,
) where
    F: Fn(T) -> Fut,
    Fut: Future<Output = U>,
{
    let mapped = tokio::select! {
        biased;

        _ = done.fired() => return,
        _ = tx.closed() => return,
        mapped = f(item) => mapped,
    };

    if let SendOutcome::Closed(_) = tx.send_or_cancel(&done, mapped).await {
        trace!("bounded map output dropped");
    }
}

fn reap(joined: Result<(), tokio::task::JoinError>) {
    if let Err(err) = joined {
        error!(error = %err, "bounded map worker failed");
    }
}
