use flowkit_config::shared::{LagPolicy, SplitConfig, SplitMode};
use metrics::counter;
use tokio::sync::mpsc::error::TrySendError;
use tracing::{debug, trace};

use crate::combinators::record_cancellation;
use crate::concurrency::signal::SignalRx;
use crate::concurrency::stream::{RecvOutcome, SendOutcome, StreamRx, StreamTx, channel};
use crate::metrics::FLOWKIT_SPLIT_DROPPED_TOTAL;

/// Result of handing one value to one output.
enum Delivery<T> {
    Sent,
    Dropped,
    Cancelled,
    Closed(T),
}

async fn deliver<T>(
    done: &SignalRx,
    output: &StreamTx<T>,
    value: T,
    lag_policy: LagPolicy,
) -> Delivery<T> {
    match lag_policy {
        LagPolicy::Block => match output.send_or_cancel(done, value).await {
            SendOutcome::Sent => Delivery::Sent,
            SendOutcome::Cancelled(_) => Delivery::Cancelled,
            SendOutcome::Closed(value) => Delivery::Closed(value),
        },
        LagPolicy::DropNewest => {
            if done.is_fired() {
                return Delivery::Cancelled;
            }

            match output.try_send(value) {
                Ok(()) => Delivery::Sent,
                Err(TrySendError::Full(_)) => {
                    counter!(FLOWKIT_SPLIT_DROPPED_TOTAL).increment(1);
                    trace!("split output full, value dropped");
                    Delivery::Dropped
                }
                Err(TrySendError::Closed(value)) => Delivery::Closed(value),
            }
        }
    }
}

fn outputs<T>(count: usize, capacity: usize) -> (Vec<StreamTx<T>>, Vec<StreamRx<T>>) {
    (0..count).map(|_| channel(capacity)).unzip()
}

/// Splits `input` into `config.outputs` streams.
///
/// A single dispatcher task reads `input` and writes every output; all outputs close together
/// when it finishes. [`SplitMode::RoundRobin`] sends value `i` to output `i mod n`,
/// [`SplitMode::Broadcast`] sends a clone of every value to every output.
///
/// With [`LagPolicy::Block`] a full output stalls the dispatcher, so in broadcast mode the
/// slowest consumer paces all of them. [`LagPolicy::DropNewest`] skips the value for a full
/// output instead. Outputs whose receiver was dropped are skipped, and the dispatcher stops once
/// every output is gone. With zero outputs `input` is dropped and no stream is returned.
///
/// `T: Clone` is required for both modes, although round-robin never clones. Use
/// [`round_robin`] to distribute values that are not [`Clone`].
///
/// # Panics
///
/// Panics if `config.capacity` is zero or if called outside of a Tokio runtime.
pub fn split<T>(done: &SignalRx, input: StreamRx<T>, config: SplitConfig) -> Vec<StreamRx<T>>
where
    T: Clone + Send + 'static,
{
    match config.mode {
        SplitMode::RoundRobin => split_round_robin(done, input, &config),
        SplitMode::Broadcast => split_broadcast(done, input, &config),
    }
}

/// Broadcasts every value of `input` to `outputs` streams, blocking on the slowest one.
pub fn tee<T>(done: &SignalRx, input: StreamRx<T>, outputs: usize) -> Vec<StreamRx<T>>
where
    T: Clone + Send + 'static,
{
    split_broadcast(done, input, &SplitConfig::broadcast(outputs))
}

/// Distributes the values of `input` over `outputs` streams in turn.
///
/// Values are moved, not cloned, so `T` needs no [`Clone`] bound.
pub fn round_robin<T>(done: &SignalRx, input: StreamRx<T>, outputs: usize) -> Vec<StreamRx<T>>
where
    T: Send + 'static,
{
    split_round_robin(done, input, &SplitConfig::round_robin(outputs))
}

fn split_round_robin<T>(done: &SignalRx, input: StreamRx<T>, config: &SplitConfig) -> Vec<StreamRx<T>>
where
    T: Send + 'static,
{
    if config.outputs == 0 {
        return Vec::new();
    }

    let (txs, rxs) = outputs(config.outputs, config.capacity);
    tokio::spawn(dispatch_round_robin(
        done.clone(),
        input,
        txs,
        config.lag_policy,
    ));

    rxs
}

fn split_broadcast<T>(done: &SignalRx, input: StreamRx<T>, config: &SplitConfig) -> Vec<StreamRx<T>>
where
    T: Clone + Send + 'static,
{
    if config.outputs == 0 {
        return Vec::new();
    }

    let (txs, rxs) = outputs(config.outputs, config.capacity);
    tokio::spawn(dispatch_broadcast(
        done.clone(),
        input,
        txs,
        config.lag_policy,
    ));

    rxs
}

async fn dispatch_round_robin<T>(
    done: SignalRx,
    mut input: StreamRx<T>,
    mut outputs: Vec<StreamTx<T>>,
    lag_policy: LagPolicy,
) {
    let mut next = 0;

    'dispatch: loop {
        let mut value = match input.recv_or_cancel(&done).await {
            RecvOutcome::Item(value) => value,
            RecvOutcome::Cancelled => {
                record_cancellation("split");
                break;
            }
            RecvOutcome::Closed => break,
        };

        // A value meant for a dropped output goes to the next live one.
        loop {
            if outputs.is_empty() {
                debug!("every split output was dropped");
                break 'dispatch;
            }

            let index = next % outputs.len();
            match deliver(&done, &outputs[index], value, lag_policy).await {
                Delivery::Sent | Delivery::Dropped => {
                    next = index + 1;
                    break;
                }
                Delivery::Cancelled => {
                    record_cancellation("split");
                    break 'dispatch;
                }
                Delivery::Closed(returned) => {
                    outputs.remove(index);
                    next = index;
                    value = returned;
                }
            }
        }
    }

    trace!("round-robin dispatcher finished");
}

async fn dispatch_broadcast<T>(
    done: SignalRx,
    mut input: StreamRx<T>,
    mut outputs: Vec<StreamTx<T>>,
    lag_policy: LagPolicy,
) where
    T: Clone,
{
    loop {
        let value = match input.recv_or_cancel(&done).await {
            RecvOutcome::Item(value) => value,
            RecvOutcome::Cancelled => {
                record_cancellation("split");
                break;
            }
            RecvOutcome::Closed => break,
        };

        let mut index = 0;
        while index < outputs.len() {
            match deliver(&done, &outputs[index], value.clone(), lag_policy).await {
                Delivery::Sent | Delivery::Dropped => index += 1,
                Delivery::Cancelled => {
                    record_cancellation("split");
                    return;
                }
                Delivery::Closed(_) => {
                    outputs.remove(index);
                }
            }
        }

        if outputs.is_empty() {
            debug!("every split output was dropped");
            break;
        }
    }

    trace!("broadcast dispatcher finished");
}
