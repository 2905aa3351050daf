use tokio::task::JoinSet;
use tracing::{debug, error, trace};

use crate::combinators::or_done::{ForwardEnd, forward};
use crate::combinators::record_cancellation;
use crate::concurrency::signal::SignalRx;
use crate::concurrency::stream::{DEFAULT_STREAM_CAPACITY, StreamRx, StreamTx, channel};

/// Merges `streams` into a single stream.
///
/// See [`merge_with_capacity`].
pub fn merge<T>(done: &SignalRx, streams: Vec<StreamRx<T>>) -> StreamRx<T>
where
    T: Send + 'static,
{
    merge_with_capacity(done, streams, DEFAULT_STREAM_CAPACITY)
}

/// Merges `streams` into a single stream with room for `capacity` buffered values.
///
/// One forwarder per input copies values until its input closes or `done` fires. Values from
/// the same input keep their order; there is no ordering across inputs. The output closes after
/// every forwarder has finished, and immediately when `streams` is empty.
///
/// # Panics
///
/// Panics if `capacity` is zero or if called outside of a Tokio runtime.
pub fn merge_with_capacity<T>(
    done: &SignalRx,
    streams: Vec<StreamRx<T>>,
    capacity: usize,
) -> StreamRx<T>
where
    T: Send + 'static,
{
    let (tx, rx) = channel(capacity);
    if streams.is_empty() {
        return rx;
    }

    let mut forwarders = JoinSet::new();
    for (index, mut input) in streams.into_iter().enumerate() {
        let done = done.clone();
        let tx = tx.clone();

        forwarders.spawn(async move {
            let end = forward(&done, &mut input, &tx).await;
            trace!(index, ?end, "merge input finished");
            end
        });
    }

    tokio::spawn(supervise(forwarders, tx));

    rx
}

/// Joins every forwarder and only then releases the output sender.
async fn supervise<T>(mut forwarders: JoinSet<ForwardEnd>, tx: StreamTx<T>) {
    let inputs = forwarders.len();
    let mut cancelled = false;

    while let Some(joined) = forwarders.join_next().await {
        match joined {
            Ok(ForwardEnd::Cancelled) => cancelled = true,
            Ok(_) => {}
            Err(err) => {
                error!(error = %err, "merge forwarder failed");
            }
        }
    }

    if cancelled {
        record_cancellation("merge");
    }

    debug!(inputs, "merge finished");
    drop(tx);
}
