use tracing::debug;

use crate::combinators::or_done::{ForwardEnd, forward};
use crate::combinators::record_cancellation;
use crate::concurrency::signal::SignalRx;
use crate::concurrency::stream::{DEFAULT_STREAM_CAPACITY, RecvOutcome, StreamRx, channel};

/// Flattens a stream of streams into one stream.
///
/// Inner streams are drained one at a time, in the order the outer stream yields them; the next
/// one is taken only after the current one closes. The output closes once the outer stream is
/// closed and its last inner stream is drained, or when `done` fires.
pub fn bridge<T>(done: &SignalRx, mut streams: StreamRx<StreamRx<T>>) -> StreamRx<T>
where
    T: Send + 'static,
{
    let (tx, rx) = channel(DEFAULT_STREAM_CAPACITY);
    let done = done.clone();

    tokio::spawn(async move {
        let mut drained = 0usize;

        loop {
            let mut inner = match streams.recv_or_cancel(&done).await {
                RecvOutcome::Item(inner) => inner,
                RecvOutcome::Cancelled => {
                    record_cancellation("bridge");
                    break;
                }
                RecvOutcome::Closed => break,
            };

            match forward(&done, &mut inner, &tx).await {
                ForwardEnd::InputClosed => drained += 1,
                ForwardEnd::Cancelled => {
                    record_cancellation("bridge");
                    break;
                }
                ForwardEnd::OutputClosed => break,
            }
        }

        debug!(drained, "bridge finished");
    });

    rx
}
