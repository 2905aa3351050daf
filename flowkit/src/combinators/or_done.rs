use tracing::trace;

use crate::combinators::record_cancellation;
use crate::concurrency::signal::SignalRx;
use crate::concurrency::stream::{
    DEFAULT_STREAM_CAPACITY, RecvOutcome, SendOutcome, StreamRx, StreamTx, TakeUntil, channel,
};

/// Why a forwarding loop stopped.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum ForwardEnd {
    /// The input closed and every value was forwarded.
    InputClosed,
    /// The cancellation signal fired.
    Cancelled,
    /// The consumer of the output is gone.
    OutputClosed,
}

/// Copies values from `input` to `output` until one of them closes or `done` fires.
pub(crate) async fn forward<T>(
    done: &SignalRx,
    input: &mut StreamRx<T>,
    output: &StreamTx<T>,
) -> ForwardEnd {
    loop {
        let item = match input.recv_or_cancel(done).await {
            RecvOutcome::Item(item) => item,
            RecvOutcome::Cancelled => return ForwardEnd::Cancelled,
            RecvOutcome::Closed => return ForwardEnd::InputClosed,
        };

        match output.send_or_cancel(done, item).await {
            SendOutcome::Sent => {}
            SendOutcome::Cancelled(_) => return ForwardEnd::Cancelled,
            SendOutcome::Closed(_) => return ForwardEnd::OutputClosed,
        }
    }
}

/// Forwards `input` until it closes or `done` fires.
///
/// On cancellation the forwarder stops without draining `input` and closes the returned stream.
/// Values still buffered in `input` are dropped with it.
pub fn or_done<T>(done: &SignalRx, mut input: StreamRx<T>) -> StreamRx<T>
where
    T: Send + 'static,
{
    let (tx, rx) = channel(DEFAULT_STREAM_CAPACITY);
    let done = done.clone();

    tokio::spawn(async move {
        let end = forward(&done, &mut input, &tx).await;
        if end == ForwardEnd::Cancelled {
            record_cancellation("or_done");
        }

        trace!(?end, "or_done forwarder finished");
    });

    rx
}

/// Wraps `input` in a stream adapter that ends as soon as `done` fires.
///
/// Same semantics as [`or_done`] without spawning a task; the adapter is driven by whoever polls
/// it.
pub fn take_until<T>(done: &SignalRx, input: StreamRx<T>) -> TakeUntil<StreamRx<T>> {
    input.take_until(done.clone())
}
